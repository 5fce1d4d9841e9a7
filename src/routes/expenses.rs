/// Expense Routes
///
/// CRUD over individual expenses plus the per-category spending summary.
/// Amounts are integer cents; dates are calendar dates without a timezone.

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, DatabaseError, ValidationError};

const MAX_DESCRIPTION_LENGTH: usize = 255;

#[derive(Deserialize)]
pub struct ExpenseRequest {
    pub category_id: Uuid,
    pub amount_cents: i64,
    pub description: String,
    pub date: NaiveDate,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ExpenseListQuery {
    pub category_id: Option<Uuid>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Serialize)]
pub struct ExpenseResponse {
    pub id: String,
    pub category_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub date: NaiveDate,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// One row of the per-category spending summary
#[derive(Serialize)]
pub struct CategorySummary {
    pub category_id: String,
    pub category_name: String,
    pub total_cents: i64,
}

type ExpenseRow = (
    Uuid,
    Uuid,
    i64,
    String,
    NaiveDate,
    Option<String>,
    Option<String>,
    chrono::DateTime<Utc>,
);

fn to_response(row: ExpenseRow) -> ExpenseResponse {
    ExpenseResponse {
        id: row.0.to_string(),
        category_id: row.1.to_string(),
        amount_cents: row.2,
        description: row.3,
        date: row.4,
        payment_method: row.5,
        notes: row.6,
        created_at: row.7.to_rfc3339(),
    }
}

fn validate_expense_request(form: &ExpenseRequest) -> Result<(), AppError> {
    if form.amount_cents <= 0 {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "amount_cents must be positive".to_string(),
        )));
    }
    let description = form.description.trim();
    if description.is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField(
            "description".to_string(),
        )));
    }
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "description".to_string(),
            MAX_DESCRIPTION_LENGTH,
        )));
    }
    Ok(())
}

/// The category must exist, be active, and belong to the caller.
async fn ensure_category_owned(
    pool: &PgPool,
    user_id: Uuid,
    category_id: Uuid,
) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM categories WHERE id = $1 AND user_id = $2 AND is_active = true",
    )
    .bind(category_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    if exists == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Category not found".to_string(),
        )));
    }
    Ok(())
}

/// GET /api/expenses
///
/// List the current user's expenses, newest first. Optional filters:
/// `category_id`, `start`, `end` (inclusive dates).
pub async fn list_expenses(
    claims: web::ReqData<Claims>,
    query: web::Query<ExpenseListQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows = sqlx::query_as::<_, ExpenseRow>(
        r#"
        SELECT id, category_id, amount_cents, description, date, payment_method, notes, created_at
        FROM expenses
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR category_id = $2)
          AND ($3::date IS NULL OR date >= $3)
          AND ($4::date IS NULL OR date <= $4)
        ORDER BY date DESC, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(query.category_id)
    .bind(query.start)
    .bind(query.end)
    .fetch_all(pool.get_ref())
    .await?;

    let expenses: Vec<ExpenseResponse> = rows.into_iter().map(to_response).collect();
    Ok(HttpResponse::Ok().json(expenses))
}

/// GET /api/expenses/summary?start=YYYY-MM-DD&end=YYYY-MM-DD
///
/// Sum of expenses per category within the period.
pub async fn expense_summary(
    claims: web::ReqData<Claims>,
    query: web::Query<SummaryQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    if query.end < query.start {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "end must not be before start".to_string(),
        )));
    }

    let rows = sqlx::query_as::<_, (Uuid, String, i64)>(
        r#"
        SELECT c.id, c.name, COALESCE(SUM(e.amount_cents), 0)::BIGINT
        FROM expenses e
        JOIN categories c ON c.id = e.category_id
        WHERE e.user_id = $1 AND e.date >= $2 AND e.date <= $3
        GROUP BY c.id, c.name
        ORDER BY c.name
        "#,
    )
    .bind(user_id)
    .bind(query.start)
    .bind(query.end)
    .fetch_all(pool.get_ref())
    .await?;

    let summary: Vec<CategorySummary> = rows
        .into_iter()
        .map(|(category_id, category_name, total_cents)| CategorySummary {
            category_id: category_id.to_string(),
            category_name,
            total_cents,
        })
        .collect();

    Ok(HttpResponse::Ok().json(summary))
}

/// POST /api/expenses
///
/// # Errors
/// - 400: Validation errors (non-positive amount, empty description)
/// - 404: Category not found or owned by someone else
pub async fn create_expense(
    claims: web::ReqData<Claims>,
    form: web::Json<ExpenseRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    validate_expense_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let expense_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO expenses (id, user_id, category_id, amount_cents, description, date, payment_method, notes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(expense_id)
    .bind(user_id)
    .bind(form.category_id)
    .bind(form.amount_cents)
    .bind(form.description.trim())
    .bind(form.date)
    .bind(&form.payment_method)
    .bind(&form.notes)
    .bind(now)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, expense_id = %expense_id, "Expense created");

    let row = fetch_expense(pool.get_ref(), user_id, expense_id).await?;
    Ok(HttpResponse::Created().json(to_response(row)))
}

/// GET /api/expenses/{id}
pub async fn get_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let row = fetch_expense(pool.get_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(to_response(row)))
}

/// PUT /api/expenses/{id}
pub async fn update_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    form: web::Json<ExpenseRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let expense_id = path.into_inner();
    validate_expense_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE expenses
        SET category_id = $1, amount_cents = $2, description = $3, date = $4,
            payment_method = $5, notes = $6, updated_at = $7
        WHERE id = $8 AND user_id = $9
        "#,
    )
    .bind(form.category_id)
    .bind(form.amount_cents)
    .bind(form.description.trim())
    .bind(form.date)
    .bind(&form.payment_method)
    .bind(&form.notes)
    .bind(Utc::now())
    .bind(expense_id)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Expense not found".to_string(),
        )));
    }

    let row = fetch_expense(pool.get_ref(), user_id, expense_id).await?;
    Ok(HttpResponse::Ok().json(to_response(row)))
}

/// DELETE /api/expenses/{id}
pub async fn delete_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let expense_id = path.into_inner();

    let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
        .bind(expense_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Expense not found".to_string(),
        )));
    }

    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_expense(
    pool: &PgPool,
    user_id: Uuid,
    expense_id: Uuid,
) -> Result<ExpenseRow, AppError> {
    sqlx::query_as::<_, ExpenseRow>(
        r#"
        SELECT id, category_id, amount_cents, description, date, payment_method, notes, created_at
        FROM expenses
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(expense_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("Expense not found".to_string())))
}
