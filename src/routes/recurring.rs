/// Recurring Expense Routes
///
/// Templates for expenses that repeat on a fixed schedule. The `due`
/// listing surfaces everything whose next occurrence has arrived; actual
/// expense rows are created by the client, not automatically.

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, DatabaseError, ValidationError};

const MAX_NAME_LENGTH: usize = 100;

/// Recurrence schedule granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl FrequencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyType::Daily => "daily",
            FrequencyType::Weekly => "weekly",
            FrequencyType::Monthly => "monthly",
            FrequencyType::Quarterly => "quarterly",
            FrequencyType::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "daily" => Ok(FrequencyType::Daily),
            "weekly" => Ok(FrequencyType::Weekly),
            "monthly" => Ok(FrequencyType::Monthly),
            "quarterly" => Ok(FrequencyType::Quarterly),
            "yearly" => Ok(FrequencyType::Yearly),
            other => Err(AppError::Internal(format!(
                "unknown frequency in database: {}",
                other
            ))),
        }
    }
}

#[derive(Deserialize)]
pub struct RecurringExpenseRequest {
    pub category_id: Uuid,
    pub name: String,
    pub amount_cents: i64,
    pub frequency: FrequencyType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub automatic_payment: bool,
}

#[derive(Serialize)]
pub struct RecurringExpenseResponse {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub amount_cents: i64,
    pub frequency: FrequencyType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_due_date: NaiveDate,
    pub automatic_payment: bool,
    pub created_at: String,
}

// Too many columns for a tuple row, so this one is mapped by name
#[derive(sqlx::FromRow)]
struct RecurringRow {
    id: Uuid,
    category_id: Uuid,
    name: String,
    amount_cents: i64,
    frequency: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    next_due_date: NaiveDate,
    automatic_payment: bool,
    created_at: chrono::DateTime<Utc>,
}

fn to_response(row: RecurringRow) -> Result<RecurringExpenseResponse, AppError> {
    Ok(RecurringExpenseResponse {
        id: row.id.to_string(),
        category_id: row.category_id.to_string(),
        name: row.name,
        amount_cents: row.amount_cents,
        frequency: FrequencyType::parse(&row.frequency)?,
        start_date: row.start_date,
        end_date: row.end_date,
        next_due_date: row.next_due_date,
        automatic_payment: row.automatic_payment,
        created_at: row.created_at.to_rfc3339(),
    })
}

fn validate_recurring_request(form: &RecurringExpenseRequest) -> Result<(), AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField(
            "name".to_string(),
        )));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "name".to_string(),
            MAX_NAME_LENGTH,
        )));
    }
    if form.amount_cents <= 0 {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "amount_cents must be positive".to_string(),
        )));
    }
    if let Some(end_date) = form.end_date {
        if end_date <= form.start_date {
            return Err(AppError::Validation(ValidationError::InvalidFormat(
                "end_date must be after start_date".to_string(),
            )));
        }
    }
    if let Some(next_due) = form.next_due_date {
        if next_due < form.start_date {
            return Err(AppError::Validation(ValidationError::InvalidFormat(
                "next_due_date must not be before start_date".to_string(),
            )));
        }
    }
    Ok(())
}

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

/// GET /api/recurring
pub async fn list_recurring_expenses(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows = sqlx::query_as::<_, RecurringRow>(
        r#"
        SELECT id, category_id, name, amount_cents, frequency, start_date, end_date,
               next_due_date, automatic_payment, created_at
        FROM recurring_expenses
        WHERE user_id = $1
        ORDER BY next_due_date
        "#,
    )
    .bind(user_id)
    .fetch_all(pool.get_ref())
    .await?;

    let recurring = rows
        .into_iter()
        .map(to_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(recurring))
}

/// GET /api/recurring/due
///
/// Recurring expenses whose next occurrence date has arrived and whose
/// schedule has not run out.
pub async fn list_due_recurring_expenses(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let today = Utc::now().date_naive();

    let rows = sqlx::query_as::<_, RecurringRow>(
        r#"
        SELECT id, category_id, name, amount_cents, frequency, start_date, end_date,
               next_due_date, automatic_payment, created_at
        FROM recurring_expenses
        WHERE user_id = $1
          AND next_due_date <= $2
          AND (end_date IS NULL OR next_due_date <= end_date)
        ORDER BY next_due_date
        "#,
    )
    .bind(user_id)
    .bind(today)
    .fetch_all(pool.get_ref())
    .await?;

    let due = rows
        .into_iter()
        .map(to_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(due))
}

/// POST /api/recurring
///
/// `next_due_date` defaults to `start_date` when omitted.
///
/// # Errors
/// - 400: Validation errors
/// - 404: Category not found or owned by someone else
pub async fn create_recurring_expense(
    claims: web::ReqData<Claims>,
    form: web::Json<RecurringExpenseRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    validate_recurring_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let recurring_id = Uuid::new_v4();
    let next_due_date = form.next_due_date.unwrap_or(form.start_date);
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO recurring_expenses (id, user_id, category_id, name, amount_cents, frequency,
                                        start_date, end_date, next_due_date, automatic_payment,
                                        created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(recurring_id)
    .bind(user_id)
    .bind(form.category_id)
    .bind(form.name.trim())
    .bind(form.amount_cents)
    .bind(form.frequency.as_str())
    .bind(form.start_date)
    .bind(form.end_date)
    .bind(next_due_date)
    .bind(form.automatic_payment)
    .bind(now)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, recurring_id = %recurring_id, "Recurring expense created");

    let row = fetch_recurring(pool.get_ref(), user_id, recurring_id).await?;
    Ok(HttpResponse::Created().json(to_response(row)?))
}

/// GET /api/recurring/{id}
pub async fn get_recurring_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let row = fetch_recurring(pool.get_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(to_response(row)?))
}

/// PUT /api/recurring/{id}
pub async fn update_recurring_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    form: web::Json<RecurringExpenseRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let recurring_id = path.into_inner();
    validate_recurring_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let next_due_date = form.next_due_date.unwrap_or(form.start_date);
    let result = sqlx::query(
        r#"
        UPDATE recurring_expenses
        SET category_id = $1, name = $2, amount_cents = $3, frequency = $4,
            start_date = $5, end_date = $6, next_due_date = $7, automatic_payment = $8,
            updated_at = $9
        WHERE id = $10 AND user_id = $11
        "#,
    )
    .bind(form.category_id)
    .bind(form.name.trim())
    .bind(form.amount_cents)
    .bind(form.frequency.as_str())
    .bind(form.start_date)
    .bind(form.end_date)
    .bind(next_due_date)
    .bind(form.automatic_payment)
    .bind(Utc::now())
    .bind(recurring_id)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Recurring expense not found".to_string(),
        )));
    }

    let row = fetch_recurring(pool.get_ref(), user_id, recurring_id).await?;
    Ok(HttpResponse::Ok().json(to_response(row)?))
}

/// DELETE /api/recurring/{id}
pub async fn delete_recurring_expense(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let recurring_id = path.into_inner();

    let result = sqlx::query("DELETE FROM recurring_expenses WHERE id = $1 AND user_id = $2")
        .bind(recurring_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Recurring expense not found".to_string(),
        )));
    }

    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_recurring(
    pool: &PgPool,
    user_id: Uuid,
    recurring_id: Uuid,
) -> Result<RecurringRow, AppError> {
    sqlx::query_as::<_, RecurringRow>(
        r#"
        SELECT id, category_id, name, amount_cents, frequency, start_date, end_date,
               next_due_date, automatic_payment, created_at
        FROM recurring_expenses
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(recurring_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::Database(DatabaseError::NotFound(
            "Recurring expense not found".to_string(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, amount_cents: i64) -> RecurringExpenseRequest {
        RecurringExpenseRequest {
            category_id: Uuid::new_v4(),
            name: name.to_string(),
            amount_cents,
            frequency: FrequencyType::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end_date: None,
            next_due_date: None,
            automatic_payment: false,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_recurring_request(&request("Rent", 120000)).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_recurring_request(&request("", 120000)).is_err());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        assert!(validate_recurring_request(&request("Rent", 0)).is_err());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut form = request("Rent", 120000);
        form.end_date = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(validate_recurring_request(&form).is_err());
    }

    #[test]
    fn test_next_due_before_start_rejected() {
        let mut form = request("Rent", 120000);
        form.next_due_date = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(validate_recurring_request(&form).is_err());
    }

    #[test]
    fn test_frequency_round_trip() {
        for frequency in [
            FrequencyType::Daily,
            FrequencyType::Weekly,
            FrequencyType::Monthly,
            FrequencyType::Quarterly,
            FrequencyType::Yearly,
        ] {
            assert_eq!(FrequencyType::parse(frequency.as_str()).unwrap(), frequency);
        }
    }
}
