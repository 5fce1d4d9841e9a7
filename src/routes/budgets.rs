/// Budget Routes
///
/// A budget caps spending for one category over a fixed window. The status
/// endpoint compares the cap against the summed expenses in that window.

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, DatabaseError, ValidationError};

/// Budgeting period granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            "quarterly" => Ok(PeriodType::Quarterly),
            "yearly" => Ok(PeriodType::Yearly),
            other => Err(AppError::Internal(format!(
                "unknown period_type in database: {}",
                other
            ))),
        }
    }
}

#[derive(Deserialize)]
pub struct BudgetRequest {
    pub category_id: Uuid,
    pub amount_cents: i64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct BudgetResponse {
    pub id: String,
    pub category_id: String,
    pub amount_cents: i64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: String,
}

/// Spending against the budget cap within its window
#[derive(Serialize)]
pub struct BudgetStatusResponse {
    pub id: String,
    pub category_id: String,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
}

type BudgetRow = (
    Uuid,
    Uuid,
    i64,
    String,
    NaiveDate,
    NaiveDate,
    chrono::DateTime<Utc>,
);

fn to_response(row: BudgetRow) -> Result<BudgetResponse, AppError> {
    Ok(BudgetResponse {
        id: row.0.to_string(),
        category_id: row.1.to_string(),
        amount_cents: row.2,
        period_type: PeriodType::parse(&row.3)?,
        start_date: row.4,
        end_date: row.5,
        created_at: row.6.to_rfc3339(),
    })
}

fn validate_budget_request(form: &BudgetRequest) -> Result<(), AppError> {
    if form.amount_cents <= 0 {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "amount_cents must be positive".to_string(),
        )));
    }
    if form.end_date <= form.start_date {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "end_date must be after start_date".to_string(),
        )));
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

/// GET /api/budgets
pub async fn list_budgets(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows = sqlx::query_as::<_, BudgetRow>(
        r#"
        SELECT id, category_id, amount_cents, period_type, start_date, end_date, created_at
        FROM budgets
        WHERE user_id = $1
        ORDER BY start_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool.get_ref())
    .await?;

    let budgets = rows
        .into_iter()
        .map(to_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(budgets))
}

/// POST /api/budgets
///
/// # Errors
/// - 400: Validation errors (non-positive amount, inverted window)
/// - 404: Category not found or owned by someone else
pub async fn create_budget(
    claims: web::ReqData<Claims>,
    form: web::Json<BudgetRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    validate_budget_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let budget_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO budgets (id, user_id, category_id, amount_cents, period_type, start_date, end_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(budget_id)
    .bind(user_id)
    .bind(form.category_id)
    .bind(form.amount_cents)
    .bind(form.period_type.as_str())
    .bind(form.start_date)
    .bind(form.end_date)
    .bind(now)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, budget_id = %budget_id, "Budget created");

    let row = fetch_budget(pool.get_ref(), user_id, budget_id).await?;
    Ok(HttpResponse::Created().json(to_response(row)?))
}

/// GET /api/budgets/{id}
pub async fn get_budget(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let row = fetch_budget(pool.get_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(to_response(row)?))
}

/// GET /api/budgets/{id}/status
///
/// Spent vs cap for the budget's window; the sum over expenses is a single
/// aggregate query.
pub async fn budget_status(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let row = fetch_budget(pool.get_ref(), user_id, path.into_inner()).await?;

    let spent_cents = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
        FROM expenses
        WHERE user_id = $1 AND category_id = $2 AND date >= $3 AND date <= $4
        "#,
    )
    .bind(user_id)
    .bind(row.1)
    .bind(row.4)
    .bind(row.5)
    .fetch_one(pool.get_ref())
    .await?;

    let limit_cents = row.2;
    Ok(HttpResponse::Ok().json(BudgetStatusResponse {
        id: row.0.to_string(),
        category_id: row.1.to_string(),
        period_type: PeriodType::parse(&row.3)?,
        start_date: row.4,
        end_date: row.5,
        limit_cents,
        spent_cents,
        remaining_cents: limit_cents - spent_cents,
    }))
}

/// PUT /api/budgets/{id}
pub async fn update_budget(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    form: web::Json<BudgetRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let budget_id = path.into_inner();
    validate_budget_request(&form)?;
    ensure_category_owned(pool.get_ref(), user_id, form.category_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE budgets
        SET category_id = $1, amount_cents = $2, period_type = $3,
            start_date = $4, end_date = $5, updated_at = $6
        WHERE id = $7 AND user_id = $8
        "#,
    )
    .bind(form.category_id)
    .bind(form.amount_cents)
    .bind(form.period_type.as_str())
    .bind(form.start_date)
    .bind(form.end_date)
    .bind(Utc::now())
    .bind(budget_id)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Budget not found".to_string(),
        )));
    }

    let row = fetch_budget(pool.get_ref(), user_id, budget_id).await?;
    Ok(HttpResponse::Ok().json(to_response(row)?))
}

/// DELETE /api/budgets/{id}
pub async fn delete_budget(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let budget_id = path.into_inner();

    let result = sqlx::query("DELETE FROM budgets WHERE id = $1 AND user_id = $2")
        .bind(budget_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Budget not found".to_string(),
        )));
    }

    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_budget(pool: &PgPool, user_id: Uuid, budget_id: Uuid) -> Result<BudgetRow, AppError> {
    sqlx::query_as::<_, BudgetRow>(
        r#"
        SELECT id, category_id, amount_cents, period_type, start_date, end_date, created_at
        FROM budgets
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(budget_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Database(DatabaseError::NotFound("Budget not found".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount_cents: i64, start: (i32, u32, u32), end: (i32, u32, u32)) -> BudgetRequest {
        BudgetRequest {
            category_id: Uuid::new_v4(),
            amount_cents,
            period_type: PeriodType::Monthly,
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_budget_request(&request(50000, (2024, 5, 1), (2024, 5, 31))).is_ok());
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        assert!(validate_budget_request(&request(0, (2024, 5, 1), (2024, 5, 31))).is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(validate_budget_request(&request(50000, (2024, 5, 31), (2024, 5, 1))).is_err());
        assert!(validate_budget_request(&request(50000, (2024, 5, 1), (2024, 5, 1))).is_err());
    }

    #[test]
    fn test_period_type_round_trip() {
        for period in [
            PeriodType::Weekly,
            PeriodType::Monthly,
            PeriodType::Quarterly,
            PeriodType::Yearly,
        ] {
            assert_eq!(PeriodType::parse(period.as_str()).unwrap(), period);
        }
    }

    #[test]
    fn test_unknown_period_type_rejected() {
        assert!(PeriodType::parse("biweekly").is_err());
    }
}
