/// Category Routes
///
/// Per-user expense categories. Deleting a category only deactivates it so
/// existing expenses keep their references.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, DatabaseError, ValidationError};

const MAX_CATEGORY_NAME_LENGTH: usize = 50;
const MAX_DESCRIPTION_LENGTH: usize = 255;

#[derive(Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

type CategoryRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    chrono::DateTime<Utc>,
);

fn to_response(row: CategoryRow) -> CategoryResponse {
    CategoryResponse {
        id: row.0.to_string(),
        name: row.1,
        description: row.2,
        color: row.3,
        icon: row.4,
        is_active: row.5,
        created_at: row.6.to_rfc3339(),
    }
}

fn validate_category_request(form: &CategoryRequest) -> Result<(), AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField(
            "name".to_string(),
        )));
    }
    if name.len() > MAX_CATEGORY_NAME_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "name".to_string(),
            MAX_CATEGORY_NAME_LENGTH,
        )));
    }
    if let Some(description) = &form.description {
        if description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(AppError::Validation(ValidationError::TooLong(
                "description".to_string(),
                MAX_DESCRIPTION_LENGTH,
            )));
        }
    }
    if let Some(color) = &form.color {
        // Hex color code, e.g. #1a2b3c
        let valid = color.len() == 7
            && color.starts_with('#')
            && color[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(AppError::Validation(ValidationError::InvalidFormat(
                "color".to_string(),
            )));
        }
    }
    Ok(())
}

/// GET /api/categories
///
/// List the current user's active categories.
pub async fn list_categories(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, description, color, icon, is_active, created_at
        FROM categories
        WHERE user_id = $1 AND is_active = true
        ORDER BY name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool.get_ref())
    .await?;

    let categories: Vec<CategoryResponse> = rows.into_iter().map(to_response).collect();
    Ok(HttpResponse::Ok().json(categories))
}

/// POST /api/categories
///
/// Create a category for the current user.
///
/// # Errors
/// - 400: Validation errors (empty name, bad color code)
/// - 500: Internal server error
pub async fn create_category(
    claims: web::ReqData<Claims>,
    form: web::Json<CategoryRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    validate_category_request(&form)?;

    let category_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO categories (id, user_id, name, description, color, icon, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, true, $7, $8)
        "#,
    )
    .bind(category_id)
    .bind(user_id)
    .bind(form.name.trim())
    .bind(&form.description)
    .bind(&form.color)
    .bind(&form.icon)
    .bind(now)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(user_id = %user_id, category_id = %category_id, "Category created");

    let row = fetch_category(pool.get_ref(), user_id, category_id).await?;
    Ok(HttpResponse::Created().json(to_response(row)))
}

/// GET /api/categories/{id}
pub async fn get_category(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let row = fetch_category(pool.get_ref(), user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(to_response(row)))
}

/// PUT /api/categories/{id}
///
/// # Errors
/// - 400: Validation errors
/// - 404: Category not found or owned by someone else
pub async fn update_category(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    form: web::Json<CategoryRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let category_id = path.into_inner();
    validate_category_request(&form)?;

    let result = sqlx::query(
        r#"
        UPDATE categories
        SET name = $1, description = $2, color = $3, icon = $4, updated_at = $5
        WHERE id = $6 AND user_id = $7
        "#,
    )
    .bind(form.name.trim())
    .bind(&form.description)
    .bind(&form.color)
    .bind(&form.icon)
    .bind(Utc::now())
    .bind(category_id)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Category not found".to_string(),
        )));
    }

    let row = fetch_category(pool.get_ref(), user_id, category_id).await?;
    Ok(HttpResponse::Ok().json(to_response(row)))
}

/// DELETE /api/categories/{id}
///
/// Deactivates the category. Expenses that reference it stay intact.
pub async fn delete_category(
    claims: web::ReqData<Claims>,
    path: web::Path<Uuid>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let category_id = path.into_inner();

    let result = sqlx::query(
        r#"
        UPDATE categories
        SET is_active = false, updated_at = $1
        WHERE id = $2 AND user_id = $3 AND is_active = true
        "#,
    )
    .bind(Utc::now())
    .bind(category_id)
    .bind(user_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Database(DatabaseError::NotFound(
            "Category not found".to_string(),
        )));
    }

    tracing::info!(user_id = %user_id, category_id = %category_id, "Category deactivated");

    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_category(
    pool: &PgPool,
    user_id: Uuid,
    category_id: Uuid,
) -> Result<CategoryRow, AppError> {
    sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, description, color, icon, is_active, created_at
        FROM categories
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(category_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::Database(DatabaseError::NotFound("Category not found".to_string()))
    })
}
