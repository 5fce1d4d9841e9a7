/// Authentication Routes
///
/// Handles user registration, login, token refresh, logout, and account
/// management for the current user.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{
    generate_access_token, generate_refresh_token, hash_password, revoke_all_user_tokens,
    revoke_refresh_token, save_refresh_token, validate_password_strength, validate_refresh_token,
    verify_password, Claims,
};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::validators::{is_valid_email, is_valid_person_name, is_valid_username};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request (revokes the presented refresh token)
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Password change request
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

/// POST /auth/register
///
/// Register a new user with username, email, and password.
/// Returns access token and refresh token on success.
///
/// # Validation
/// - Username must be 3-50 chars, letters/digits/._- only, not taken
/// - Email must be valid format and not already registered
/// - Password must be 8+ chars with digit, lowercase, and uppercase
///
/// # Errors
/// - 400: Validation errors (invalid username/email/password)
/// - 409: Username or email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    // Validate inputs
    let username = is_valid_username(&form.username)?;
    let email = is_valid_email(&form.email)?;
    let first_name = match form.first_name.as_deref() {
        Some(name) => Some(is_valid_person_name("first_name", name)?),
        None => None,
    };
    let last_name = match form.last_name.as_deref() {
        Some(name) => Some(is_valid_person_name("last_name", name)?),
        None => None,
    };
    validate_password_strength(&form.password)?;
    let password_hash = hash_password(&form.password)?;

    // Create user; unique indexes on username and email turn duplicates
    // into a 409 via the sqlx error mapping
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, first_name, last_name, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, true, $7, $8)
        "#,
    )
    .bind(user_id)
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(&first_name)
    .bind(&last_name)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    // Generate tokens
    let access_token = generate_access_token(&user_id, &username, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    // Save refresh token to database
    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/login
///
/// Authenticate user with username and password.
/// Returns access token and refresh token on success.
///
/// # Errors
/// - 400: Validation error (malformed username)
/// - 401: Invalid credentials (username not found or wrong password)
/// - 403: Account is inactive
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses same error for "not found" and "wrong password"
/// - Prevents user enumeration attacks
/// - Only returns tokens if account is active
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let username = is_valid_username(&form.username)?;

    // Fetch user from database
    let user = sqlx::query_as::<_, (Uuid, String, String, bool)>(
        "SELECT id, username, password_hash, is_active FROM users WHERE username = $1",
    )
    .bind(&username)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    let (user_id, username, password_hash, is_active) = user;

    // Verify password before anything else leaks account state
    if !verify_password(&form.password, &password_hash) {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    // Check if account is active
    if !is_active {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    // Record the successful login
    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    // Generate tokens
    let access_token = generate_access_token(&user_id, &username, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    // Save refresh token to database
    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/refresh
///
/// Refresh access token using a refresh token.
/// Implements token rotation: old token is revoked, new token is issued.
///
/// # Token Rotation Security
/// - Old refresh token is revoked after new token is issued
/// - If client uses old token again after refresh, it will be rejected
/// - Detects token theft: attacker cannot reuse stolen token if legitimate refresh already happened
///
/// # Errors
/// - 401: Invalid, expired, or revoked refresh token
/// - 403: Associated account is inactive
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    // Validate refresh token and get user_id
    let user_id = validate_refresh_token(pool.get_ref(), &form.refresh_token).await?;

    // Revoke old token (token rotation)
    revoke_refresh_token(pool.get_ref(), &form.refresh_token, "rotated").await?;

    // Fetch username, refusing inactive accounts
    let username = sqlx::query_scalar::<_, String>(
        "SELECT username FROM users WHERE id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(AppError::Auth(AuthError::AccountInactive))?;

    // Generate new tokens
    let access_token = generate_access_token(&user_id, &username, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();

    // Save new refresh token to database
    save_refresh_token(
        pool.get_ref(),
        user_id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/logout
///
/// Revoke the presented refresh token. The access token cannot be revoked
/// and simply runs out its remaining lifetime; the client discards it.
///
/// # Errors
/// - 400: Missing refresh token in body
/// - 500: Internal server error
pub async fn logout(
    form: web::Json<LogoutRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    revoke_refresh_token(pool.get_ref(), &form.refresh_token, "logout").await?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/me
///
/// Get current authenticated user's information.
/// **Requires valid JWT access token** in Authorization header.
///
/// # Authentication
/// - Requires: `Authorization: Bearer <access_token>`
/// - Claims are injected by JWT middleware
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User not found (account deleted after token issuance)
/// - 500: Internal server error
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, (
        Uuid,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<chrono::DateTime<Utc>>,
        chrono::DateTime<Utc>,
    )>(
        r#"
        SELECT id, username, email, first_name, last_name, last_login, created_at
        FROM users WHERE id = $1 AND is_active = true
        "#,
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        username: user.1,
        email: user.2,
        first_name: user.3,
        last_name: user.4,
        last_login: user.5.map(|dt| dt.to_rfc3339()),
        created_at: user.6.to_rfc3339(),
    }))
}

/// PUT /api/me/password
///
/// Change the current user's password. The credential record is otherwise
/// immutable; this is the one sanctioned mutation. All refresh tokens are
/// revoked so stolen sessions die with the old credential.
///
/// # Errors
/// - 400: New password fails strength validation
/// - 401: Current password does not match
/// - 500: Internal server error
pub async fn change_password(
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("password_change");
    let user_id = claims.user_id()?;

    let password_hash = sqlx::query_scalar::<_, String>(
        "SELECT password_hash FROM users WHERE id = $1 AND is_active = true",
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    if !verify_password(&form.current_password, &password_hash) {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    validate_password_strength(&form.new_password)?;
    let new_hash = hash_password(&form.new_password)?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(&new_hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    revoke_all_user_tokens(pool.get_ref(), user_id, "password_change").await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Password changed successfully"
    );

    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/me
///
/// Delete the current user's account. Categories, expenses, budgets,
/// recurring expenses, and refresh tokens cascade with the user row; the
/// credential record is destroyed with it.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 500: Internal server error
pub async fn delete_account(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_deletion");
    let user_id = claims.user_id()?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Account deleted"
    );

    Ok(HttpResponse::NoContent().finish())
}
