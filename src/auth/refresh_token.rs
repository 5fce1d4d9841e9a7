/// Refresh Token Management
///
/// Handles secure refresh token generation, storage, validation, and revocation.
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use with automatic revocation on refresh (token rotation)
/// - Database-backed for revocation support
///
/// Access tokens stay stateless; only refresh tokens touch the database.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Generate a new cryptographically secure refresh token
///
/// Creates a 64-character random alphanumeric token.
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
///
/// Never store plaintext tokens in the database.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Save a refresh token to the database
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `user_id` - User ID that owns this token
/// * `token` - Plaintext refresh token
/// * `expiry_seconds` - Token lifetime in seconds
///
/// # Errors
/// Returns error if database operation fails
pub async fn save_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    let expires_at = Utc::now() + Duration::seconds(expiry_seconds);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Validate a refresh token
///
/// Checks:
/// 1. Token exists in database
/// 2. Token has not been revoked
/// 3. Token has not expired
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `token` - Plaintext refresh token to validate
///
/// # Returns
/// User ID associated with the token if valid
///
/// # Errors
/// Returns `AuthError::TokenInvalid` for unknown or revoked tokens and
/// `AuthError::TokenExpired` for stale ones; the caller sees both as an
/// unauthenticated request
pub async fn validate_refresh_token(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let token_hash = hash_token(token);

    let result = sqlx::query_as::<_, (Uuid, chrono::DateTime<Utc>, bool)>(
        r#"
        SELECT user_id, expires_at, revoked
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match result {
        None => {
            tracing::warn!("Refresh token not found in database");
            Err(AppError::Auth(AuthError::TokenInvalid))
        }
        Some((user_id, expires_at, revoked)) => {
            // Check if token is revoked
            if revoked {
                tracing::warn!(user_id = %user_id, "Attempt to use revoked refresh token");
                return Err(AppError::Auth(AuthError::TokenInvalid));
            }

            // Check if token has expired
            if expires_at < Utc::now() {
                tracing::info!(user_id = %user_id, "Refresh token expired");
                return Err(AppError::Auth(AuthError::TokenExpired));
            }

            Ok(user_id)
        }
    }
}

/// Revoke a single refresh token
///
/// Used for token rotation and logout; the reason is recorded for audit.
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `token` - Plaintext refresh token to revoke
/// * `reason` - Short reason, e.g. "rotated" or "logout"
///
/// # Errors
/// Returns error if database operation fails
pub async fn revoke_refresh_token(
    pool: &PgPool,
    token: &str,
    reason: &str,
) -> Result<(), AppError> {
    let token_hash = hash_token(token);

    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = $1, revoked_reason = $2
        WHERE token_hash = $3
        "#,
    )
    .bind(Utc::now())
    .bind(reason)
    .bind(token_hash)
    .execute(pool)
    .await?;

    Ok(())
}

/// Revoke all refresh tokens for a user
///
/// Used on password change and account deletion so stolen refresh tokens
/// die with the credential.
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `user_id` - User whose tokens to revoke
/// * `reason` - Short reason, e.g. "password_change"
///
/// # Errors
/// Returns error if database operation fails
pub async fn revoke_all_user_tokens(
    pool: &PgPool,
    user_id: Uuid,
    reason: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = $1, revoked_reason = $2
        WHERE user_id = $3 AND revoked = false
        "#,
    )
    .bind(Utc::now())
    .bind(reason)
    .bind(user_id)
    .execute(pool)
    .await?;

    tracing::info!(user_id = %user_id, "All refresh tokens revoked for user");
    Ok(())
}
