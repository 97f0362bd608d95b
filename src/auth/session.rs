//! Session lifecycle: bearer credentials backed by durable rows.

use sqlx::SqlitePool;

use crate::error::AppError;
use crate::queries;
use crate::queries::session::SessionUser;

/// Create a session for a user. The durable row write is the operation;
/// there is no in-memory session state to drift from it.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    now: i64,
    ttl_days: i64,
) -> Result<String, AppError> {
    let token = super::generate_token();
    let expires_at = now + ttl_days * 24 * 3600;
    queries::session::insert_session(pool, &token, user_id, now, expires_at).await?;
    Ok(token)
}

/// Validate a session token. Expired or unknown tokens are both
/// `Unauthorized`; validity and the owner's current trial/subscription
/// fields come from one consistent read.
pub async fn validate_session(
    pool: &SqlitePool,
    token: &str,
    now: i64,
) -> Result<SessionUser, AppError> {
    let Some(session) = queries::session::session_with_user(pool, token, now).await? else {
        return Err(AppError::Unauthorized);
    };

    queries::session::touch_session(pool, token, now).await?;
    Ok(session)
}

/// Validate a session token and cross-check that it belongs to the claimed
/// email. A token presented alongside someone else's email is rejected.
pub async fn validate_session_for_email(
    pool: &SqlitePool,
    token: &str,
    email: &str,
    now: i64,
) -> Result<SessionUser, AppError> {
    let session = validate_session(pool, token, now).await?;
    if !session.email.eq_ignore_ascii_case(email.trim()) {
        tracing::warn!("Session token presented with a mismatched email");
        return Err(AppError::Unauthorized);
    }
    Ok(session)
}

/// Revoke a session. Immediate and idempotent: revoking an unknown or
/// already-revoked token succeeds silently.
pub async fn revoke_session(pool: &SqlitePool, token: &str) -> Result<(), AppError> {
    queries::session::delete_session(pool, token).await?;
    Ok(())
}
