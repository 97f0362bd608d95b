use sqlx::SqlitePool;

/// A valid session joined to its owner's current access fields, produced by
/// one consistent read.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionUser {
    pub token: String,
    pub expires_at: i64,
    pub user_id: i64,
    pub email: String,
    pub trial_start: i64,
    pub trial_end: i64,
    pub subscription_status: String,
    pub billing_customer_id: Option<String>,
}

pub async fn insert_session(
    pool: &SqlitePool,
    token: &str,
    user_id: i64,
    now: i64,
    expires_at: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO sessions (token, user_id, created_at, expires_at, last_used_at) \
         VALUES (?1, ?2, ?3, ?4, ?3)",
    )
    .bind(token)
    .bind(user_id)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a session by token, filtered by non-expiry, joined to the owning
/// user. Expired or unknown tokens return None; there is no auto-renewal.
pub async fn session_with_user(
    pool: &SqlitePool,
    token: &str,
    now: i64,
) -> sqlx::Result<Option<SessionUser>> {
    sqlx::query_as::<_, SessionUser>(
        "SELECT s.token, s.expires_at, u.id AS user_id, u.email, \
                u.trial_start, u.trial_end, u.subscription_status, u.billing_customer_id \
         FROM sessions s JOIN users u ON u.id = s.user_id \
         WHERE s.token = ?1 AND s.expires_at > ?2",
    )
    .bind(token)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub async fn touch_session(pool: &SqlitePool, token: &str, now: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE sessions SET last_used_at = ?1 WHERE token = ?2")
        .bind(now)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Idempotent: deleting an unknown or already-revoked token succeeds.
pub async fn delete_session(pool: &SqlitePool, token: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn sweep_sessions(pool: &SqlitePool, now: i64) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
