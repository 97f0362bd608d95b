use sqlx::SqlitePool;

pub async fn insert_magic_link(
    pool: &SqlitePool,
    token: &str,
    email: &str,
    now: i64,
    expires_at: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO magic_links (token, email, created_at, expires_at, used) \
         VALUES (?1, ?2, ?3, ?4, 0)",
    )
    .bind(token)
    .bind(email)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically redeem a magic link, returning the owning email.
///
/// The check-and-mark step is one conditional UPDATE: of N concurrent
/// redemptions of the same token, exactly one observes `used = 0` and wins.
/// Used, expired and unknown tokens are indistinguishable to the caller
/// (all return None).
pub async fn redeem_magic_link(
    pool: &SqlitePool,
    token: &str,
    now: i64,
) -> sqlx::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "UPDATE magic_links SET used = 1 \
         WHERE token = ?1 AND used = 0 AND expires_at > ?2 \
         RETURNING email",
    )
    .bind(token)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(email,)| email))
}

/// Remove a link whose delivery failed, so no orphan redeemable token
/// outlives the failed send.
pub async fn delete_magic_link(pool: &SqlitePool, token: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM magic_links WHERE token = ?1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete expired links, and used links older than a day.
pub async fn sweep_magic_links(pool: &SqlitePool, now: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM magic_links WHERE expires_at < ?1 OR (used = 1 AND created_at < ?2)",
    )
    .bind(now)
    .bind(now - 24 * 3600)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
