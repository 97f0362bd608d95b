use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum::{Display, EnumString};

/// Local subscription state, reconciled by billing webhook events.
///
/// `inactive` covers cancellation and payment failure alike; the billing
/// oracle distinguishes the two at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    #[strum(to_string = "inactive", serialize = "payment_failed")]
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub phone: Option<String>,
    pub trial_start: i64,
    pub trial_end: i64,
    pub subscription_status: String,
    pub billing_customer_id: Option<String>,
    pub created_at: i64,
}

impl User {
    pub fn status(&self) -> SubscriptionStatus {
        self.subscription_status
            .parse()
            .unwrap_or(SubscriptionStatus::Inactive)
    }
}

pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Create a user with a fresh trial window, or return the existing row.
///
/// Existing users keep their original trial window: a lapsed trial is not
/// silently re-extended by redeeming another link.
pub async fn get_or_create_user(
    pool: &SqlitePool,
    email: &str,
    now: i64,
    trial_hours: i64,
) -> sqlx::Result<User> {
    let trial_end = now + trial_hours * 3600;

    sqlx::query(
        "INSERT INTO users (email, trial_start, trial_end, subscription_status, created_at) \
         VALUES (?1, ?2, ?3, 'trial', ?2) \
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(email)
    .bind(now)
    .bind(trial_end)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
        .bind(email)
        .fetch_one(pool)
        .await
}

/// Absolute status assignment, keyed by email. Used by webhook
/// reconciliation; replaying the same event is a no-op by construction.
pub async fn set_subscription_status_by_email(
    pool: &SqlitePool,
    email: &str,
    status: SubscriptionStatus,
    billing_customer_id: Option<&str>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE users SET subscription_status = ?1, \
         billing_customer_id = COALESCE(?2, billing_customer_id) \
         WHERE email = ?3",
    )
    .bind(status.as_str())
    .bind(billing_customer_id)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_subscription_status_by_customer(
    pool: &SqlitePool,
    billing_customer_id: &str,
    status: SubscriptionStatus,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE users SET subscription_status = ?1 WHERE billing_customer_id = ?2",
    )
    .bind(status.as_str())
    .bind(billing_customer_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(SubscriptionStatus::Trial.as_str(), "trial");
        assert_eq!(
            "active".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Active
        );
        // Legacy alias written by an earlier webhook handler generation.
        assert_eq!(
            "payment_failed".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Inactive
        );
    }
}
