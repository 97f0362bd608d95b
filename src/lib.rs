pub mod access_control;
pub mod auth;
pub mod billing;
pub mod config;
pub mod email;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod queries;
pub mod rate_limit;
pub mod routes;
pub mod sweep;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::access_control::AccessControlService;
use crate::billing::BillingOracle;
use crate::config::Config;
use crate::email::MailerService;
use crate::rate_limit::RateLimiter;
use crate::routes::AppState;

/// Current unix timestamp. All persistence and comparisons run on epoch
/// seconds; `OffsetDateTime` only appears at this single conversion point.
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Assemble the application router from its dependencies. Tests call this
/// with an in-memory pool, a non-sending mailer and a mock oracle.
pub fn create_app(
    pool: SqlitePool,
    config: Config,
    mailer: MailerService,
    oracle: Arc<dyn BillingOracle>,
) -> axum::Router {
    let rate_limiter = RateLimiter::new(config.rate_limit.clone());
    let state = AppState {
        pool,
        config,
        mailer,
        access_control: AccessControlService::new(oracle.clone()),
        oracle,
        rate_limiter,
    };
    routes::router(state)
}
