//! Expiry sweep for sessions and magic links.
//!
//! Correctness never depends on the sweep: reads filter on `expires_at`
//! and redemption checks `used`, so a late or skipped sweep only leaves
//! dead rows behind. The sweep exists to keep the tables small.

use sqlx::SqlitePool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::error::AppError;
use crate::unix_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_removed: u64,
    pub magic_links_removed: u64,
}

/// Delete expired sessions, and magic links that are expired or were
/// redeemed more than a day ago. Idempotent.
#[tracing::instrument(skip(pool))]
pub async fn run_sweep(pool: &SqlitePool, now: i64) -> Result<SweepReport, AppError> {
    let sessions_removed = crate::queries::session::sweep_sessions(pool, now).await?;
    let magic_links_removed = crate::queries::token::sweep_magic_links(pool, now).await?;

    tracing::info!(sessions_removed, magic_links_removed, "Expiry sweep complete");
    Ok(SweepReport {
        sessions_removed,
        magic_links_removed,
    })
}

/// Nightly sweep at 02:00 server time.
pub async fn scheduler(pool: &SqlitePool) -> Result<JobScheduler, JobSchedulerError> {
    let sched = JobScheduler::new().await?;
    let pool = pool.clone();

    sched
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let pool = pool.clone();

            Box::pin(async move {
                if let Err(err) = run_sweep(&pool, unix_now()).await {
                    tracing::error!(err = %err, "Expiry sweep failed");
                }
            })
        })?)
        .await?;

    sched.start().await?;

    Ok(sched)
}
