//! Fixed-window request counters for the auth endpoints.
//!
//! In-process only: counters live in a shared map, so limits apply per
//! instance, not per deployment. A multi-instance deployment needs an
//! external counter service behind the same interface.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: i64,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cap per-email issuance frequency. Separate window from the per-IP
    /// cap; both are checked independently by the caller.
    pub async fn check_email(&self, email: &str, now: i64) -> Result<(), AppError> {
        self.check(
            format!("email:{email}"),
            self.config.email_max_per_window,
            self.config.email_window_seconds,
            now,
        )
        .await
    }

    pub async fn check_ip(&self, ip: &str, now: i64) -> Result<(), AppError> {
        self.check(
            format!("ip:{ip}"),
            self.config.ip_max_per_window,
            self.config.ip_window_seconds,
            now,
        )
        .await
    }

    async fn check(
        &self,
        key: String,
        max_requests: u32,
        window_seconds: i64,
        now: i64,
    ) -> Result<(), AppError> {
        let mut windows = self.windows.lock().await;

        // Opportunistic cleanup so the map doesn't grow without bound.
        if windows.len() > 10_000 {
            windows.retain(|_, w| now - w.started_at < window_seconds);
        }

        let window = windows.entry(key.clone()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now - window.started_at >= window_seconds {
            window.started_at = now;
            window.count = 0;
        }

        window.count += 1;
        if window.count > max_requests {
            let retry_after = window.started_at + window_seconds - now;
            tracing::warn!(%key, count = window.count, "Rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after: retry_after.max(1),
            });
        }

        Ok(())
    }
}
