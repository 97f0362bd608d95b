use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod access;
mod auth;
mod billing;
mod health;
mod session;

use crate::access_control::AccessControlService;
use crate::billing::BillingOracle;
use crate::config::Config;
use crate::email::MailerService;
use crate::middleware::auth_middleware;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub mailer: MailerService,
    pub oracle: Arc<dyn BillingOracle>,
    pub access_control: AccessControlService,
    pub rate_limiter: RateLimiter,
}

pub fn router(state: AppState) -> Router {
    // Privileged routes sit behind the session middleware; everything the
    // client can reach without a session stays outside it.
    let protected = Router::new()
        .route("/access/status", get(access::status))
        .route("/billing/checkout", post(billing::checkout))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/auth/request-link", post(auth::request_link))
        .route(
            "/auth/verify-link",
            get(auth::verify_link_page).post(auth::verify_link),
        )
        .route("/session", post(session::action))
        .route("/billing/status", get(billing::status))
        // Authenticated by signature, not session.
        .route("/billing/webhook", post(billing::webhook))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
