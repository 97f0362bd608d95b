use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde_json::json;

use super::AppState;
use crate::access_control::{trial_hours_remaining, AccessDecision, DenyReason};
use crate::error::AppError;
use crate::middleware::Auth;
use crate::unix_now;

/// GET /access/status - the per-request access gate for paid features.
///
/// Denials are 200s carrying an error code: clients poll this endpoint as
/// normal flow control and branch on the code, not the status line.
#[tracing::instrument(skip_all, fields(user_id = auth.session.user_id))]
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<Auth>,
) -> Result<impl IntoResponse, AppError> {
    let now = unix_now();
    let decision = state.access_control.check_access(&auth.session, now).await?;

    match decision {
        AccessDecision::Allow => Ok(Json(json!({
            "access": "allowed",
            "subscription_status": auth.session.subscription_status,
            "trial_hours_remaining": trial_hours_remaining(auth.session.trial_end, now),
        }))),
        AccessDecision::Deny(DenyReason::TrialExpired) => Err(AppError::TrialExpired),
        AccessDecision::Deny(DenyReason::PaymentRequired) => Err(AppError::PaymentRequired),
    }
}
