use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::auth::session::{create_session, revoke_session, validate_session_for_email};
use crate::error::AppError;
use crate::unix_now;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Create,
    Validate,
    Revoke,
}

#[derive(Debug, Deserialize)]
pub struct SessionBody {
    pub action: SessionAction,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

/// POST /session - session lifecycle in one action-dispatched endpoint.
///
/// `create` rotates an existing valid session into a fresh token; it never
/// mints a session from a bare email. `validate` returns the owner's
/// current account fields. `revoke` is idempotent.
#[tracing::instrument(skip_all)]
pub async fn action(
    State(state): State<AppState>,
    Json(body): Json<SessionBody>,
) -> Result<impl IntoResponse, AppError> {
    let now = unix_now();

    match body.action {
        SessionAction::Create => {
            let token = require(body.session_token)?;
            let email = require(body.email)?;
            let session =
                validate_session_for_email(&state.pool, &token, &email, now).await?;

            let fresh = create_session(
                &state.pool,
                session.user_id,
                now,
                state.config.auth.session_ttl_days,
            )
            .await?;
            revoke_session(&state.pool, &token).await?;

            Ok(Json(json!({
                "success": true,
                "session_token": fresh,
                "expires_at": now + state.config.auth.session_ttl_days * 24 * 3600,
            })))
        }
        SessionAction::Validate => {
            let token = require(body.session_token)?;
            let email = require(body.email)?;
            let session =
                validate_session_for_email(&state.pool, &token, &email, now).await?;

            Ok(Json(json!({
                "valid": true,
                "user": {
                    "email": session.email,
                    "trial_start": session.trial_start,
                    "trial_end": session.trial_end,
                    "subscription_status": session.subscription_status,
                },
            })))
        }
        SessionAction::Revoke => {
            let token = require(body.session_token)?;
            revoke_session(&state.pool, &token).await?;
            Ok(Json(json!({ "success": true })))
        }
    }
}

fn require(field: Option<String>) -> Result<String, AppError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Unauthorized),
    }
}
