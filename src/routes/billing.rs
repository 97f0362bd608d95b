use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::access_control::trial_hours_remaining;
use crate::billing::signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
use crate::billing::webhook::{apply_billing_event, parse_event};
use crate::billing::Plan;
use crate::error::AppError;
use crate::middleware::Auth;
use crate::queries::user::{get_user_by_email, SubscriptionStatus};
use crate::unix_now;

/// POST /billing/webhook - provider event ingestion.
///
/// The signature is the only gate worth a non-2xx: a processing failure
/// after a valid signature is acknowledged anyway, since the provider's
/// retry would hit the same failure and the next subscription event
/// reconciles the row regardless.
#[tracing::instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let header = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    verify_signature(
        &body,
        header,
        &state.config.stripe.webhook_secret,
        unix_now(),
        DEFAULT_TOLERANCE_SECS,
    )
    .map_err(|_| AppError::InvalidSignature)?;

    match std::str::from_utf8(&body) {
        Ok(payload) => match parse_event(payload) {
            Ok(event) => {
                if let Err(e) = apply_billing_event(&state.pool, event).await {
                    tracing::error!(error = %e, "Webhook processing failed");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Webhook payload could not be parsed");
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Webhook payload is not valid UTF-8");
        }
    }

    Ok(Json(json!({ "received": true })))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default = "default_plan")]
    pub plan: Plan,
}

fn default_plan() -> Plan {
    Plan::Monthly
}

/// POST /billing/checkout - start a subscription checkout for the
/// authenticated user.
#[tracing::instrument(skip_all, fields(user_id = auth.session.user_id))]
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<Auth>,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .oracle
        .create_checkout_session(&auth.session.email, auth.session.user_id, body.plan)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Checkout session creation failed");
            AppError::UpstreamUnavailable("billing".to_string())
        })?;

    Ok(Json(json!({
        "checkout_url": session.checkout_url,
        "session_id": session.session_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub email: Option<String>,
}

/// GET /billing/status?email= - unauthenticated subscription poll.
///
/// Guests and unknown emails get the empty shape rather than an error, so
/// the client can render the signed-out state from the same response.
#[tracing::instrument(skip_all)]
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, AppError> {
    let now = unix_now();

    let user = match query.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => {
            get_user_by_email(&state.pool, &email.to_lowercase()).await?
        }
        _ => None,
    };

    let subscription = match user {
        Some(user) => {
            let is_on_trial =
                user.status() == SubscriptionStatus::Trial && now < user.trial_end;
            json!({
                "status": user.subscription_status,
                "is_on_trial": is_on_trial,
                "hours_remaining": if is_on_trial {
                    trial_hours_remaining(user.trial_end, now)
                } else {
                    0
                },
            })
        }
        None => json!({
            "status": "none",
            "is_on_trial": false,
            "hours_remaining": 0,
        }),
    };

    Ok(Json(json!({ "subscription": subscription })))
}
