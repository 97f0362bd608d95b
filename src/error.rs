use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Redemption failure. Deliberately covers used, expired and unknown
    /// tokens with one message so callers cannot enumerate token state.
    #[error("Invalid or expired link")]
    InvalidOrExpiredToken,

    #[error("Unauthorized")]
    Unauthorized,

    /// Webhook payload whose signature header does not verify.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Soft deny: trial window elapsed and no paid subscription.
    #[error("Trial expired")]
    TrialExpired,

    /// Hard deny: the billing provider reports a failed or incomplete
    /// payment state for this user.
    #[error("Payment required")]
    PaymentRequired,

    #[error("Too many requests")]
    RateLimited { retry_after: i64 },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": msg, "code": "VALIDATION_ERROR" })),
            )
                .into_response(),
            AppError::InvalidOrExpiredToken => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "This link is invalid, expired, or has already been used.",
                    "code": "INVALID_OR_EXPIRED_TOKEN",
                })),
            )
                .into_response(),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid or expired session", "code": "UNAUTHORIZED" })),
            )
                .into_response(),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Webhook signature verification failed",
                    "code": "INVALID_SIGNATURE",
                })),
            )
                .into_response(),
            // Access denials are polled by the client as normal flow control,
            // so they travel as 200 with an error code rather than an HTTP
            // error status.
            AppError::TrialExpired => (
                StatusCode::OK,
                Json(json!({
                    "error": "Your free trial has ended.",
                    "code": "TRIAL_EXPIRED",
                })),
            )
                .into_response(),
            AppError::PaymentRequired => (
                StatusCode::OK,
                Json(json!({
                    "error": "Your subscription payment is incomplete or past due.",
                    "code": "PAYMENT_REQUIRED",
                })),
            )
                .into_response(),
            AppError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                Json(json!({
                    "error": "Too many requests. Please try again later.",
                    "code": "RATE_LIMITED",
                    "retry_after": retry_after,
                })),
            )
                .into_response(),
            AppError::UpstreamUnavailable(service) => {
                tracing::error!(%service, "Upstream service unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "A required service is temporarily unavailable. Please try again.",
                        "code": "UPSTREAM_UNAVAILABLE",
                    })),
                )
                    .into_response()
            }
            AppError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
                internal_response()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal_response()
            }
        }
    }
}

fn internal_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "An unexpected error occurred. Please try again later.",
            "code": "INTERNAL_ERROR",
        })),
    )
        .into_response()
}
