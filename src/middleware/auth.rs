use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::session::validate_session;
use crate::error::AppError;
use crate::queries::session::SessionUser;
use crate::routes::AppState;
use crate::unix_now;

/// Auth extension: the validated session joined to its owner, available to
/// privileged handlers.
#[derive(Clone, Debug)]
pub struct Auth {
    pub session: SessionUser,
}

/// Session-token middleware for privileged routes.
///
/// Expects `Authorization: Bearer <session token>`. Session validity is
/// checked before any trial or billing computation runs, so an
/// unauthenticated caller learns nothing about trial state.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::warn!("Missing bearer session token");
        return AppError::Unauthorized.into_response();
    };

    match validate_session(&state.pool, token, unix_now()).await {
        Ok(session) => {
            req.extensions_mut().insert(Auth { session });
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
