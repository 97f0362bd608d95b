use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::auth::token::{issue_token, redeem_token};
use crate::error::AppError;
use crate::unix_now;

#[derive(Debug, Deserialize)]
pub struct RequestLinkBody {
    pub email: String,
}

/// POST /auth/request-link - issue a one-time sign-in link
///
/// Rate limits are checked before issuance: per source address and per
/// email, each with its own rolling window.
#[tracing::instrument(skip(state, headers, body), fields(email = %body.email))]
pub async fn request_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestLinkBody>,
) -> Result<impl IntoResponse, AppError> {
    let now = unix_now();

    let ip = client_ip(&headers);
    state.rate_limiter.check_ip(&ip, now).await?;
    state
        .rate_limiter
        .check_email(&body.email.trim().to_lowercase(), now)
        .await?;

    issue_token(
        &state.pool,
        &state.mailer,
        &state.config.auth,
        &state.config.email,
        &body.email,
        now,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Magic link sent. Check your inbox!",
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyLinkBody {
    pub token: String,
}

/// POST /auth/verify-link - redeem a magic link exactly once
#[tracing::instrument(skip_all)]
pub async fn verify_link(
    State(state): State<AppState>,
    Json(body): Json<VerifyLinkBody>,
) -> Result<impl IntoResponse, AppError> {
    let redemption = redeem_token(&state.pool, &state.config.auth, &body.token, unix_now()).await?;

    Ok(Json(json!({
        "success": true,
        "email": redemption.user.email,
        "session_token": redemption.session_token,
        "trial_end": redemption.user.trial_end,
        "subscription_status": redemption.user.subscription_status,
    })))
}

/// GET /auth/verify-link - client-side redeemer page
///
/// Mail scanners prefetch GET links; rendering a page that redeems via a
/// client-side POST keeps them from consuming the one-time token. The
/// token itself travels in the URL fragment and never reaches this
/// handler.
pub async fn verify_link_page() -> impl IntoResponse {
    Html(VERIFY_PAGE)
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

const VERIFY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Solace - Verifying...</title>
  <style>
    body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;display:flex;align-items:center;justify-content:center;min-height:100vh;margin:0;background:#0a0e27;color:#eaeaf1}
    .card{max-width:480px;margin:24px;padding:28px;border-radius:16px;background:rgba(255,255,255,.04);text-align:center}
    p{color:rgba(255,255,255,.8)}
  </style>
</head>
<body>
  <main class="card">
    <h1>Verifying&hellip;</h1>
    <p id="msg">Please wait while we confirm your link.</p>
  </main>
  <script>
    (async function () {
      var token = '';
      var hash = window.location.hash || '';
      if (hash.indexOf('token=') >= 0) {
        token = decodeURIComponent(hash.split('token=')[1] || '');
      }
      if (!token) {
        token = new URLSearchParams(window.location.search).get('token') || '';
      }
      var msg = document.getElementById('msg');
      try {
        var resp = await fetch('/auth/verify-link', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ token: token })
        });
        var data = await resp.json();
        if (resp.ok && data.success) {
          localStorage.setItem('sessionToken', data.session_token);
          localStorage.setItem('userEmail', data.email);
          window.location.href = '/companion';
        } else {
          msg.textContent = data.error || 'This link is invalid or has expired. Please request a new one.';
        }
      } catch (e) {
        msg.textContent = 'Something went wrong. Please try again.';
      }
    })();
  </script>
</body>
</html>
"#;
