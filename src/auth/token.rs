//! Magic-link issuance and redemption.
//!
//! A link token moves through `unused -> used` (terminal) or
//! `unused -> expired` (terminal). Redemption is a single conditional
//! update; see [`crate::queries::token::redeem_magic_link`].

use sqlx::SqlitePool;
use validator::ValidateEmail;

use crate::auth::session;
use crate::config::{AuthConfig, EmailConfig};
use crate::email::MailerService;
use crate::error::AppError;
use crate::queries;
use crate::queries::user::User;

pub struct IssuedLink {
    pub token: String,
    pub link: String,
}

/// Issue a one-time login link and deliver it by email.
///
/// Issuance and delivery are one unit: if the send fails, the token row is
/// removed and the caller gets `UpstreamUnavailable`. Re-requesting a link
/// issues a new token; there is no retry-send path for an undelivered one.
#[tracing::instrument(skip(pool, mailer, auth, email_cfg), fields(email = %email))]
pub async fn issue_token(
    pool: &SqlitePool,
    mailer: &MailerService,
    auth: &AuthConfig,
    email_cfg: &EmailConfig,
    email: &str,
    now: i64,
) -> Result<IssuedLink, AppError> {
    let email = normalize_email(email)?;

    let token = super::generate_token();
    let expires_at = now + auth.magic_link_ttl_hours * 3600;

    queries::token::insert_magic_link(pool, &token, &email, now, expires_at).await?;

    // Token travels in the URL fragment so mail scanners that fetch the
    // GET page never see it server-side.
    let link = format!(
        "{}/auth/verify-link#token={}",
        email_cfg.base_url.trim_end_matches('/'),
        token
    );

    if let Err(e) = mailer.send_magic_link(&email, &link, auth.magic_link_ttl_hours) {
        tracing::error!(error = %e, "Magic link delivery failed, discarding token");
        queries::token::delete_magic_link(pool, &token).await?;
        return Err(AppError::UpstreamUnavailable("email".to_string()));
    }

    tracing::info!("Magic link issued");
    Ok(IssuedLink { token, link })
}

pub struct Redemption {
    pub user: User,
    pub session_token: String,
}

/// Redeem a magic link exactly once and establish a session.
///
/// First-time emails get a user row with a fresh trial window starting now.
/// Returning users keep their original window; a lapsed trial routes to
/// payment via the access decision rather than being silently re-extended.
#[tracing::instrument(skip_all)]
pub async fn redeem_token(
    pool: &SqlitePool,
    auth: &AuthConfig,
    token: &str,
    now: i64,
) -> Result<Redemption, AppError> {
    let Some(email) = queries::token::redeem_magic_link(pool, token, now).await? else {
        // Used, expired, and unknown all collapse into one error so the
        // response carries no enumeration signal.
        return Err(AppError::InvalidOrExpiredToken);
    };

    let user = queries::user::get_or_create_user(pool, &email, now, auth.trial_hours).await?;

    let session_token = session::create_session(pool, user.id, now, auth.session_ttl_days).await?;

    tracing::info!(user_id = user.id, "Magic link redeemed, session established");
    Ok(Redemption {
        user,
        session_token,
    })
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_ascii_lowercase();
    if !email.validate_email() {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    Ok(email)
}
