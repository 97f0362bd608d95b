#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use axum::Router;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use solace::billing::BillingOracle;
use solace::config::{
    AuthConfig, Config, DatabaseConfig, EmailConfig, ObservabilityConfig, RateLimitConfig,
    ServerConfig, StripeConfig,
};
use solace::email::MailerService;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    pool
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
            max_connections: 1,
        },
        auth: AuthConfig::default(),
        email: EmailConfig::default(),
        stripe: StripeConfig {
            secret_key: "sk_test_dummy".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            price_id_monthly: "price_monthly".to_string(),
            price_id_annual: "price_annual".to_string(),
        },
        rate_limit: RateLimitConfig::default(),
        observability: ObservabilityConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub config: Config,
}

pub async fn create_test_app(pool: SqlitePool, oracle: Arc<dyn BillingOracle>) -> TestApp {
    let config = test_config();
    let mailer = MailerService::new_mock(&config.email);
    let router = solace::create_app(pool.clone(), config.clone(), mailer, oracle);

    TestApp {
        router,
        pool,
        config,
    }
}

/// Issue a magic link straight through the service layer, returning the
/// raw token a user would receive by email.
pub async fn issue_link(app: &TestApp, email: &str, now: i64) -> String {
    let mailer = MailerService::new_mock(&app.config.email);
    solace::auth::token::issue_token(
        &app.pool,
        &mailer,
        &app.config.auth,
        &app.config.email,
        email,
        now,
    )
    .await
    .unwrap()
    .token
}

/// Stripe-style signature header over a payload.
pub fn sign_payload(payload: &str, timestamp: i64, secret: &str) -> String {
    sign_raw_payload(payload.as_bytes(), timestamp, secret)
}

pub fn sign_raw_payload(payload: &[u8], timestamp: i64, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
