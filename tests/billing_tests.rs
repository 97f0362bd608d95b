use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use sqlx::Row;
use tower::ServiceExt;

use solace::billing::{MockBillingOracle, OracleStatus};
use solace::unix_now;

mod common;

fn webhook_request(payload: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/billing/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn seed_user(app: &common::TestApp, email: &str, now: i64) -> i64 {
    let token = common::issue_link(app, email, now).await;
    let redemption = solace::auth::token::redeem_token(&app.pool, &app.config.auth, &token, now)
        .await
        .unwrap();
    redemption.user.id
}

#[tokio::test]
async fn test_webhook_checkout_completed_activates_user() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::reporting(None)))
        .await;
    let now = unix_now();
    let user_id = seed_user(&app, "buyer@example.com", now).await;

    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_1",
            "customer": "cus_abc",
            "metadata": { "user_id": user_id.to_string() },
        } },
    })
    .to_string();
    let signature = common::sign_payload(&payload, now, common::WEBHOOK_SECRET);

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["received"], true);

    let row = sqlx::query(
        "SELECT subscription_status, billing_customer_id FROM users WHERE id = ?1",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("subscription_status"), "active");
    assert_eq!(
        row.get::<Option<String>, _>("billing_customer_id"),
        Some("cus_abc".to_string())
    );
}

#[tokio::test]
async fn test_webhook_checkout_without_customer_writes_nothing() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::reporting(None)))
        .await;
    let now = unix_now();
    let user_id = seed_user(&app, "nocust@example.com", now).await;

    // Malformed provider event: no customer reference at all.
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_2",
            "metadata": { "user_id": user_id.to_string() },
        } },
    })
    .to_string();
    let signature = common::sign_payload(&payload, now, common::WEBHOOK_SECRET);

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(&payload, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // No empty-string customer id may land in the row, and the status is
    // untouched.
    let row = sqlx::query(
        "SELECT subscription_status, billing_customer_id FROM users WHERE id = ?1",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("subscription_status"), "trial");
    assert_eq!(row.get::<Option<String>, _>("billing_customer_id"), None);
}

#[tokio::test]
async fn test_webhook_acknowledges_signed_non_utf8_body() {
    let pool = common::setup_test_db().await;
    let app =
        common::create_test_app(pool, Arc::new(MockBillingOracle::reporting(None))).await;
    let now = unix_now();

    let payload: Vec<u8> = vec![0xff, 0xfe, 0x7b, 0x7d];
    let signature = common::sign_raw_payload(&payload, now, common::WEBHOOK_SECRET);

    // Signature checks out, so the body problem is a processing error:
    // logged and acknowledged, never a retry-provoking status.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/billing/webhook")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let pool = common::setup_test_db().await;
    let app =
        common::create_test_app(pool, Arc::new(MockBillingOracle::reporting(None))).await;
    let now = unix_now();

    let payload = r#"{"type": "checkout.session.completed", "data": {"object": {}}}"#;
    let signature = common::sign_payload(payload, now, "whsec_wrong_secret");

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(payload, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::body_json(response).await;
    assert_eq!(body["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_webhook_subscription_lifecycle_reconciles_status() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::reporting(None)))
        .await;
    let now = unix_now();
    let user_id = seed_user(&app, "subs@example.com", now).await;

    sqlx::query("UPDATE users SET billing_customer_id = 'cus_life' WHERE id = ?1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();

    let fetch_status = |pool: sqlx::SqlitePool| async move {
        sqlx::query_scalar::<_, String>(
            "SELECT subscription_status FROM users WHERE billing_customer_id = 'cus_life'",
        )
        .fetch_one(&pool)
        .await
        .unwrap()
    };

    for (status, expected) in [
        ("active", "active"),
        ("past_due", "inactive"),
        ("active", "active"),
    ] {
        let payload = serde_json::json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_life",
                "status": status,
            } },
        })
        .to_string();
        let signature = common::sign_payload(&payload, now, common::WEBHOOK_SECRET);

        let response = app
            .router
            .clone()
            .oneshot(webhook_request(&payload, &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fetch_status(pool.clone()).await, expected);
    }

    let payload = serde_json::json!({
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_1", "customer": "cus_life" } },
    })
    .to_string();
    let signature = common::sign_payload(&payload, now, common::WEBHOOK_SECRET);

    // Deliver the deletion twice: replay converges on the same row state.
    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(webhook_request(&payload, &signature))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fetch_status(pool.clone()).await, "inactive");
    }
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_event_types() {
    let pool = common::setup_test_db().await;
    let app =
        common::create_test_app(pool, Arc::new(MockBillingOracle::reporting(None))).await;
    let now = unix_now();

    let payload = r#"{"type": "invoice.finalized", "data": {"object": {}}}"#;
    let signature = common::sign_payload(payload, now, common::WEBHOOK_SECRET);

    let response = app
        .router
        .clone()
        .oneshot(webhook_request(payload, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn test_checkout_returns_session_url_for_authenticated_user() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::reporting(None)))
        .await;
    let now = unix_now();
    let token = common::issue_link(&app, "pay@example.com", now).await;
    let redemption = solace::auth::token::redeem_token(&pool, &app.config.auth, &token, now)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/billing/checkout")
                .header(
                    "authorization",
                    format!("Bearer {}", redemption.session_token),
                )
                .header("content-type", "application/json")
                .body(Body::from(r#"{"plan": "monthly"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://"));
}

#[tokio::test]
async fn test_billing_status_reports_trial_and_guest_shapes() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::reporting(None)))
        .await;
    let now = unix_now();
    seed_user(&app, "poll@example.com", now).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/billing/status?email=poll@example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["subscription"]["is_on_trial"], true);
    assert_eq!(body["subscription"]["hours_remaining"], 48);

    // Unknown emails and guests get the empty shape, still a 200.
    for uri in ["/billing/status?email=nobody@example.com", "/billing/status"] {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = common::body_json(response).await;
        assert_eq!(body["subscription"]["is_on_trial"], false);
        assert_eq!(body["subscription"]["hours_remaining"], 0);
    }
}

#[tokio::test]
async fn test_oracle_payment_failure_hard_denies_inside_trial() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(
        pool.clone(),
        Arc::new(MockBillingOracle::reporting(Some(OracleStatus::PastDue))),
    )
    .await;
    let now = unix_now();
    let user_id = seed_user(&app, "late@example.com", now).await;

    // A billing reference makes the access check consult the oracle.
    sqlx::query("UPDATE users SET billing_customer_id = 'cus_late' WHERE id = ?1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
    let token = common::issue_link(&app, "late@example.com", now).await;
    let redemption = solace::auth::token::redeem_token(&pool, &app.config.auth, &token, now)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/access/status")
                .header(
                    "authorization",
                    format!("Bearer {}", redemption.session_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Trial window is still open, but the oracle's word wins.
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["code"], "PAYMENT_REQUIRED");
}

#[tokio::test]
async fn test_oracle_paid_subscription_outlives_lapsed_trial() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(
        pool.clone(),
        Arc::new(MockBillingOracle::reporting(Some(OracleStatus::Active))),
    )
    .await;
    let now = unix_now();
    let user_id = seed_user(&app, "paid@example.com", now).await;

    sqlx::query(
        "UPDATE users SET billing_customer_id = 'cus_paid', trial_end = ?1 WHERE id = ?2",
    )
    .bind(now - 1)
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();
    let token = common::issue_link(&app, "paid@example.com", now).await;
    let redemption = solace::auth::token::redeem_token(&pool, &app.config.auth, &token, now)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/access/status")
                .header(
                    "authorization",
                    format!("Bearer {}", redemption.session_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["access"], "allowed");
}

#[tokio::test]
async fn test_local_active_flag_does_not_override_reachable_oracle() {
    let pool = common::setup_test_db().await;
    let app = common::create_test_app(
        pool.clone(),
        Arc::new(MockBillingOracle::reporting(Some(OracleStatus::Canceled))),
    )
    .await;
    let now = unix_now();
    let user_id = seed_user(&app, "gone@example.com", now).await;

    // Activated via an earlier webhook, then canceled provider-side; the
    // trial window has also lapsed.
    sqlx::query(
        "UPDATE users SET subscription_status = 'active', \
         billing_customer_id = 'cus_gone', trial_end = ?1 WHERE id = ?2",
    )
    .bind(now - 1)
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();
    let token = common::issue_link(&app, "gone@example.com", now).await;
    let redemption = solace::auth::token::redeem_token(&pool, &app.config.auth, &token, now)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/access/status")
                .header(
                    "authorization",
                    format!("Bearer {}", redemption.session_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["code"], "TRIAL_EXPIRED");
}

#[tokio::test]
async fn test_oracle_outage_degrades_to_trial_decision() {
    let pool = common::setup_test_db().await;
    let app =
        common::create_test_app(pool.clone(), Arc::new(MockBillingOracle::down())).await;
    let now = unix_now();
    let user_id = seed_user(&app, "outage@example.com", now).await;

    sqlx::query("UPDATE users SET billing_customer_id = 'cus_out' WHERE id = ?1")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
    let token = common::issue_link(&app, "outage@example.com", now).await;
    let redemption = solace::auth::token::redeem_token(&pool, &app.config.auth, &token, now)
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/access/status")
                .header(
                    "authorization",
                    format!("Bearer {}", redemption.session_token),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Trial still open, oracle unreachable: access stays up.
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["access"], "allowed");
}
