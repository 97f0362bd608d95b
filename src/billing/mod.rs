//! Billing provider integration.
//!
//! The provider is an external oracle: webhook events keep the local
//! `subscription_status` reconciled, and the access decision may ask the
//! oracle directly for the latest subscription state of a customer.

pub mod signature;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::config::StripeConfig;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Subscription status as reported by the billing provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OracleStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
}

impl OracleStatus {
    /// An active paid relationship that grants access on its own.
    pub fn is_paid(&self) -> bool {
        matches!(self, OracleStatus::Active | OracleStatus::Trialing)
    }

    /// A failed or incomplete payment state: a hard deny, stronger than
    /// trial expiry.
    pub fn is_payment_failed(&self) -> bool {
        matches!(
            self,
            OracleStatus::PastDue
                | OracleStatus::Unpaid
                | OracleStatus::Incomplete
                | OracleStatus::IncompleteExpired
        )
    }
}

/// Unknown statuses default to Incomplete so a provider-side addition never
/// grants unintended access.
pub fn parse_oracle_status(status: &str) -> OracleStatus {
    status.parse().unwrap_or_else(|_| {
        tracing::warn!(%status, "Unknown subscription status, defaulting to incomplete");
        OracleStatus::Incomplete
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Monthly,
    Annual,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
}

/// Billing oracle trait for dependency injection.
#[async_trait]
pub trait BillingOracle: Send + Sync {
    /// Latest subscription status for a billing customer, newest first.
    /// `None` means the customer has no subscription at all.
    async fn latest_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<Option<OracleStatus>, BillingError>;

    /// Create a subscription-mode checkout session for a user.
    async fn create_checkout_session(
        &self,
        email: &str,
        user_id: i64,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError>;
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe-backed oracle. Read-only from the access path: a status lookup is
/// an independent HTTP GET with its own timeout and no database state held
/// across it.
pub struct StripeOracle {
    client: reqwest::Client,
    config: StripeConfig,
    base_url: String,
    api_base: String,
}

impl StripeOracle {
    pub fn new(config: StripeConfig, base_url: String) -> Result<Self, BillingError> {
        if config.secret_key.is_empty() {
            return Err(BillingError::Config("stripe.secret_key not set".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BillingError::Provider(e.to_string()))?;
        Ok(Self {
            client,
            config,
            base_url,
            api_base: STRIPE_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    fn price_id(&self, plan: Plan) -> Result<&str, BillingError> {
        let price_id = match plan {
            Plan::Monthly => &self.config.price_id_monthly,
            Plan::Annual => &self.config.price_id_annual,
        };
        if price_id.is_empty() {
            return Err(BillingError::Config(format!(
                "No price id configured for plan {:?}",
                plan
            )));
        }
        Ok(price_id)
    }
}

#[async_trait]
impl BillingOracle for StripeOracle {
    async fn latest_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<Option<OracleStatus>, BillingError> {
        let response = self
            .client
            .get(format!("{}/subscriptions", self.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .query(&[("customer", customer_id), ("status", "all"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::Provider(format!(
                "subscription list returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        let status = body["data"][0]["status"].as_str().map(parse_oracle_status);

        tracing::debug!(%customer_id, ?status, "Billing oracle lookup");
        Ok(status)
    }

    async fn create_checkout_session(
        &self,
        email: &str,
        user_id: i64,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError> {
        let price_id = self.price_id(plan)?.to_string();
        let user_id = user_id.to_string();
        let success_url = format!("{}/companion?payment_success=true", self.base_url);
        let cancel_url = format!("{}/companion?payment_cancelled=true", self.base_url);

        let params: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("customer_email", email),
            ("line_items[0][price]", &price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("metadata[user_id]", &user_id),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::Provider(format!(
                "checkout session returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        let session_id = body["id"].as_str().unwrap_or_default().to_string();
        let checkout_url = body["url"].as_str().unwrap_or_default().to_string();
        if session_id.is_empty() || checkout_url.is_empty() {
            return Err(BillingError::Provider(
                "checkout session response missing id or url".to_string(),
            ));
        }

        tracing::info!(%session_id, "Checkout session created");
        Ok(CheckoutSession {
            session_id,
            checkout_url,
        })
    }
}

/// Mock oracle for development and tests: a fixed report, or a simulated
/// outage.
pub struct MockBillingOracle {
    pub report: Option<OracleStatus>,
    pub unavailable: bool,
}

impl MockBillingOracle {
    pub fn reporting(report: Option<OracleStatus>) -> Self {
        Self {
            report,
            unavailable: false,
        }
    }

    pub fn down() -> Self {
        Self {
            report: None,
            unavailable: true,
        }
    }
}

#[async_trait]
impl BillingOracle for MockBillingOracle {
    async fn latest_subscription_status(
        &self,
        _customer_id: &str,
    ) -> Result<Option<OracleStatus>, BillingError> {
        if self.unavailable {
            return Err(BillingError::Provider("simulated outage".to_string()));
        }
        Ok(self.report)
    }

    async fn create_checkout_session(
        &self,
        _email: &str,
        user_id: i64,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError> {
        if self.unavailable {
            return Err(BillingError::Provider("simulated outage".to_string()));
        }
        let session_id = format!("cs_mock_{user_id}");
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.example/{session_id}?plan={plan:?}"),
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_status_parse() {
        assert_eq!(parse_oracle_status("active"), OracleStatus::Active);
        assert_eq!(parse_oracle_status("past_due"), OracleStatus::PastDue);
        assert_eq!(
            parse_oracle_status("incomplete_expired"),
            OracleStatus::IncompleteExpired
        );
        // Fails closed.
        assert_eq!(parse_oracle_status("brand_new"), OracleStatus::Incomplete);
    }

    #[test]
    fn test_paid_and_failed_partitions() {
        assert!(OracleStatus::Active.is_paid());
        assert!(OracleStatus::Trialing.is_paid());
        assert!(!OracleStatus::Canceled.is_paid());
        assert!(OracleStatus::PastDue.is_payment_failed());
        assert!(OracleStatus::Unpaid.is_payment_failed());
        assert!(!OracleStatus::Canceled.is_payment_failed());
    }
}
