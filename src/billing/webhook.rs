//! Webhook event parsing and reconciliation.
//!
//! Reconciliation always assigns state from the event's declared status,
//! never increments or decrements anything, so replayed and out-of-order
//! deliveries converge on the same row state.

use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{parse_oracle_status, BillingError, OracleStatus};
use crate::error::AppError;
use crate::queries::user::{
    self, set_subscription_status_by_customer, set_subscription_status_by_email,
    SubscriptionStatus,
};

#[derive(Debug, Clone)]
pub enum BillingEvent {
    /// Initial checkout completed; the user gains a billing customer
    /// reference and an active subscription.
    CheckoutCompleted {
        customer_id: String,
        user_id: Option<i64>,
    },

    /// Subscription state changed (renewal, payment failure, cancellation
    /// scheduled, ...).
    SubscriptionUpdated {
        customer_id: String,
        status: OracleStatus,
    },

    /// Subscription deleted outright.
    SubscriptionDeleted { customer_id: String },

    Unknown { event_type: String },
}

/// Parse a raw (already signature-verified) webhook payload.
pub fn parse_event(payload: &str) -> Result<BillingEvent, BillingError> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| BillingError::Provider(e.to_string()))?;

    let event_type = value["type"]
        .as_str()
        .ok_or_else(|| BillingError::Provider("Missing event type".to_string()))?;
    let object = &value["data"]["object"];

    match event_type {
        "checkout.session.completed" => Ok(BillingEvent::CheckoutCompleted {
            customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
            user_id: object["metadata"]["user_id"]
                .as_str()
                .and_then(|s| s.parse().ok()),
        }),

        "customer.subscription.created" | "customer.subscription.updated" => {
            Ok(BillingEvent::SubscriptionUpdated {
                customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
                status: parse_oracle_status(object["status"].as_str().unwrap_or("incomplete")),
            })
        }

        "customer.subscription.deleted" => Ok(BillingEvent::SubscriptionDeleted {
            customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
        }),

        _ => Ok(BillingEvent::Unknown {
            event_type: event_type.to_string(),
        }),
    }
}

/// Apply a billing event to local user state. Idempotent.
#[tracing::instrument(skip(pool))]
pub async fn apply_billing_event(pool: &SqlitePool, event: BillingEvent) -> Result<(), AppError> {
    match event {
        BillingEvent::CheckoutCompleted {
            customer_id,
            user_id,
        } => {
            if customer_id.is_empty() {
                warn!("Checkout completed without a customer reference");
                return Ok(());
            }
            let Some(user_id) = user_id else {
                warn!(%customer_id, "Checkout completed without a user_id in metadata");
                return Ok(());
            };
            let Some(user) = user::get_user_by_id(pool, user_id).await? else {
                warn!(user_id, %customer_id, "Checkout completed for unknown user");
                return Ok(());
            };
            set_subscription_status_by_email(
                pool,
                &user.email,
                SubscriptionStatus::Active,
                Some(&customer_id),
            )
            .await?;
            info!(user_id, %customer_id, "Subscription activated via checkout");
        }

        BillingEvent::SubscriptionUpdated {
            customer_id,
            status,
        } => {
            let local = if status.is_paid() {
                SubscriptionStatus::Active
            } else {
                SubscriptionStatus::Inactive
            };
            let updated =
                set_subscription_status_by_customer(pool, &customer_id, local).await?;
            if updated == 0 {
                warn!(%customer_id, "Subscription update for unknown customer");
            } else {
                info!(%customer_id, %status, %local, "Subscription status reconciled");
            }
        }

        BillingEvent::SubscriptionDeleted { customer_id } => {
            let updated = set_subscription_status_by_customer(
                pool,
                &customer_id,
                SubscriptionStatus::Inactive,
            )
            .await?;
            if updated == 0 {
                warn!(%customer_id, "Subscription deletion for unknown customer");
            } else {
                info!(%customer_id, "Subscription deleted, access downgraded");
            }
        }

        BillingEvent::Unknown { event_type } => {
            info!(%event_type, "Unhandled webhook event type");
        }
    }

    Ok(())
}
