//! Centralized access control for paid features.
//!
//! Every privileged request funnels through one decision, evaluated in a
//! fixed order: session validity first (handled by the auth middleware,
//! before anything here runs), then the trial window, then the billing
//! oracle. The decision is pure — it never mutates subscription state;
//! mutation happens only through webhook reconciliation.

use std::sync::Arc;

use crate::billing::{BillingOracle, OracleStatus};
use crate::error::AppError;
use crate::queries::session::SessionUser;
use crate::queries::user::SubscriptionStatus;

/// Local fields the decision reads, one consistent snapshot per request.
#[derive(Debug, Clone, Copy)]
pub struct UserAccess {
    pub status: SubscriptionStatus,
    pub trial_end: i64,
}

impl From<&SessionUser> for UserAccess {
    fn from(session: &SessionUser) -> Self {
        Self {
            status: session
                .subscription_status
                .parse()
                .unwrap_or(SubscriptionStatus::Inactive),
            trial_end: session.trial_end,
        }
    }
}

/// What the billing oracle had to say, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleState {
    /// User has no billing reference; the oracle was never consulted.
    NotQueried,
    /// The oracle was consulted but unreachable. Degrade to the
    /// trial-based decision instead of denying on a transient outage.
    Unavailable,
    /// The oracle answered: latest subscription status, or None when the
    /// customer has no subscription at all.
    Reported(Option<OracleStatus>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Soft deny: recoverable by payment.
    TrialExpired,
    /// Hard deny: the provider reports a failed or incomplete payment.
    PaymentRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

/// The access decision. Pure over its inputs.
///
/// Precedence: a reachable oracle supersedes local state in both
/// directions — an active paid subscription grants access after trial
/// expiry, and a failed payment denies access even inside a still-open
/// trial window or over a stale local `active` flag.
pub fn decide(user: UserAccess, oracle: OracleState, now: i64) -> AccessDecision {
    if let OracleState::Reported(report) = oracle {
        match report {
            Some(status) if status.is_paid() => return AccessDecision::Allow,
            Some(status) if status.is_payment_failed() => {
                return AccessDecision::Deny(DenyReason::PaymentRequired)
            }
            // Canceled, or no subscription ever created: fall through to
            // the trial window. A local `active` flag does not count when
            // the oracle is reachable and disagrees.
            _ => {}
        }
    }

    if trial_active(user, now) {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny(DenyReason::TrialExpired)
    }
}

fn trial_active(user: UserAccess, now: i64) -> bool {
    user.status == SubscriptionStatus::Trial && now < user.trial_end
}

/// Whole hours left in the trial window, for client display.
pub fn trial_hours_remaining(trial_end: i64, now: i64) -> i64 {
    ((trial_end - now).max(0) + 3599) / 3600
}

/// Access control service: loads the oracle view and applies [`decide`].
#[derive(Clone)]
pub struct AccessControlService {
    oracle: Arc<dyn BillingOracle>,
}

impl AccessControlService {
    pub fn new(oracle: Arc<dyn BillingOracle>) -> Self {
        Self { oracle }
    }

    /// Decide access for a validated session. Side-effect free: the oracle
    /// call is an independent read with its own timeout, holding no
    /// database transaction, and no local state is written.
    #[tracing::instrument(skip(self, session), fields(user_id = session.user_id))]
    pub async fn check_access(
        &self,
        session: &SessionUser,
        now: i64,
    ) -> Result<AccessDecision, AppError> {
        let oracle_state = match &session.billing_customer_id {
            None => OracleState::NotQueried,
            Some(customer_id) => match self.oracle.latest_subscription_status(customer_id).await {
                Ok(report) => OracleState::Reported(report),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Billing oracle unreachable, degrading to trial-based decision"
                    );
                    OracleState::Unavailable
                }
            },
        };

        let decision = decide(UserAccess::from(session), oracle_state, now);
        tracing::debug!(?oracle_state, ?decision, "Access check");
        Ok(decision)
    }
}
