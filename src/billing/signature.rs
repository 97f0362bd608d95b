//! Stripe-Signature verification.
//!
//! Header format: `t=<unix ts>,v1=<hex hmac>[,v1=...]`. The signed payload
//! is `"{t}.{raw body}"` and the MAC is HMAC-SHA256 under the endpoint
//! secret. Comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Reject events whose signing timestamp is further than this from now,
/// limiting replay of captured payloads.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidWebhookSignature)?;
    if signatures.is_empty() {
        return Err(BillingError::InvalidWebhookSignature);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(BillingError::InvalidWebhookSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Config(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let valid = signatures
        .iter()
        .any(|sig| sig.ct_eq(expected.as_slice()).into());

    if valid {
        Ok(())
    } else {
        Err(BillingError::InvalidWebhookSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"type":"customer.subscription.updated"}"#;
        let header = sign(payload, "whsec_test", 1_700_000_000);
        assert!(verify_signature(payload, &header, "whsec_test", 1_700_000_000, 300).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", 1_700_000_000);
        assert!(verify_signature(payload, &header, "whsec_other", 1_700_000_000, 300).is_err());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign(b"{}", "whsec_test", 1_700_000_000);
        assert!(
            verify_signature(b"{\"evil\":1}", &header, "whsec_test", 1_700_000_000, 300).is_err()
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"{}";
        let header = sign(payload, "whsec_test", 1_700_000_000);
        assert!(
            verify_signature(payload, &header, "whsec_test", 1_700_000_000 + 600, 300).is_err()
        );
    }

    #[test]
    fn test_garbage_header_rejected() {
        assert!(verify_signature(b"{}", "", "whsec_test", 0, 300).is_err());
        assert!(verify_signature(b"{}", "t=abc,v1=zz", "whsec_test", 0, 300).is_err());
    }

    #[test]
    fn test_second_v1_entry_accepted() {
        // Secret rotation: the header may carry signatures under both keys.
        let payload = b"{}";
        let good = sign(payload, "whsec_new", 1_700_000_000);
        let header = format!("{},v1={}", good, hex::encode([0u8; 32]));
        assert!(verify_signature(payload, &header, "whsec_new", 1_700_000_000, 300).is_ok());
    }
}
