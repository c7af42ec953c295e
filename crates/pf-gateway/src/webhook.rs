//! Webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex signature>[,v1=...]`. The
//! signature is HMAC-SHA256 over `"{t}.{raw body}"` with the endpoint secret.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::event::ReceivedEvent;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Malformed signature header")]
    MalformedSignature,

    #[error("Signature does not match payload")]
    SignatureMismatch,

    #[error("Signature timestamp {timestamp} outside tolerance")]
    TimestampOutOfTolerance { timestamp: i64 },

    #[error("Malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify the signature and parse the event. Nothing in the payload is
    /// read before the signature checks out.
    pub fn construct_event(&self, payload: &[u8], header: &str) -> Result<ReceivedEvent, WebhookError> {
        self.verify(payload, header)?;
        Ok(ReceivedEvent::parse(payload)?)
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse().ok(),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedSignature);
        }

        let expected = self.signature_for(payload, timestamp)?;
        let matched = signatures
            .iter()
            .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        let age = now.saturating_sub(timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            return Err(WebhookError::TimestampOutOfTolerance { timestamp });
        }

        Ok(())
    }

    /// Build a signature header for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        Ok(format!("t={},v1={}", timestamp, self.signature_for(payload, timestamp)?))
    }

    fn signature_for(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, Duration::from_secs(300))
    }

    fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = format!("t={},v1={}", NOW, compute_signature(payload, SECRET, NOW));
        verifier().verify_at(payload, &header, NOW + 10).unwrap();
    }

    #[test]
    fn test_sign_matches_verify() {
        let payload = br#"{"id":"evt_2"}"#;
        let header = verifier().sign(payload, NOW).unwrap();
        verifier().verify_at(payload, &header, NOW).unwrap();
    }

    #[test]
    fn test_any_v1_candidate_may_match() {
        let payload = b"{}";
        let header = format!("t={},v1=deadbeef,v1={}", NOW, compute_signature(payload, SECRET, NOW));
        verifier().verify_at(payload, &header, NOW).unwrap();
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"{}";
        let header = format!("t={},v1={}", NOW, compute_signature(payload, "other", NOW));
        let err = verifier().verify_at(payload, &header, NOW).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let header = verifier().sign(br#"{"amount":100}"#, NOW).unwrap();
        let err = verifier().verify_at(br#"{"amount":999}"#, &header, NOW).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = b"{}";
        let header = verifier().sign(payload, NOW - 600).unwrap();
        let err = verifier().verify_at(payload, &header, NOW).unwrap_err();
        assert!(matches!(err, WebhookError::TimestampOutOfTolerance { .. }));
    }

    #[test]
    fn test_malformed_headers() {
        let timestamp_only = format!("t={}", NOW);
        for header in ["", "garbage", "v1=abc", "t=notanumber,v1=abc", timestamp_only.as_str()] {
            let err = verifier().verify_at(b"{}", header, NOW).unwrap_err();
            assert!(matches!(err, WebhookError::MalformedSignature), "{header}");
        }
    }

    #[test]
    fn test_construct_event_rejects_before_parsing() {
        let err = verifier()
            .construct_event(b"not json", "t=1,v1=00")
            .unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }
}
