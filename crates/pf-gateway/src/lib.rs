//! PayoutFlow Payment Gateway
//!
//! Boundary to the external payment processor:
//! - `PaymentGateway`: fund transfers and account capability lookups
//! - `StripeGateway`: HTTP implementation against a Stripe-compatible API
//! - `WebhookVerifier`: signature verification for inbound events
//! - `GatewayEvent`: typed view of the events the payout engine consumes

use std::collections::BTreeMap;

use async_trait::async_trait;
use pf_common::AccountStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod event;
pub mod stripe;
pub mod webhook;

pub use event::{
    AccountObject, BankPayoutObject, GatewayEvent, InvoiceObject, ReceivedEvent,
    SubscriptionObject, TransferObject,
};
pub use stripe::{StripeGateway, StripeGatewayConfig};
pub use webhook::{WebhookError, WebhookVerifier, SIGNATURE_HEADER};

/// Transfer metadata key carrying the local recipient id
pub const METADATA_RECIPIENT_ID: &str = "recipient_id";
/// Transfer metadata key carrying the local payout record id
pub const METADATA_PAYOUT_RECORD_ID: &str = "payout_record_id";
pub const METADATA_TYPE: &str = "type";
pub const PAYOUT_METADATA_TYPE: &str = "recipient_payout";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Gateway rejected request (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Unreadable gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether the remote outcome is unknown or the failure may clear on its
    /// own. A transfer that failed transiently may still have been executed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout(m) | Self::Transport(m) | Self::Decode(m) => m,
            Self::Unavailable { message, .. } | Self::Rejected { message, .. } => message,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// Minor units
    pub amount: i64,
    pub currency: String,
    /// Connected account receiving the funds
    pub destination: String,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Sent as the request idempotency key; repeated requests with the same
    /// key resolve to the same transfer
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub destination: String,
    /// Unix seconds
    pub created: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer>;

    async fn retrieve_account(&self, account_ref: &str) -> Result<AccountStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rejections_are_permanent() {
        assert!(GatewayError::Timeout("t".into()).is_transient());
        assert!(GatewayError::Transport("conn reset".into()).is_transient());
        assert!(GatewayError::Unavailable { status: 503, message: "down".into() }.is_transient());
        assert!(GatewayError::Decode("bad json".into()).is_transient());
        assert!(!GatewayError::Rejected {
            status: 400,
            code: Some("balance_insufficient".into()),
            message: "Insufficient funds".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = GatewayError::Rejected { status: 400, code: None, message: "No such destination".into() };
        assert_eq!(err.message(), "No such destination");
        assert!(err.to_string().contains("HTTP 400"));
    }
}
