//! Payout Error Types

use pf_gateway::{GatewayError, WebhookError};
use pf_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Recipient not found: {id}")]
    RecipientNotFound { id: String },

    #[error("Recipient {id} has no connected payment account")]
    NotOnboarded { id: String },

    #[error("Recipient {id} is not eligible for payouts: {reason}")]
    NotEligible { id: String, reason: String },

    #[error("Requested amount {requested} exceeds unpaid earnings of {available}")]
    ExceedsUnpaidBalance { requested: i64, available: i64 },

    #[error("Transfer failed: {message}")]
    TransferFailed { payout_id: String, message: String },

    #[error("Transfer outcome unknown, payout {payout_id} left pending and may be retried after review: {message}")]
    TransferPending { payout_id: String, message: String },

    #[error("Webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Duplicate entity: {entity_type} with {field}={value}")]
    Duplicate { entity_type: String, field: String, value: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<LedgerError> for PayoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Duplicate { entity_type, field, value } => Self::Duplicate { entity_type, field, value },
            other => Self::Ledger(other),
        }
    }
}

impl PayoutError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::RecipientNotFound { .. } => "RECIPIENT_NOT_FOUND",
            Self::NotOnboarded { .. } => "NOT_ONBOARDED",
            Self::NotEligible { .. } => "NOT_ELIGIBLE",
            Self::ExceedsUnpaidBalance { .. } => "EXCEEDS_UNPAID_BALANCE",
            Self::TransferFailed { .. } => "TRANSFER_FAILED",
            Self::TransferPending { .. } => "TRANSFER_PENDING",
            Self::Webhook(_) => "WEBHOOK_REJECTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Ledger(_) => "LEDGER_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransferPending { .. } => true,
            Self::Gateway(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PayoutError>;
