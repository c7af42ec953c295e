//! PayoutFlow Ledger Store
//!
//! Durable state for recipients, products, subscriptions, attributions and
//! payout records. Every write to a payout row is conditional on its current
//! state so that the executor and the event reconciler can interleave freely.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_common::{
    AccountStatus, AttributedSubscription, Attribution, AuditEntry, BankPayoutUpdate, Payout,
    PayoutStatus, Product, Recipient, Subscription, SubscriptionStatus, SubscriptionUpsert,
};
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryLedger;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Duplicate {entity_type} with {field}={value}")]
    Duplicate { entity_type: String, field: String, value: String },

    #[error("Corrupt {entity_type} row {id}: {message}")]
    Corrupt { entity_type: String, id: String, message: String },

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn duplicate(entity_type: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(entity_type: impl Into<String>, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            entity_type: entity_type.into(),
            id: id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Compare-and-set on a payout's status.
///
/// Applies only while the row is still in `from`. The transfer id and
/// failure message are written alongside when present and left untouched
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutTransition {
    pub payout_id: String,
    pub from: PayoutStatus,
    pub to: PayoutStatus,
    pub transfer_id: Option<String>,
    pub failure_message: Option<String>,
}

impl PayoutTransition {
    pub fn new(payout_id: impl Into<String>, from: PayoutStatus, to: PayoutStatus) -> Self {
        Self {
            payout_id: payout_id.into(),
            from,
            to,
            transfer_id: None,
            failure_message: None,
        }
    }

    pub fn with_transfer_id(mut self, transfer_id: impl Into<String>) -> Self {
        self.transfer_id = Some(transfer_id.into());
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Recipients
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()>;
    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>>;
    async fn find_recipient_by_account(&self, account_ref: &str) -> Result<Option<Recipient>>;
    /// Overwrite the capability flags of the recipient owning `account_ref`.
    async fn apply_account_status(&self, account_ref: &str, status: &AccountStatus) -> Result<Option<Recipient>>;

    // Products
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn find_product_by_price(&self, external_price_id: &str) -> Result<Option<Product>>;

    // Subscriptions
    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>>;
    async fn get_subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>>;
    /// Insert or update by external id. Returns `None` when the row does not
    /// exist and the upsert carries no recipient to create it with.
    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<Option<Subscription>>;
    async fn set_subscription_status(&self, external_id: &str, status: &SubscriptionStatus) -> Result<bool>;

    // Attributions
    async fn insert_attribution(&self, attribution: &Attribution) -> Result<()>;
    /// Attribution x Subscription rows, oldest attribution first.
    async fn attributed_subscriptions(
        &self,
        recipient_id: Option<&str>,
        status: Option<&SubscriptionStatus>,
    ) -> Result<Vec<AttributedSubscription>>;

    // Payouts
    async fn insert_payout(&self, payout: &Payout) -> Result<()>;
    async fn get_payout(&self, id: &str) -> Result<Option<Payout>>;
    async fn find_payout_by_transfer(&self, transfer_id: &str) -> Result<Option<Payout>>;
    /// Sum of pending and completed payout amounts per recipient.
    async fn disbursed_totals(&self, recipient_id: Option<&str>) -> Result<HashMap<String, i64>>;
    async fn transition_payout(&self, transition: &PayoutTransition) -> Result<bool>;
    /// Set the transfer id on a row that has none yet.
    async fn attach_transfer_id(&self, payout_id: &str, transfer_id: &str) -> Result<bool>;
    async fn latest_unlinked_pending(&self, recipient_id: &str) -> Result<Option<Payout>>;
    /// Forward-only bank sub-status update; never touches the transfer status.
    async fn update_bank_payout(&self, update: &BankPayoutUpdate) -> Result<bool>;
    /// Newest first.
    async fn list_payouts(&self, recipient_id: Option<&str>) -> Result<Vec<Payout>>;
    /// Pending rows created before `older_than`, oldest first.
    async fn stale_pending_payouts(&self, older_than: DateTime<Utc>) -> Result<Vec<Payout>>;

    // Gateway events
    /// Returns `true` when the id was newly recorded.
    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> Result<bool>;
    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    // Audit
    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()>;
    /// Newest first.
    async fn list_audit(&self, entity_id: Option<&str>, limit: u32) -> Result<Vec<AuditEntry>>;
}
