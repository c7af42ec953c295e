//! PayoutFlow Payout Engine
//!
//! - `EarningsAggregator`: attribution-weighted earnings and unpaid balances
//! - `PayoutExecutor`: at-most-once transfer execution per recorded intent
//! - `EventReconciler`: idempotent application of gateway events
//! - `api`: axum routers exposing the above

pub mod api;
pub mod error;
pub mod service;

pub use error::{PayoutError, Result};
pub use service::{
    AttributionService, AuditService, EarningsAggregator, EarningsSummary, EventReconciler,
    ExecutorConfig, NewProduct, NewRecipient, PayoutExecutor, PayoutHistory,
    PayoutHistoryService, PayoutReceipt, PayoutRequest, PayoutSummary, ProductService,
    ReconcileOutcome, RecipientEarnings, RecipientService, SubscriptionEarning,
};
