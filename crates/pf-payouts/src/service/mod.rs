//! Payout engine services.

pub mod aggregator;
pub mod attribution;
pub mod audit;
pub mod executor;
pub mod history;
pub mod product;
pub mod reconciler;
pub mod recipient;

pub use aggregator::{EarningsAggregator, EarningsSummary, RecipientEarnings, SubscriptionEarning};
pub use attribution::AttributionService;
pub use audit::AuditService;
pub use executor::{ExecutorConfig, PayoutExecutor, PayoutReceipt, PayoutRequest};
pub use history::{PayoutHistory, PayoutHistoryService, PayoutSummary};
pub use product::{NewProduct, ProductService};
pub use reconciler::{EventReconciler, ReconcileOutcome};
pub use recipient::{NewRecipient, RecipientService};
