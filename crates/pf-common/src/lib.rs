//! PayoutFlow Common Types
//!
//! Domain records shared by the ledger, gateway and payout engine crates,
//! plus the revenue-split arithmetic every earnings figure is derived from.

pub mod audit;
pub mod payout;
pub mod recipient;
pub mod subscription;

pub use audit::{AuditAction, AuditEntry};
pub use payout::{BankPayoutStatus, BankPayoutUpdate, Payout, PayoutPeriod, PayoutStatus};
pub use recipient::{AccountStatus, Recipient};
pub use subscription::{
    AttributedSubscription, Attribution, Product, Subscription, SubscriptionStatus,
    SubscriptionUpsert,
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// Identifiers
// ============================================================================

/// Generate a new opaque record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Revenue Split
// ============================================================================

/// Share of a subscription credited to the attributed recipient when the
/// attribution record carries no explicit percentage.
pub const DEFAULT_ATTRIBUTION_PERCENTAGE: i32 = 70;

/// Resolve a stored attribution percentage, applying the default for unset rows.
pub fn effective_percentage(stored: Option<i32>) -> i32 {
    stored.unwrap_or(DEFAULT_ATTRIBUTION_PERCENTAGE)
}

/// Recipient share in minor units: `floor(amount * percentage / 100)`.
pub fn recipient_share(amount: i64, percentage: i32) -> i64 {
    let product = i128::from(amount) * i128::from(percentage);
    product.div_euclid(100) as i64
}

/// Platform fee in minor units. Always `amount - recipient_share(amount, percentage)`,
/// so the fee absorbs the rounding remainder.
pub fn platform_fee(amount: i64, percentage: i32) -> i64 {
    amount - recipient_share(amount, percentage)
}

/// A subscription amount split between recipient and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSplit {
    pub amount: i64,
    pub percentage: i32,
    pub share: i64,
    pub platform_fee: i64,
}

impl RevenueSplit {
    pub fn compute(amount: i64, percentage: i32) -> Self {
        let share = recipient_share(amount, percentage);
        Self {
            amount,
            percentage,
            share,
            platform_fee: amount - share,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_and_fee_example() {
        assert_eq!(recipient_share(2999, 70), 2099);
        assert_eq!(platform_fee(2999, 70), 900);
    }

    #[test]
    fn test_share_plus_fee_is_exact() {
        for amount in [0_i64, 1, 99, 100, 101, 2999, 9999, 123_457] {
            for pct in [0, 1, 33, 50, 70, 95, 100] {
                let split = RevenueSplit::compute(amount, pct);
                assert_eq!(split.share + split.platform_fee, amount);
                assert!(split.share <= amount);
            }
        }
    }

    #[test]
    fn test_default_percentage_applied_to_unset() {
        assert_eq!(effective_percentage(None), DEFAULT_ATTRIBUTION_PERCENTAGE);
        assert_eq!(effective_percentage(Some(50)), 50);
        assert_eq!(effective_percentage(Some(0)), 0);
    }

    #[test]
    fn test_share_floors() {
        // 9999 * 70 / 100 = 6999.3
        assert_eq!(recipient_share(9999, 70), 6999);
        assert_eq!(platform_fee(9999, 70), 3000);
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id(), generate_id());
    }
}
