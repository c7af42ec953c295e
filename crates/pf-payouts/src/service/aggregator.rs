//! Earnings Aggregator
//!
//! Computes, per recipient, gross attributed earnings over active
//! subscriptions minus everything already paid or in flight. Nothing is
//! cached: every call reads the ledger afresh.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use pf_common::{effective_percentage, AttributedSubscription, RevenueSplit, SubscriptionStatus};
use pf_ledger::LedgerStore;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// One subscription's contribution to a recipient's earnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEarning {
    pub subscription_id: String,
    pub external_subscription_id: String,
    pub currency: String,
    #[serde(flatten)]
    pub split: RevenueSplit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientEarnings {
    pub recipient_id: String,
    pub total_earnings: i64,
    pub subscription_count: usize,
    /// Sum of completed and pending payouts
    pub total_disbursed: i64,
    /// `total_earnings - total_disbursed`; negative when payouts exceeded earnings
    pub unpaid_earnings: i64,
    pub subscriptions: Vec<SubscriptionEarning>,
}

impl RecipientEarnings {
    pub fn empty(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            total_earnings: 0,
            subscription_count: 0,
            total_disbursed: 0,
            unpaid_earnings: 0,
            subscriptions: Vec::new(),
        }
    }

    /// Unpaid balance as shown to users, never below zero.
    pub fn displayed_unpaid(&self) -> i64 {
        self.unpaid_earnings.max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub recipients: Vec<RecipientEarnings>,
    pub total_earnings: i64,
    /// Sum of displayed (clamped) unpaid balances
    pub total_unpaid: i64,
    pub recipient_count: usize,
}

/// Fold attribution rows and disbursed totals into per-recipient earnings.
///
/// Rows for inactive subscriptions contribute nothing. A repeated
/// subscription+recipient pair is counted once, using the first row seen.
/// Recipients with disbursements but no active earnings are included so
/// that over-payment stays visible.
pub fn aggregate(rows: &[AttributedSubscription], disbursed: &HashMap<String, i64>) -> Vec<RecipientEarnings> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut by_recipient: BTreeMap<String, RecipientEarnings> = BTreeMap::new();

    for row in rows {
        if !row.status.is_active() {
            continue;
        }
        if !seen.insert((row.subscription_id.as_str(), row.recipient_id.as_str())) {
            debug!(
                subscription_id = %row.subscription_id,
                recipient_id = %row.recipient_id,
                attribution_id = %row.attribution_id,
                "Skipping duplicate attribution"
            );
            continue;
        }

        let split = RevenueSplit::compute(row.amount, effective_percentage(row.percentage));
        let earnings = by_recipient
            .entry(row.recipient_id.clone())
            .or_insert_with(|| RecipientEarnings::empty(&row.recipient_id));
        earnings.total_earnings += split.share;
        earnings.subscription_count += 1;
        earnings.subscriptions.push(SubscriptionEarning {
            subscription_id: row.subscription_id.clone(),
            external_subscription_id: row.external_subscription_id.clone(),
            currency: row.currency.clone(),
            split,
        });
    }

    for (recipient_id, total) in disbursed {
        by_recipient
            .entry(recipient_id.clone())
            .or_insert_with(|| RecipientEarnings::empty(recipient_id))
            .total_disbursed = *total;
    }

    by_recipient
        .into_values()
        .map(|mut earnings| {
            earnings.unpaid_earnings = earnings.total_earnings - earnings.total_disbursed;
            earnings
        })
        .collect()
}

pub struct EarningsAggregator {
    ledger: Arc<dyn LedgerStore>,
}

impl EarningsAggregator {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn recipient_earnings(&self, recipient_id: &str) -> Result<RecipientEarnings> {
        let rows = self
            .ledger
            .attributed_subscriptions(Some(recipient_id), Some(&SubscriptionStatus::Active))
            .await?;
        let disbursed = self.ledger.disbursed_totals(Some(recipient_id)).await?;

        Ok(aggregate(&rows, &disbursed)
            .into_iter()
            .find(|e| e.recipient_id == recipient_id)
            .unwrap_or_else(|| RecipientEarnings::empty(recipient_id)))
    }

    pub async fn all_earnings(&self) -> Result<Vec<RecipientEarnings>> {
        let rows = self
            .ledger
            .attributed_subscriptions(None, Some(&SubscriptionStatus::Active))
            .await?;
        let disbursed = self.ledger.disbursed_totals(None).await?;
        Ok(aggregate(&rows, &disbursed))
    }

    pub async fn summary(&self) -> Result<EarningsSummary> {
        let recipients = self.all_earnings().await?;
        Ok(EarningsSummary {
            total_earnings: recipients.iter().map(|r| r.total_earnings).sum(),
            total_unpaid: recipients.iter().map(RecipientEarnings::displayed_unpaid).sum(),
            recipient_count: recipients.len(),
            recipients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(attribution_id: &str, subscription_id: &str, recipient_id: &str, amount: i64, status: &str, pct: Option<i32>) -> AttributedSubscription {
        AttributedSubscription {
            attribution_id: attribution_id.to_string(),
            subscription_id: subscription_id.to_string(),
            external_subscription_id: format!("ext_{}", subscription_id),
            recipient_id: recipient_id.to_string(),
            amount,
            currency: "usd".to_string(),
            status: SubscriptionStatus::parse(status),
            percentage: pct,
        }
    }

    #[test]
    fn test_inactive_subscriptions_contribute_nothing() {
        let rows = vec![
            row("a1", "s1", "r1", 10_000, "past_due", Some(100)),
            row("a2", "s2", "r1", 10_000, "canceled", Some(70)),
            row("a3", "s3", "r1", 10_000, "trialing", None),
        ];
        let result = aggregate(&rows, &HashMap::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_default_percentage_applied() {
        let rows = vec![row("a1", "s1", "r1", 2999, "active", None)];
        let result = aggregate(&rows, &HashMap::new());
        assert_eq!(result[0].total_earnings, 2099);
        assert_eq!(result[0].subscriptions[0].split.platform_fee, 900);
    }

    #[test]
    fn test_duplicate_attribution_counted_once() {
        let rows = vec![
            row("a1", "s1", "r1", 1000, "active", Some(50)),
            row("a2", "s1", "r1", 1000, "active", Some(90)),
            row("a3", "s2", "r1", 1000, "active", Some(50)),
        ];
        let result = aggregate(&rows, &HashMap::new());
        assert_eq!(result[0].subscription_count, 2);
        // First row wins for the duplicated pair
        assert_eq!(result[0].total_earnings, 1000);
    }

    #[test]
    fn test_same_subscription_different_recipients_both_count() {
        let rows = vec![
            row("a1", "s1", "r1", 1000, "active", Some(50)),
            row("a2", "s1", "r2", 1000, "active", Some(20)),
        ];
        let result = aggregate(&rows, &HashMap::new());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].total_earnings, 500);
        assert_eq!(result[1].total_earnings, 200);
    }

    #[test]
    fn test_overpayment_kept_raw_and_clamped_for_display() {
        let rows = vec![row("a1", "s1", "r1", 1000, "active", Some(70))];
        let disbursed = HashMap::from([("r1".to_string(), 1500_i64), ("r2".to_string(), 100_i64)]);
        let result = aggregate(&rows, &disbursed);

        let r1 = result.iter().find(|e| e.recipient_id == "r1").unwrap();
        assert_eq!(r1.unpaid_earnings, -800);
        assert_eq!(r1.displayed_unpaid(), 0);

        let r2 = result.iter().find(|e| e.recipient_id == "r2").unwrap();
        assert_eq!(r2.total_earnings, 0);
        assert_eq!(r2.unpaid_earnings, -100);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let rows = vec![
            row("a1", "s1", "r2", 999, "active", Some(33)),
            row("a2", "s2", "r1", 1999, "active", None),
        ];
        let disbursed = HashMap::from([("r1".to_string(), 100_i64)]);
        assert_eq!(aggregate(&rows, &disbursed), aggregate(&rows, &disbursed));
    }
}
