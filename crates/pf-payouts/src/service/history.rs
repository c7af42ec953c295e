//! Payout history and stale pending payouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pf_common::{Payout, PayoutStatus};
use pf_ledger::LedgerStore;
use serde::Serialize;

use crate::error::{PayoutError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSummary {
    pub total_payouts: usize,
    /// Sum over completed payouts only
    pub total_amount: i64,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
}

impl PayoutSummary {
    pub fn from_payouts(payouts: &[Payout]) -> Self {
        payouts.iter().fold(
            Self {
                total_payouts: payouts.len(),
                ..Self::default()
            },
            |mut summary, payout| {
                match payout.status {
                    PayoutStatus::Completed => {
                        summary.completed += 1;
                        summary.total_amount += payout.amount;
                    }
                    PayoutStatus::Pending => summary.pending += 1,
                    PayoutStatus::Failed => summary.failed += 1,
                }
                summary
            },
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutHistory {
    /// Newest first
    pub payouts: Vec<Payout>,
    pub summary: PayoutSummary,
}

pub struct PayoutHistoryService {
    ledger: Arc<dyn LedgerStore>,
    stale_after: Duration,
}

impl PayoutHistoryService {
    pub fn new(ledger: Arc<dyn LedgerStore>, stale_after: Duration) -> Self {
        Self { ledger, stale_after }
    }

    pub async fn history(&self, recipient_id: Option<&str>) -> Result<PayoutHistory> {
        let payouts = self.ledger.list_payouts(recipient_id).await?;
        let summary = PayoutSummary::from_payouts(&payouts);
        Ok(PayoutHistory { payouts, summary })
    }

    /// Pending payouts older than the configured threshold; these need a
    /// gateway lookup before any retry.
    pub async fn stale_pending(&self) -> Result<Vec<Payout>> {
        let age = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| PayoutError::internal(format!("invalid stale threshold: {}", e)))?;
        Ok(self.ledger.stale_pending_payouts(Utc::now() - age).await?)
    }
}
