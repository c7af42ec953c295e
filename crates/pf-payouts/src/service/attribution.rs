//! Attribution Service

use std::sync::Arc;

use pf_common::{Attribution, AuditAction};
use pf_ledger::LedgerStore;

use super::audit::AuditService;
use crate::error::{PayoutError, Result};

pub struct AttributionService {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<AuditService>,
}

impl AttributionService {
    pub fn new(ledger: Arc<dyn LedgerStore>, audit: Arc<AuditService>) -> Self {
        Self { ledger, audit }
    }

    /// Credit a subscription to a recipient. A subscription may be credited
    /// to the same recipient only once.
    pub async fn create(
        &self,
        subscription_id: &str,
        recipient_id: &str,
        percentage: Option<i32>,
    ) -> Result<Attribution> {
        if let Some(pct) = percentage {
            if !(0..=100).contains(&pct) {
                return Err(PayoutError::validation(format!(
                    "percentage must be between 0 and 100, got {}",
                    pct
                )));
            }
        }

        if self.ledger.get_subscription(subscription_id).await?.is_none() {
            return Err(PayoutError::not_found("Subscription", subscription_id));
        }
        if self.ledger.get_recipient(recipient_id).await?.is_none() {
            return Err(PayoutError::RecipientNotFound {
                id: recipient_id.to_string(),
            });
        }

        let attribution = Attribution::new(subscription_id, recipient_id, percentage);
        self.ledger.insert_attribution(&attribution).await?;

        self.audit
            .log_entity(
                AuditAction::AttributionCreated,
                "Attribution",
                &attribution.id,
                format!(
                    "Subscription {} attributed to {} at {}%",
                    subscription_id,
                    recipient_id,
                    attribution.effective_percentage()
                ),
            )
            .await;
        Ok(attribution)
    }
}
