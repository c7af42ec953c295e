//! Audit Service
//!
//! Records payout lifecycle steps and reconciliation anomalies. A failed
//! audit write is logged and never fails the operation being audited.

use std::sync::Arc;

use pf_common::{AuditAction, AuditEntry, Payout};
use pf_ledger::LedgerStore;
use tracing::{error, info, warn};

use crate::error::Result;

#[derive(Clone)]
pub struct AuditService {
    ledger: Arc<dyn LedgerStore>,
}

impl AuditService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Log a payout lifecycle step
    pub async fn log_payout(&self, action: AuditAction, payout: &Payout, description: impl Into<String>) {
        let entry = AuditEntry::for_entity(action, "Payout", &payout.id, description).with_details(
            serde_json::json!({
                "recipientId": payout.recipient_id,
                "amount": payout.amount,
                "currency": payout.currency,
                "status": payout.status,
                "externalTransferId": payout.external_transfer_id,
            }),
        );
        self.insert(entry).await;
    }

    /// Log a state disagreement between an event and the ledger.
    pub async fn log_conflict(
        &self,
        entity_type: &str,
        entity_id: &str,
        description: impl Into<String>,
        details: serde_json::Value,
    ) {
        let description = description.into();
        warn!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            details = %details,
            "Reconciliation conflict: {}",
            description
        );
        metrics::counter!("reconciliation_conflicts_total").increment(1);
        let entry = AuditEntry::for_entity(AuditAction::ReconciliationConflict, entity_type, entity_id, description)
            .with_details(details);
        self.insert(entry).await;
    }

    /// Log a change to an entity other than a payout
    pub async fn log_entity(&self, action: AuditAction, entity_type: &str, entity_id: &str, description: impl Into<String>) {
        let entry = AuditEntry::for_entity(action, entity_type, entity_id, description);
        self.insert(entry).await;
    }

    pub async fn list(&self, entity_id: Option<&str>, limit: u32) -> Result<Vec<AuditEntry>> {
        Ok(self.ledger.list_audit(entity_id, limit).await?)
    }

    async fn insert(&self, entry: AuditEntry) {
        info!(
            action = ?entry.action,
            entity_type = %entry.entity_type,
            entity_id = ?entry.entity_id,
            "{}",
            entry.description
        );
        if let Err(e) = self.ledger.insert_audit(&entry).await {
            error!(error = %e, action = ?entry.action, "Failed to write audit entry");
        }
    }
}
