//! Audit Entry
//!
//! Records payout lifecycle steps and reconciliation anomalies for manual review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Payout intent recorded
    PayoutRequested,
    /// Gateway accepted the transfer
    PayoutCompleted,
    /// Gateway rejected the transfer
    PayoutFailed,
    /// Gateway outcome unknown, row left pending
    PayoutLeftPending,
    /// Transfer confirmed by an asynchronous event
    PayoutConfirmed,
    /// Event state disagreed with local state and overwrote it
    ReconciliationConflict,
    /// Account capability flags changed
    AccountStatusChanged,
    RecipientRegistered,
    AttributionCreated,
    ProductCreated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayoutRequested => "PAYOUT_REQUESTED",
            Self::PayoutCompleted => "PAYOUT_COMPLETED",
            Self::PayoutFailed => "PAYOUT_FAILED",
            Self::PayoutLeftPending => "PAYOUT_LEFT_PENDING",
            Self::PayoutConfirmed => "PAYOUT_CONFIRMED",
            Self::ReconciliationConflict => "RECONCILIATION_CONFLICT",
            Self::AccountStatusChanged => "ACCOUNT_STATUS_CHANGED",
            Self::RecipientRegistered => "RECIPIENT_REGISTERED",
            Self::AttributionCreated => "ATTRIBUTION_CREATED",
            Self::ProductCreated => "PRODUCT_CREATED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let action = match value {
            "PAYOUT_REQUESTED" => Self::PayoutRequested,
            "PAYOUT_COMPLETED" => Self::PayoutCompleted,
            "PAYOUT_FAILED" => Self::PayoutFailed,
            "PAYOUT_LEFT_PENDING" => Self::PayoutLeftPending,
            "PAYOUT_CONFIRMED" => Self::PayoutConfirmed,
            "RECONCILIATION_CONFLICT" => Self::ReconciliationConflict,
            "ACCOUNT_STATUS_CHANGED" => Self::AccountStatusChanged,
            "RECIPIENT_REGISTERED" => Self::RecipientRegistered,
            "ATTRIBUTION_CREATED" => Self::AttributionCreated,
            "PRODUCT_CREATED" => Self::ProductCreated,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    /// Entity type affected (e.g. "Payout", "Recipient")
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, entity_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: crate::generate_id(),
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            description: description.into(),
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_entity(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut entry = Self::new(action, entity_type, description);
        entry.entity_id = Some(entity_id.into());
        entry
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_string_mapping() {
        for action in [
            AuditAction::PayoutRequested,
            AuditAction::ReconciliationConflict,
            AuditAction::AttributionCreated,
            AuditAction::ProductCreated,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_entry_for_entity() {
        let entry = AuditEntry::for_entity(AuditAction::PayoutFailed, "Payout", "p-1", "rejected")
            .with_details(serde_json::json!({"reason": "insufficient funds"}));
        assert_eq!(entry.entity_id.as_deref(), Some("p-1"));
        assert_eq!(entry.details.unwrap()["reason"], "insufficient funds");
    }
}
