//! Recipient Entity
//!
//! A developer or vendor account entitled to a payout share. Account flags
//! are only ever written from gateway account-status data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability snapshot of a recipient's connected gateway account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    /// Outstanding requirements, verbatim from the gateway
    #[serde(default)]
    pub requirements_due: Vec<String>,
}

impl AccountStatus {
    pub fn onboarding_complete(&self) -> bool {
        self.charges_enabled && self.details_submitted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Connected account reference at the gateway; `None` until onboarding starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_ref: Option<String>,

    pub onboarding_complete: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    #[serde(default)]
    pub requirements_due: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::generate_id(),
            email: email.into(),
            name: None,
            external_account_ref: None,
            onboarding_complete: false,
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            requirements_due: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_account_ref(mut self, account_ref: impl Into<String>) -> Self {
        self.external_account_ref = Some(account_ref.into());
        self
    }

    /// Overwrite the account flags from a gateway snapshot.
    pub fn apply_account_status(&mut self, status: &AccountStatus) {
        self.charges_enabled = status.charges_enabled;
        self.payouts_enabled = status.payouts_enabled;
        self.details_submitted = status.details_submitted;
        self.onboarding_complete = status.onboarding_complete();
        self.requirements_due = status.requirements_due.clone();
        self.updated_at = Utc::now();
    }

    pub fn account_status(&self) -> AccountStatus {
        AccountStatus {
            charges_enabled: self.charges_enabled,
            payouts_enabled: self.payouts_enabled,
            details_submitted: self.details_submitted,
            requirements_due: self.requirements_due.clone(),
        }
    }

    pub fn is_payout_eligible(&self) -> bool {
        self.payouts_enabled && self.onboarding_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_recipient_is_not_eligible() {
        let recipient = Recipient::new("dev@example.com").with_account_ref("acct_1");
        assert!(!recipient.is_payout_eligible());
        assert!(!recipient.onboarding_complete);
    }

    #[test]
    fn test_onboarding_requires_charges_and_details() {
        let mut recipient = Recipient::new("dev@example.com");
        recipient.apply_account_status(&AccountStatus {
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: false,
            requirements_due: vec!["external_account".to_string()],
        });
        assert!(!recipient.onboarding_complete);
        assert!(!recipient.is_payout_eligible());
        assert_eq!(recipient.requirements_due, vec!["external_account"]);

        recipient.apply_account_status(&AccountStatus {
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
            requirements_due: vec![],
        });
        assert!(recipient.onboarding_complete);
        assert!(recipient.is_payout_eligible());
    }

    #[test]
    fn test_payouts_disabled_blocks_eligibility() {
        let mut recipient = Recipient::new("dev@example.com");
        recipient.apply_account_status(&AccountStatus {
            charges_enabled: true,
            payouts_enabled: false,
            details_submitted: true,
            requirements_due: vec![],
        });
        assert!(recipient.onboarding_complete);
        assert!(!recipient.is_payout_eligible());
    }
}
