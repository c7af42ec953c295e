//! Recipient Service
//!
//! Registration and on-demand account status refresh. Status normally
//! arrives through `account.updated` events; refresh pulls it from the
//! gateway directly.

use std::sync::Arc;

use pf_common::{AuditAction, Recipient};
use pf_gateway::PaymentGateway;
use pf_ledger::LedgerStore;
use tracing::info;

use super::audit::AuditService;
use crate::error::{PayoutError, Result};

#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub email: String,
    pub name: Option<String>,
    pub external_account_ref: Option<String>,
}

pub struct RecipientService {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<AuditService>,
}

impl RecipientService {
    pub fn new(ledger: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>, audit: Arc<AuditService>) -> Self {
        Self { ledger, gateway, audit }
    }

    pub async fn register(&self, new: NewRecipient) -> Result<Recipient> {
        let email = new.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(PayoutError::validation("a valid email is required"));
        }

        let mut recipient = Recipient::new(email);
        if let Some(name) = new.name.filter(|n| !n.trim().is_empty()) {
            recipient = recipient.with_name(name);
        }
        if let Some(account_ref) = new.external_account_ref.filter(|a| !a.trim().is_empty()) {
            recipient = recipient.with_account_ref(account_ref);
        }

        self.ledger.insert_recipient(&recipient).await?;
        self.audit
            .log_entity(
                AuditAction::RecipientRegistered,
                "Recipient",
                &recipient.id,
                format!("Recipient {} registered", recipient.email),
            )
            .await;
        Ok(recipient)
    }

    pub async fn get(&self, id: &str) -> Result<Recipient> {
        self.ledger
            .get_recipient(id)
            .await?
            .ok_or_else(|| PayoutError::RecipientNotFound { id: id.to_string() })
    }

    pub async fn refresh_account_status(&self, id: &str) -> Result<Recipient> {
        let recipient = self.get(id).await?;
        let Some(account_ref) = recipient.external_account_ref.as_deref() else {
            return Err(PayoutError::NotOnboarded { id: id.to_string() });
        };

        let status = self.gateway.retrieve_account(account_ref).await?;
        if recipient.account_status() == status {
            return Ok(recipient);
        }

        let updated = self
            .ledger
            .apply_account_status(account_ref, &status)
            .await?
            .ok_or_else(|| PayoutError::RecipientNotFound { id: id.to_string() })?;
        info!(
            recipient_id = %updated.id,
            onboarding_complete = updated.onboarding_complete,
            payouts_enabled = updated.payouts_enabled,
            "Account status refreshed"
        );
        self.audit
            .log_entity(
                AuditAction::AccountStatusChanged,
                "Recipient",
                &updated.id,
                format!("Account {} refreshed from gateway", account_ref),
            )
            .await;
        Ok(updated)
    }
}
