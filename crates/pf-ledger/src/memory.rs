//! In-memory ledger store.
//!
//! Backs the dev server and tests. All state sits behind one mutex, so each
//! operation is atomic; the conditional semantics match the PostgreSQL store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pf_common::{
    AccountStatus, AttributedSubscription, Attribution, AuditEntry, BankPayoutStatus,
    BankPayoutUpdate, Payout, PayoutStatus, Product, Recipient, Subscription, SubscriptionStatus,
    SubscriptionUpsert,
};

use crate::{LedgerError, LedgerStore, PayoutTransition, Result};

#[derive(Default)]
struct MemoryState {
    recipients: HashMap<String, Recipient>,
    products: HashMap<String, Product>,
    subscriptions: HashMap<String, Subscription>,
    attributions: Vec<Attribution>,
    payouts: Vec<Payout>,
    processed_events: HashSet<String>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn payout_mut(&mut self, id: &str) -> Option<&mut Payout> {
        self.payouts.iter_mut().find(|p| p.id == id)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription row directly, bypassing the event path.
    pub fn seed_subscription(&self, subscription: Subscription) {
        self.state
            .lock()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Insert an attribution without the uniqueness check, reproducing rows
    /// written before the constraint existed.
    pub fn seed_attribution_unchecked(&self, attribution: Attribution) {
        self.state.lock().attributions.push(attribution);
    }

    pub fn payout_count(&self) -> usize {
        self.state.lock().payouts.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        let mut state = self.state.lock();
        if state.recipients.contains_key(&recipient.id) {
            return Err(LedgerError::duplicate("Recipient", "id", &recipient.id));
        }
        if let Some(account_ref) = &recipient.external_account_ref {
            let taken = state
                .recipients
                .values()
                .any(|r| r.external_account_ref.as_ref() == Some(account_ref));
            if taken {
                return Err(LedgerError::duplicate("Recipient", "external_account_ref", account_ref));
            }
        }
        state.recipients.insert(recipient.id.clone(), recipient.clone());
        Ok(())
    }

    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>> {
        Ok(self.state.lock().recipients.get(id).cloned())
    }

    async fn find_recipient_by_account(&self, account_ref: &str) -> Result<Option<Recipient>> {
        let state = self.state.lock();
        Ok(state
            .recipients
            .values()
            .find(|r| r.external_account_ref.as_deref() == Some(account_ref))
            .cloned())
    }

    async fn apply_account_status(&self, account_ref: &str, status: &AccountStatus) -> Result<Option<Recipient>> {
        let mut state = self.state.lock();
        let recipient = state
            .recipients
            .values_mut()
            .find(|r| r.external_account_ref.as_deref() == Some(account_ref));
        Ok(recipient.map(|r| {
            r.apply_account_status(status);
            r.clone()
        }))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock();
        if state.products.contains_key(&product.id) {
            return Err(LedgerError::duplicate("Product", "id", &product.id));
        }
        if let Some(price_id) = &product.external_price_id {
            if state.products.values().any(|p| p.external_price_id.as_ref() == Some(price_id)) {
                return Err(LedgerError::duplicate("Product", "external_price_id", price_id));
            }
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn find_product_by_price(&self, external_price_id: &str) -> Result<Option<Product>> {
        let state = self.state.lock();
        Ok(state
            .products
            .values()
            .find(|p| p.external_price_id.as_deref() == Some(external_price_id))
            .cloned())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.state.lock().subscriptions.get(id).cloned())
    }

    async fn get_subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>> {
        let state = self.state.lock();
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.external_id == external_id)
            .cloned())
    }

    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<Option<Subscription>> {
        let mut state = self.state.lock();
        let now = Utc::now();

        if let Some(existing) = state
            .subscriptions
            .values_mut()
            .find(|s| s.external_id == upsert.external_id)
        {
            if let Some(recipient_id) = &upsert.recipient_id {
                existing.recipient_id = recipient_id.clone();
            }
            if upsert.product_id.is_some() {
                existing.product_id = upsert.product_id.clone();
            }
            if upsert.customer_ref.is_some() {
                existing.customer_ref = upsert.customer_ref.clone();
            }
            existing.amount = upsert.amount;
            existing.currency = upsert.currency.clone();
            existing.status = upsert.status.clone();
            existing.current_period_start = upsert.current_period_start;
            existing.current_period_end = upsert.current_period_end;
            existing.updated_at = now;
            return Ok(Some(existing.clone()));
        }

        let Some(recipient_id) = &upsert.recipient_id else {
            return Ok(None);
        };
        let subscription = Subscription {
            id: pf_common::generate_id(),
            external_id: upsert.external_id.clone(),
            recipient_id: recipient_id.clone(),
            product_id: upsert.product_id.clone(),
            customer_ref: upsert.customer_ref.clone(),
            amount: upsert.amount,
            currency: upsert.currency.clone(),
            status: upsert.status.clone(),
            current_period_start: upsert.current_period_start,
            current_period_end: upsert.current_period_end,
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.insert(subscription.id.clone(), subscription.clone());
        Ok(Some(subscription))
    }

    async fn set_subscription_status(&self, external_id: &str, status: &SubscriptionStatus) -> Result<bool> {
        let mut state = self.state.lock();
        match state.subscriptions.values_mut().find(|s| s.external_id == external_id) {
            Some(subscription) => {
                subscription.status = status.clone();
                subscription.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_attribution(&self, attribution: &Attribution) -> Result<()> {
        let mut state = self.state.lock();
        let exists = state.attributions.iter().any(|a| {
            a.subscription_id == attribution.subscription_id && a.recipient_id == attribution.recipient_id
        });
        if exists {
            return Err(LedgerError::duplicate(
                "Attribution",
                "subscription_id,recipient_id",
                format!("{},{}", attribution.subscription_id, attribution.recipient_id),
            ));
        }
        state.attributions.push(attribution.clone());
        Ok(())
    }

    async fn attributed_subscriptions(
        &self,
        recipient_id: Option<&str>,
        status: Option<&SubscriptionStatus>,
    ) -> Result<Vec<AttributedSubscription>> {
        let state = self.state.lock();
        let rows = state
            .attributions
            .iter()
            .filter(|a| recipient_id.map_or(true, |id| a.recipient_id == id))
            .filter_map(|a| {
                let subscription = state.subscriptions.get(&a.subscription_id)?;
                if status.map_or(false, |s| &subscription.status != s) {
                    return None;
                }
                Some(AttributedSubscription {
                    attribution_id: a.id.clone(),
                    subscription_id: subscription.id.clone(),
                    external_subscription_id: subscription.external_id.clone(),
                    recipient_id: a.recipient_id.clone(),
                    amount: subscription.amount,
                    currency: subscription.currency.clone(),
                    status: subscription.status.clone(),
                    percentage: a.percentage,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<()> {
        let mut state = self.state.lock();
        if state.payouts.iter().any(|p| p.id == payout.id) {
            return Err(LedgerError::duplicate("Payout", "id", &payout.id));
        }
        state.payouts.push(payout.clone());
        Ok(())
    }

    async fn get_payout(&self, id: &str) -> Result<Option<Payout>> {
        Ok(self.state.lock().payouts.iter().find(|p| p.id == id).cloned())
    }

    async fn find_payout_by_transfer(&self, transfer_id: &str) -> Result<Option<Payout>> {
        let state = self.state.lock();
        Ok(state
            .payouts
            .iter()
            .find(|p| p.external_transfer_id.as_deref() == Some(transfer_id))
            .cloned())
    }

    async fn disbursed_totals(&self, recipient_id: Option<&str>) -> Result<HashMap<String, i64>> {
        let state = self.state.lock();
        let mut totals = HashMap::new();
        for payout in state
            .payouts
            .iter()
            .filter(|p| p.status.counts_as_disbursed())
            .filter(|p| recipient_id.map_or(true, |id| p.recipient_id == id))
        {
            *totals.entry(payout.recipient_id.clone()).or_insert(0) += payout.amount;
        }
        Ok(totals)
    }

    async fn transition_payout(&self, transition: &PayoutTransition) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(payout) = state.payout_mut(&transition.payout_id) else {
            return Ok(false);
        };
        if payout.status != transition.from {
            return Ok(false);
        }
        payout.status = transition.to;
        if let Some(transfer_id) = &transition.transfer_id {
            payout.external_transfer_id = Some(transfer_id.clone());
        }
        if let Some(message) = &transition.failure_message {
            payout.failure_message = Some(message.clone());
        }
        payout.updated_at = Utc::now();
        Ok(true)
    }

    async fn attach_transfer_id(&self, payout_id: &str, transfer_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        match state.payout_mut(payout_id) {
            Some(payout) if payout.external_transfer_id.is_none() => {
                payout.external_transfer_id = Some(transfer_id.to_string());
                payout.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn latest_unlinked_pending(&self, recipient_id: &str) -> Result<Option<Payout>> {
        let state = self.state.lock();
        Ok(state
            .payouts
            .iter()
            .rev()
            .find(|p| {
                p.recipient_id == recipient_id
                    && p.status == PayoutStatus::Pending
                    && p.external_transfer_id.is_none()
            })
            .cloned())
    }

    async fn update_bank_payout(&self, update: &BankPayoutUpdate) -> Result<bool> {
        let mut state = self.state.lock();
        let target = state.payouts.iter_mut().find(|p| {
            p.bank_payout_id.as_deref() == Some(update.bank_payout_id.as_str())
                || (p.bank_payout_id.is_none()
                    && update.source_transfer_id.is_some()
                    && p.external_transfer_id == update.source_transfer_id)
        });
        let Some(payout) = target else {
            return Ok(false);
        };
        if !BankPayoutStatus::can_advance(payout.bank_payout_status, update.status) {
            return Ok(false);
        }
        payout.bank_payout_id = Some(update.bank_payout_id.clone());
        payout.bank_payout_status = Some(update.status);
        payout.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_payouts(&self, recipient_id: Option<&str>) -> Result<Vec<Payout>> {
        let state = self.state.lock();
        Ok(state
            .payouts
            .iter()
            .rev()
            .filter(|p| recipient_id.map_or(true, |id| p.recipient_id == id))
            .cloned()
            .collect())
    }

    async fn stale_pending_payouts(&self, older_than: DateTime<Utc>) -> Result<Vec<Payout>> {
        let state = self.state.lock();
        Ok(state
            .payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Pending && p.created_at < older_than)
            .cloned()
            .collect())
    }

    async fn mark_event_processed(&self, event_id: &str, _event_type: &str) -> Result<bool> {
        Ok(self.state.lock().processed_events.insert(event_id.to_string()))
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.state.lock().processed_events.contains(event_id))
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.state.lock().audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, entity_id: Option<&str>, limit: u32) -> Result<Vec<AuditEntry>> {
        let state = self.state.lock();
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| entity_id.map_or(true, |id| e.entity_id.as_deref() == Some(id)))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
