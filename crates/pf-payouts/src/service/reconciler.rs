//! Event Reconciler
//!
//! Applies verified gateway events to the ledger. Every handler is
//! idempotent: re-delivering an event leaves the ledger unchanged. Events
//! that contradict recorded state never overwrite it silently; they are
//! logged as conflicts for manual review.

use std::sync::Arc;

use pf_common::{
    AuditAction, BankPayoutStatus, BankPayoutUpdate, Payout, PayoutStatus, SubscriptionStatus,
    SubscriptionUpsert,
};
use pf_gateway::{
    AccountObject, BankPayoutObject, GatewayEvent, InvoiceObject, ReceivedEvent,
    SubscriptionObject, TransferObject, WebhookError, WebhookVerifier,
};
use pf_ledger::{LedgerStore, PayoutTransition};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::audit::AuditService;
use crate::error::{PayoutError, Result};

/// Compare-and-set attempts before a transfer event gives up on a row that
/// keeps changing underneath it.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The ledger changed
    Applied,
    /// The ledger already reflected the event
    NoChange,
    /// The event contradicted recorded state; logged for review
    Conflict,
    /// No local record corresponds to the event
    Unmatched,
    /// Event type not consumed
    Ignored,
    /// Event id already processed
    Duplicate,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::NoChange => "no_change",
            Self::Conflict => "conflict",
            Self::Unmatched => "unmatched",
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
        }
    }
}

pub struct EventReconciler {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<AuditService>,
    verifier: WebhookVerifier,
}

impl EventReconciler {
    pub fn new(ledger: Arc<dyn LedgerStore>, audit: Arc<AuditService>, verifier: WebhookVerifier) -> Self {
        Self { ledger, audit, verifier }
    }

    /// Verify and apply a raw webhook delivery.
    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome> {
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        let event = self.verifier.construct_event(payload, header)?;
        self.process(event).await
    }

    /// Apply an already verified event.
    pub async fn process(&self, received: ReceivedEvent) -> Result<ReconcileOutcome> {
        if self.ledger.is_event_processed(&received.id).await? {
            debug!(event_id = %received.id, "Event already processed");
            self.record_metric(&received.event_type, ReconcileOutcome::Duplicate);
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = match &received.event {
            GatewayEvent::AccountUpdated(account) => self.on_account_updated(account).await?,
            GatewayEvent::SubscriptionChanged(sub) => {
                self.on_subscription_changed(sub, received.account.as_deref()).await?
            }
            GatewayEvent::SubscriptionDeleted(sub) => self.on_subscription_deleted(sub).await?,
            GatewayEvent::InvoicePaid(invoice) => {
                self.on_invoice(invoice, SubscriptionStatus::Active).await?
            }
            GatewayEvent::InvoicePaymentFailed(invoice) => {
                self.on_invoice(invoice, SubscriptionStatus::PastDue).await?
            }
            GatewayEvent::TransferCreated(transfer) => self.on_transfer_created(transfer).await?,
            GatewayEvent::TransferFailed(transfer) => self.on_transfer_failed(transfer).await?,
            GatewayEvent::BankPayoutCreated(payout) => {
                self.on_bank_payout(payout, BankPayoutStatus::Pending).await?
            }
            GatewayEvent::BankPayoutPaid(payout) => self.on_bank_payout(payout, BankPayoutStatus::Paid).await?,
            GatewayEvent::BankPayoutFailed(payout) => {
                if let Some(message) = &payout.failure_message {
                    warn!(bank_payout_id = %payout.id, failure = %message, "Bank payout failed");
                }
                self.on_bank_payout(payout, BankPayoutStatus::Failed).await?
            }
            GatewayEvent::Unknown { event_type } => {
                debug!(event_type = %event_type, "Ignoring unhandled event type");
                ReconcileOutcome::Ignored
            }
        };

        if !received.event.is_unknown() {
            self.ledger
                .mark_event_processed(&received.id, &received.event_type)
                .await?;
        }

        info!(
            event_id = %received.id,
            event_type = %received.event_type,
            outcome = outcome.as_str(),
            "Gateway event reconciled"
        );
        self.record_metric(&received.event_type, outcome);
        Ok(outcome)
    }

    fn record_metric(&self, event_type: &str, outcome: ReconcileOutcome) {
        metrics::counter!(
            "gateway_events_total",
            "type" => event_type.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    async fn on_account_updated(&self, account: &AccountObject) -> Result<ReconcileOutcome> {
        let Some(current) = self.ledger.find_recipient_by_account(&account.id).await? else {
            debug!(account = %account.id, "No recipient for connected account");
            return Ok(ReconcileOutcome::Unmatched);
        };

        let status = account.status();
        if current.account_status() == status {
            return Ok(ReconcileOutcome::NoChange);
        }

        let Some(updated) = self.ledger.apply_account_status(&account.id, &status).await? else {
            return Ok(ReconcileOutcome::Unmatched);
        };
        self.audit
            .log_entity(
                AuditAction::AccountStatusChanged,
                "Recipient",
                &updated.id,
                format!(
                    "Account {} updated: onboarding_complete={}, payouts_enabled={}",
                    account.id, updated.onboarding_complete, updated.payouts_enabled
                ),
            )
            .await;
        Ok(ReconcileOutcome::Applied)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    async fn on_subscription_changed(
        &self,
        sub: &SubscriptionObject,
        account: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let status = sub
            .status
            .as_deref()
            .map(SubscriptionStatus::parse)
            .ok_or_else(|| PayoutError::validation(format!("subscription {} has no status", sub.id)))?;

        let amount = sub.amount().ok_or_else(|| {
            PayoutError::validation(format!("subscription {} amount overflows", sub.id))
        })?;

        let recipient_id = match account {
            Some(account_ref) => self
                .ledger
                .find_recipient_by_account(account_ref)
                .await?
                .map(|r| r.id),
            None => None,
        };
        let product = match sub.price_id() {
            Some(price_id) => self.ledger.find_product_by_price(price_id).await?,
            None => None,
        };
        let recipient_id = recipient_id.or_else(|| product.as_ref().map(|p| p.recipient_id.clone()));

        let upsert = SubscriptionUpsert {
            external_id: sub.id.clone(),
            recipient_id,
            product_id: product.map(|p| p.id),
            customer_ref: sub.customer_id(),
            amount,
            currency: sub.currency(),
            status,
            current_period_start: sub.period_start(),
            current_period_end: sub.period_end(),
        };

        let before = self.ledger.get_subscription_by_external_id(&sub.id).await?;
        match self.ledger.upsert_subscription(&upsert).await? {
            Some(after) => {
                let unchanged = before.as_ref().is_some_and(|b| {
                    b.status == after.status
                        && b.amount == after.amount
                        && b.currency == after.currency
                        && b.current_period_start == after.current_period_start
                        && b.current_period_end == after.current_period_end
                });
                Ok(if unchanged {
                    ReconcileOutcome::NoChange
                } else {
                    ReconcileOutcome::Applied
                })
            }
            None => {
                warn!(
                    subscription = %sub.id,
                    account = ?account,
                    "Subscription event for unknown recipient ignored"
                );
                Ok(ReconcileOutcome::Unmatched)
            }
        }
    }

    async fn on_subscription_deleted(&self, sub: &SubscriptionObject) -> Result<ReconcileOutcome> {
        let Some(existing) = self.ledger.get_subscription_by_external_id(&sub.id).await? else {
            return Ok(ReconcileOutcome::Unmatched);
        };
        if existing.status == SubscriptionStatus::Canceled {
            return Ok(ReconcileOutcome::NoChange);
        }
        self.ledger
            .set_subscription_status(&sub.id, &SubscriptionStatus::Canceled)
            .await?;
        Ok(ReconcileOutcome::Applied)
    }

    /// Invoice outcomes move a subscription in or out of earning. A canceled
    /// subscription stays canceled.
    async fn on_invoice(&self, invoice: &InvoiceObject, status: SubscriptionStatus) -> Result<ReconcileOutcome> {
        let Some(external_id) = invoice.subscription.as_deref() else {
            debug!(invoice = %invoice.id, "Invoice without subscription ignored");
            return Ok(ReconcileOutcome::Ignored);
        };
        let Some(existing) = self.ledger.get_subscription_by_external_id(external_id).await? else {
            warn!(invoice = %invoice.id, subscription = %external_id, "Invoice for unknown subscription");
            return Ok(ReconcileOutcome::Unmatched);
        };
        if existing.status == status || existing.status == SubscriptionStatus::Canceled {
            return Ok(ReconcileOutcome::NoChange);
        }
        self.ledger.set_subscription_status(external_id, &status).await?;
        info!(
            subscription = %external_id,
            from = existing.status.as_str(),
            to = status.as_str(),
            "Subscription status changed by invoice"
        );
        Ok(ReconcileOutcome::Applied)
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Find the payout a transfer event names: by transfer id, then by the
    /// payout id carried in metadata.
    async fn find_named_payout(&self, transfer: &TransferObject) -> Result<Option<Payout>> {
        if let Some(payout) = self.ledger.find_payout_by_transfer(&transfer.id).await? {
            return Ok(Some(payout));
        }
        match transfer.payout_record_id() {
            Some(payout_id) => Ok(self.ledger.get_payout(payout_id).await?),
            None => Ok(None),
        }
    }

    /// Like `find_named_payout`, falling back to the recipient's most recent
    /// unlinked pending payout. Failure events never use the fallback.
    async fn resolve_created_transfer_payout(&self, transfer: &TransferObject) -> Result<Option<Payout>> {
        if let Some(payout) = self.find_named_payout(transfer).await? {
            return Ok(Some(payout));
        }

        let recipient_id = match transfer.recipient_id() {
            Some(id) => Some(id.to_string()),
            None => match transfer.destination.as_deref() {
                Some(destination) => self
                    .ledger
                    .find_recipient_by_account(destination)
                    .await?
                    .map(|r| r.id),
                None => None,
            },
        };
        match recipient_id {
            Some(id) => Ok(self.ledger.latest_unlinked_pending(&id).await?),
            None => Ok(None),
        }
    }

    async fn on_transfer_created(&self, transfer: &TransferObject) -> Result<ReconcileOutcome> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let Some(payout) = self.resolve_created_transfer_payout(transfer).await? else {
                warn!(transfer_id = %transfer.id, "Transfer event matches no payout");
                return Ok(ReconcileOutcome::Unmatched);
            };

            match payout.external_transfer_id.as_deref() {
                Some(linked) if linked != transfer.id => {
                    self.audit
                        .log_conflict(
                            "Payout",
                            &payout.id,
                            "Transfer event for a payout linked to another transfer",
                            json!({ "linkedTransferId": linked, "eventTransferId": transfer.id }),
                        )
                        .await;
                    return Ok(ReconcileOutcome::Conflict);
                }
                Some(_) => {}
                None => {
                    if !self.ledger.attach_transfer_id(&payout.id, &transfer.id).await? {
                        continue;
                    }
                }
            }

            match payout.status {
                PayoutStatus::Completed => {
                    return Ok(if payout.external_transfer_id.is_some() {
                        ReconcileOutcome::NoChange
                    } else {
                        ReconcileOutcome::Applied
                    });
                }
                PayoutStatus::Failed => {
                    self.audit
                        .log_conflict(
                            "Payout",
                            &payout.id,
                            "Transfer created for a payout recorded as failed",
                            json!({ "transferId": transfer.id, "status": payout.status }),
                        )
                        .await;
                    return Ok(ReconcileOutcome::Conflict);
                }
                PayoutStatus::Pending => {
                    let transition =
                        PayoutTransition::new(&payout.id, PayoutStatus::Pending, PayoutStatus::Completed)
                            .with_transfer_id(&transfer.id);
                    if self.ledger.transition_payout(&transition).await? {
                        let mut completed = payout;
                        completed.status = PayoutStatus::Completed;
                        completed.external_transfer_id = Some(transfer.id.clone());
                        self.audit
                            .log_payout(
                                AuditAction::PayoutConfirmed,
                                &completed,
                                format!("Transfer {} confirmed by event", transfer.id),
                            )
                            .await;
                        return Ok(ReconcileOutcome::Applied);
                    }
                }
            }
        }

        Err(PayoutError::internal(format!(
            "payout for transfer {} kept changing during reconciliation",
            transfer.id
        )))
    }

    async fn on_transfer_failed(&self, transfer: &TransferObject) -> Result<ReconcileOutcome> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let Some(payout) = self.find_named_payout(transfer).await? else {
                warn!(transfer_id = %transfer.id, "Transfer failure matches no payout");
                return Ok(ReconcileOutcome::Unmatched);
            };

            if let Some(linked) = payout.external_transfer_id.as_deref() {
                if linked != transfer.id {
                    self.audit
                        .log_conflict(
                            "Payout",
                            &payout.id,
                            "Transfer failure for a payout linked to another transfer",
                            json!({ "linkedTransferId": linked, "eventTransferId": transfer.id }),
                        )
                        .await;
                    return Ok(ReconcileOutcome::Conflict);
                }
            }

            let from = match payout.status {
                PayoutStatus::Failed => return Ok(ReconcileOutcome::NoChange),
                status => status,
            };
            let transition = PayoutTransition::new(&payout.id, from, PayoutStatus::Failed)
                .with_transfer_id(&transfer.id)
                .with_failure("Transfer failed");
            if !self.ledger.transition_payout(&transition).await? {
                continue;
            }

            let mut failed = payout;
            failed.status = PayoutStatus::Failed;
            failed.external_transfer_id = Some(transfer.id.clone());
            if from == PayoutStatus::Completed {
                self.audit
                    .log_conflict(
                        "Payout",
                        &failed.id,
                        "Transfer failed after payout was recorded as completed",
                        json!({ "transferId": transfer.id, "previousStatus": from }),
                    )
                    .await;
                return Ok(ReconcileOutcome::Conflict);
            }
            self.audit
                .log_payout(AuditAction::PayoutFailed, &failed, format!("Transfer {} failed", transfer.id))
                .await;
            return Ok(ReconcileOutcome::Applied);
        }

        Err(PayoutError::internal(format!(
            "payout for transfer {} kept changing during reconciliation",
            transfer.id
        )))
    }

    // ========================================================================
    // Bank payouts
    // ========================================================================

    async fn on_bank_payout(&self, bank: &BankPayoutObject, status: BankPayoutStatus) -> Result<ReconcileOutcome> {
        let update = BankPayoutUpdate {
            bank_payout_id: bank.id.clone(),
            source_transfer_id: bank.source_transaction.clone(),
            status,
        };
        if self.ledger.update_bank_payout(&update).await? {
            debug!(bank_payout_id = %bank.id, status = status.as_str(), "Bank payout status recorded");
            return Ok(ReconcileOutcome::Applied);
        }

        let known = match &bank.source_transaction {
            Some(transfer_id) => self.ledger.find_payout_by_transfer(transfer_id).await?.is_some(),
            None => false,
        };
        Ok(if known {
            ReconcileOutcome::NoChange
        } else {
            ReconcileOutcome::Unmatched
        })
    }
}
