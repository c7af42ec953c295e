//! Payout Executor
//!
//! Turns a payout request into exactly one transfer attempt:
//!
//! 1. Validate the amount and the recipient's eligibility
//! 2. Under the per-recipient lock, re-check the unpaid balance
//! 3. Record a pending payout intent
//! 4. Call the gateway with the intent id as idempotency key
//! 5. Record the outcome: completed, failed, or left pending when unknown
//!
//! The intent is durable before the gateway is called, so a crash or
//! timeout after step 3 leaves a pending row for reconciliation rather than
//! an untracked transfer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pf_common::{AuditAction, Payout, PayoutPeriod, PayoutStatus, Recipient};
use pf_gateway::{
    GatewayError, PaymentGateway, Transfer, TransferRequest, METADATA_PAYOUT_RECORD_ID,
    METADATA_RECIPIENT_ID, METADATA_TYPE, PAYOUT_METADATA_TYPE,
};
use pf_ledger::{LedgerStore, PayoutTransition};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::aggregator::EarningsAggregator;
use super::audit::AuditService;
use crate::error::{PayoutError, Result};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub currency: String,
    pub min_amount: i64,
    pub max_amount: i64,
    /// Reject requests larger than the recipient's unpaid earnings
    pub enforce_unpaid_balance: bool,
    pub transfer_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            min_amount: 1,
            max_amount: 100_000_000,
            enforce_unpaid_balance: true,
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub recipient_id: String,
    /// Minor units
    pub amount: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub transfer: Transfer,
    pub payout: Payout,
}

pub struct PayoutExecutor {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    aggregator: Arc<EarningsAggregator>,
    audit: Arc<AuditService>,
    config: ExecutorConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PayoutExecutor {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        aggregator: Arc<EarningsAggregator>,
        audit: Arc<AuditService>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            aggregator,
            audit,
            config,
            locks: DashMap::new(),
        }
    }

    pub async fn execute(&self, request: PayoutRequest) -> Result<PayoutReceipt> {
        self.validate_amount(request.amount)?;

        let recipient = self
            .ledger
            .get_recipient(&request.recipient_id)
            .await?
            .ok_or_else(|| PayoutError::RecipientNotFound {
                id: request.recipient_id.clone(),
            })?;
        let destination = Self::check_eligibility(&recipient)?;

        let lock = self.recipient_lock(&recipient.id);
        let result = {
            let _guard = lock.lock().await;
            self.execute_locked(&recipient, destination, &request).await
        };
        drop(lock);
        self.locks
            .remove_if(&recipient.id, |_, l| Arc::strong_count(l) == 1);

        let outcome = match &result {
            Ok(_) => "completed",
            Err(PayoutError::TransferPending { .. }) => "pending",
            Err(PayoutError::TransferFailed { .. }) => "failed",
            Err(_) => "rejected",
        };
        metrics::counter!("payouts_executed_total", "outcome" => outcome).increment(1);

        result
    }

    fn validate_amount(&self, amount: i64) -> Result<()> {
        if amount < self.config.min_amount {
            return Err(PayoutError::invalid_amount(format!(
                "amount must be at least {}",
                self.config.min_amount
            )));
        }
        if amount > self.config.max_amount {
            return Err(PayoutError::invalid_amount(format!(
                "amount must not exceed {}",
                self.config.max_amount
            )));
        }
        Ok(())
    }

    fn check_eligibility(recipient: &Recipient) -> Result<String> {
        let Some(destination) = recipient.external_account_ref.clone() else {
            return Err(PayoutError::NotOnboarded {
                id: recipient.id.clone(),
            });
        };
        if !recipient.onboarding_complete {
            return Err(PayoutError::NotEligible {
                id: recipient.id.clone(),
                reason: "onboarding is not complete".to_string(),
            });
        }
        if !recipient.payouts_enabled {
            return Err(PayoutError::NotEligible {
                id: recipient.id.clone(),
                reason: "payouts are not enabled on the connected account".to_string(),
            });
        }
        Ok(destination)
    }

    fn recipient_lock(&self, recipient_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(recipient_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn execute_locked(
        &self,
        recipient: &Recipient,
        destination: String,
        request: &PayoutRequest,
    ) -> Result<PayoutReceipt> {
        if self.config.enforce_unpaid_balance {
            let earnings = self.aggregator.recipient_earnings(&recipient.id).await?;
            if request.amount > earnings.unpaid_earnings {
                return Err(PayoutError::ExceedsUnpaidBalance {
                    requested: request.amount,
                    available: earnings.displayed_unpaid(),
                });
            }
        }

        let description = request
            .description
            .clone()
            .unwrap_or_else(|| format!("Payout to {}", recipient.email));
        let payout = Payout::pending(
            &recipient.id,
            request.amount,
            &self.config.currency,
            PayoutPeriod::current(),
            Some(description.clone()),
        );
        self.ledger.insert_payout(&payout).await?;
        self.audit
            .log_payout(AuditAction::PayoutRequested, &payout, format!("Payout of {} requested", payout.amount))
            .await;

        let transfer_request = TransferRequest {
            amount: payout.amount,
            currency: payout.currency.clone(),
            destination,
            description: Some(description),
            metadata: BTreeMap::from([
                (METADATA_RECIPIENT_ID.to_string(), recipient.id.clone()),
                (METADATA_PAYOUT_RECORD_ID.to_string(), payout.id.clone()),
                (METADATA_TYPE.to_string(), PAYOUT_METADATA_TYPE.to_string()),
            ]),
            idempotency_key: Some(payout.id.clone()),
        };

        info!(
            payout_id = %payout.id,
            recipient_id = %recipient.id,
            amount = payout.amount,
            gateway = %self.gateway.name(),
            "Creating transfer"
        );

        let attempt = tokio::time::timeout(
            self.config.transfer_timeout,
            self.gateway.create_transfer(&transfer_request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(GatewayError::Timeout(format!(
                "no response within {}s",
                self.config.transfer_timeout.as_secs()
            )))
        });

        match attempt {
            Ok(transfer) => Ok(self.record_success(payout, transfer).await),
            Err(e) if e.is_transient() => {
                warn!(
                    payout_id = %payout.id,
                    error = %e,
                    "Transfer outcome unknown, leaving payout pending"
                );
                self.audit
                    .log_payout(AuditAction::PayoutLeftPending, &payout, format!("Transfer outcome unknown: {}", e))
                    .await;
                Err(PayoutError::TransferPending {
                    payout_id: payout.id,
                    message: e.message().to_string(),
                })
            }
            Err(e) => self.record_failure(payout, e).await,
        }
    }

    /// The transfer exists, so this never fails the request. A ledger error
    /// here leaves the row pending for the `transfer.created` event to fix.
    async fn record_success(&self, mut payout: Payout, transfer: Transfer) -> PayoutReceipt {
        let transition = PayoutTransition::new(&payout.id, PayoutStatus::Pending, PayoutStatus::Completed)
            .with_transfer_id(&transfer.id);

        match self.ledger.transition_payout(&transition).await {
            Ok(true) => {
                payout.status = PayoutStatus::Completed;
                payout.external_transfer_id = Some(transfer.id.clone());
                self.audit
                    .log_payout(AuditAction::PayoutCompleted, &payout, format!("Transfer {} created", transfer.id))
                    .await;
            }
            Ok(false) => {
                // An event already moved the row; report what is stored
                match self.ledger.get_payout(&payout.id).await {
                    Ok(Some(stored)) => payout = stored,
                    Ok(None) => {}
                    Err(e) => error!(payout_id = %payout.id, error = %e, "Failed to re-read payout"),
                }
            }
            Err(e) => {
                error!(
                    payout_id = %payout.id,
                    transfer_id = %transfer.id,
                    error = %e,
                    "Transfer created but payout record not updated"
                );
                payout.external_transfer_id = Some(transfer.id.clone());
            }
        }

        info!(payout_id = %payout.id, transfer_id = %transfer.id, "Payout executed");
        PayoutReceipt { transfer, payout }
    }

    async fn record_failure(&self, mut payout: Payout, e: GatewayError) -> Result<PayoutReceipt> {
        let message = e.message().to_string();
        warn!(payout_id = %payout.id, error = %e, "Transfer rejected");

        let transition = PayoutTransition::new(&payout.id, PayoutStatus::Pending, PayoutStatus::Failed)
            .with_failure(&message);
        match self.ledger.transition_payout(&transition).await {
            Ok(true) => {
                payout.status = PayoutStatus::Failed;
                payout.failure_message = Some(message.clone());
                self.audit
                    .log_payout(AuditAction::PayoutFailed, &payout, format!("Transfer rejected: {}", message))
                    .await;
            }
            Ok(false) => warn!(payout_id = %payout.id, "Payout no longer pending, rejection not recorded"),
            Err(le) => error!(payout_id = %payout.id, error = %le, "Failed to mark payout failed"),
        }

        Err(PayoutError::TransferFailed {
            payout_id: payout.id,
            message,
        })
    }
}
