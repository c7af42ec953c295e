//! Shared fixtures for payout engine tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pf_common::{
    AccountStatus, AttributedSubscription, Attribution, AuditEntry, BankPayoutUpdate, Payout,
    Product, Recipient, Subscription, SubscriptionStatus, SubscriptionUpsert,
};
use pf_gateway::{GatewayError, PaymentGateway, Transfer, TransferRequest, WebhookVerifier};
use pf_ledger::{LedgerStore, MemoryLedger, PayoutTransition};
use pf_payouts::{
    AttributionService, AuditService, EarningsAggregator, EventReconciler, ExecutorConfig,
    PayoutExecutor, PayoutHistoryService, ProductService, RecipientService,
};

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// What the mock gateway does with the next transfer request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Succeed,
    SucceedAfter(Duration),
    Reject(String),
    Unavailable,
    /// Never answers; the executor's timeout has to fire
    Hang,
}

pub struct MockGateway {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<TransferRequest>>,
    account: Mutex<Option<AccountStatus>>,
    counter: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            account: Mutex::new(None),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().push_back(step);
    }

    pub fn set_account(&self, status: AccountStatus) {
        *self.account.lock() = Some(status);
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_transfer(&self, request: &TransferRequest) -> pf_gateway::Result<Transfer> {
        self.requests.lock().push(request.clone());
        let step = self.script.lock().pop_front().unwrap_or(Scripted::Succeed);

        match step {
            Scripted::Succeed => {}
            Scripted::SucceedAfter(delay) => tokio::time::sleep(delay).await,
            Scripted::Reject(message) => {
                return Err(GatewayError::Rejected {
                    status: 400,
                    code: Some("invalid_request".to_string()),
                    message,
                })
            }
            Scripted::Unavailable => {
                return Err(GatewayError::Unavailable {
                    status: 503,
                    message: "service unavailable".to_string(),
                })
            }
            Scripted::Hang => futures::future::pending::<()>().await,
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Transfer {
            id: format!("tr_mock_{}", n),
            amount: request.amount,
            destination: request.destination.clone(),
            created: Utc::now().timestamp(),
            currency: Some(request.currency.clone()),
        })
    }

    async fn retrieve_account(&self, account_ref: &str) -> pf_gateway::Result<AccountStatus> {
        self.account.lock().clone().ok_or_else(|| GatewayError::Rejected {
            status: 404,
            code: Some("resource_missing".to_string()),
            message: format!("No such account: {}", account_ref),
        })
    }
}

/// In-memory ledger whose `disbursed_totals` sleeps before answering, so
/// concurrent payouts for one recipient overlap between the balance check
/// and the payout insert unless something serializes them.
pub struct SlowBalanceLedger {
    inner: Arc<MemoryLedger>,
    delay: Duration,
}

impl SlowBalanceLedger {
    pub fn new(inner: Arc<MemoryLedger>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl LedgerStore for SlowBalanceLedger {
    async fn insert_recipient(&self, recipient: &Recipient) -> pf_ledger::Result<()> {
        self.inner.insert_recipient(recipient).await
    }
    async fn get_recipient(&self, id: &str) -> pf_ledger::Result<Option<Recipient>> {
        self.inner.get_recipient(id).await
    }
    async fn find_recipient_by_account(&self, account_ref: &str) -> pf_ledger::Result<Option<Recipient>> {
        self.inner.find_recipient_by_account(account_ref).await
    }
    async fn apply_account_status(
        &self,
        account_ref: &str,
        status: &AccountStatus,
    ) -> pf_ledger::Result<Option<Recipient>> {
        self.inner.apply_account_status(account_ref, status).await
    }
    async fn insert_product(&self, product: &Product) -> pf_ledger::Result<()> {
        self.inner.insert_product(product).await
    }
    async fn find_product_by_price(&self, external_price_id: &str) -> pf_ledger::Result<Option<Product>> {
        self.inner.find_product_by_price(external_price_id).await
    }
    async fn get_subscription(&self, id: &str) -> pf_ledger::Result<Option<Subscription>> {
        self.inner.get_subscription(id).await
    }
    async fn get_subscription_by_external_id(&self, external_id: &str) -> pf_ledger::Result<Option<Subscription>> {
        self.inner.get_subscription_by_external_id(external_id).await
    }
    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> pf_ledger::Result<Option<Subscription>> {
        self.inner.upsert_subscription(upsert).await
    }
    async fn set_subscription_status(&self, external_id: &str, status: &SubscriptionStatus) -> pf_ledger::Result<bool> {
        self.inner.set_subscription_status(external_id, status).await
    }
    async fn insert_attribution(&self, attribution: &Attribution) -> pf_ledger::Result<()> {
        self.inner.insert_attribution(attribution).await
    }
    async fn attributed_subscriptions(
        &self,
        recipient_id: Option<&str>,
        status: Option<&SubscriptionStatus>,
    ) -> pf_ledger::Result<Vec<AttributedSubscription>> {
        self.inner.attributed_subscriptions(recipient_id, status).await
    }
    async fn insert_payout(&self, payout: &Payout) -> pf_ledger::Result<()> {
        self.inner.insert_payout(payout).await
    }
    async fn get_payout(&self, id: &str) -> pf_ledger::Result<Option<Payout>> {
        self.inner.get_payout(id).await
    }
    async fn find_payout_by_transfer(&self, transfer_id: &str) -> pf_ledger::Result<Option<Payout>> {
        self.inner.find_payout_by_transfer(transfer_id).await
    }
    async fn disbursed_totals(&self, recipient_id: Option<&str>) -> pf_ledger::Result<HashMap<String, i64>> {
        let totals = self.inner.disbursed_totals(recipient_id).await?;
        tokio::time::sleep(self.delay).await;
        Ok(totals)
    }
    async fn transition_payout(&self, transition: &PayoutTransition) -> pf_ledger::Result<bool> {
        self.inner.transition_payout(transition).await
    }
    async fn attach_transfer_id(&self, payout_id: &str, transfer_id: &str) -> pf_ledger::Result<bool> {
        self.inner.attach_transfer_id(payout_id, transfer_id).await
    }
    async fn latest_unlinked_pending(&self, recipient_id: &str) -> pf_ledger::Result<Option<Payout>> {
        self.inner.latest_unlinked_pending(recipient_id).await
    }
    async fn update_bank_payout(&self, update: &BankPayoutUpdate) -> pf_ledger::Result<bool> {
        self.inner.update_bank_payout(update).await
    }
    async fn list_payouts(&self, recipient_id: Option<&str>) -> pf_ledger::Result<Vec<Payout>> {
        self.inner.list_payouts(recipient_id).await
    }
    async fn stale_pending_payouts(&self, older_than: DateTime<Utc>) -> pf_ledger::Result<Vec<Payout>> {
        self.inner.stale_pending_payouts(older_than).await
    }
    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> pf_ledger::Result<bool> {
        self.inner.mark_event_processed(event_id, event_type).await
    }
    async fn is_event_processed(&self, event_id: &str) -> pf_ledger::Result<bool> {
        self.inner.is_event_processed(event_id).await
    }
    async fn insert_audit(&self, entry: &AuditEntry) -> pf_ledger::Result<()> {
        self.inner.insert_audit(entry).await
    }
    async fn list_audit(&self, entity_id: Option<&str>, limit: u32) -> pf_ledger::Result<Vec<AuditEntry>> {
        self.inner.list_audit(entity_id, limit).await
    }
}

/// Every service wired to one in-memory ledger and a mock gateway.
pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<MockGateway>,
    pub audit: Arc<AuditService>,
    pub aggregator: Arc<EarningsAggregator>,
    pub executor: Arc<PayoutExecutor>,
    pub reconciler: Arc<EventReconciler>,
    pub attributions: Arc<AttributionService>,
    pub products: Arc<ProductService>,
    pub recipients: Arc<RecipientService>,
    pub history: Arc<PayoutHistoryService>,
    pub verifier: WebhookVerifier,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let store: Arc<dyn LedgerStore> = ledger.clone();
        Self::build(ledger, store, config)
    }

    /// Services read balances through a `SlowBalanceLedger`.
    pub fn with_slow_balance(delay: Duration) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let store: Arc<dyn LedgerStore> = Arc::new(SlowBalanceLedger::new(ledger.clone(), delay));
        Self::build(ledger, store, ExecutorConfig::default())
    }

    fn build(ledger: Arc<MemoryLedger>, store: Arc<dyn LedgerStore>, config: ExecutorConfig) -> Self {
        let gateway = Arc::new(MockGateway::new());
        let audit = Arc::new(AuditService::new(store.clone()));
        let aggregator = Arc::new(EarningsAggregator::new(store.clone()));
        let executor = Arc::new(PayoutExecutor::new(
            store.clone(),
            gateway.clone(),
            aggregator.clone(),
            audit.clone(),
            config,
        ));
        let verifier = WebhookVerifier::new(WEBHOOK_SECRET, Duration::from_secs(300));
        let reconciler = Arc::new(EventReconciler::new(store.clone(), audit.clone(), verifier.clone()));
        let attributions = Arc::new(AttributionService::new(store.clone(), audit.clone()));
        let products = Arc::new(ProductService::new(store.clone(), audit.clone()));
        let recipients = Arc::new(RecipientService::new(store.clone(), gateway.clone(), audit.clone()));
        let history = Arc::new(PayoutHistoryService::new(store, Duration::from_secs(86_400)));

        Self {
            ledger,
            gateway,
            audit,
            aggregator,
            executor,
            reconciler,
            attributions,
            products,
            recipients,
            history,
            verifier,
        }
    }

    /// A fully onboarded recipient with payouts enabled.
    pub async fn eligible_recipient(&self, account_ref: &str) -> Recipient {
        let mut recipient = Recipient::new(format!("{}@example.com", account_ref)).with_account_ref(account_ref);
        recipient.apply_account_status(&AccountStatus {
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
            requirements_due: vec![],
        });
        self.ledger.insert_recipient(&recipient).await.unwrap();
        recipient
    }

    /// An active subscription attributed to `recipient_id`.
    pub async fn attributed_subscription(&self, recipient_id: &str, amount: i64, percentage: Option<i32>) -> Subscription {
        let subscription = subscription(recipient_id, amount, SubscriptionStatus::Active);
        self.ledger.seed_subscription(subscription.clone());
        self.ledger
            .insert_attribution(&Attribution::new(&subscription.id, recipient_id, percentage))
            .await
            .unwrap();
        subscription
    }

    /// Sign `payload` the way the gateway would, at the current time.
    pub fn signature(&self, payload: &str) -> String {
        self.verifier
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .unwrap()
    }
}

pub fn subscription(recipient_id: &str, amount: i64, status: SubscriptionStatus) -> Subscription {
    let id = pf_common::generate_id();
    Subscription {
        external_id: format!("sub_{}", &id[..8]),
        id,
        recipient_id: recipient_id.to_string(),
        product_id: None,
        customer_ref: Some("cus_test".to_string()),
        amount,
        currency: "usd".to_string(),
        status,
        current_period_start: None,
        current_period_end: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Raw event envelope as delivered to the webhook endpoint.
pub fn event_json(id: &str, event_type: &str, object: serde_json::Value, account: Option<&str>) -> String {
    let mut envelope = serde_json::json!({
        "id": id,
        "type": event_type,
        "data": { "object": object },
    });
    if let Some(account) = account {
        envelope["account"] = serde_json::json!(account);
    }
    envelope.to_string()
}
