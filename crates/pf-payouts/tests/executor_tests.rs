//! Payout Executor Tests
//!
//! Tests for:
//! - Successful execution and the resulting unpaid balance
//! - Eligibility and amount validation
//! - Unknown outcomes (timeout, unavailable) leaving payouts pending
//! - Permanent rejections
//! - Concurrent requests for the same and for different recipients

mod common;

use std::time::Duration;

use common::{Harness, Scripted};
use pf_common::{AccountStatus, PayoutStatus, Recipient};
use pf_gateway::{METADATA_PAYOUT_RECORD_ID, METADATA_RECIPIENT_ID, METADATA_TYPE};
use pf_ledger::LedgerStore;
use pf_payouts::{ExecutorConfig, PayoutError, PayoutRequest};
use tokio_test::{assert_err, assert_ok};

fn request(recipient_id: &str, amount: i64) -> PayoutRequest {
    PayoutRequest {
        recipient_id: recipient_id.to_string(),
        amount,
        description: None,
    }
}

fn short_timeout() -> ExecutorConfig {
    ExecutorConfig {
        transfer_timeout: Duration::from_millis(100),
        ..ExecutorConfig::default()
    }
}

// ============================================================================
// Success Path
// ============================================================================

#[tokio::test]
async fn test_full_unpaid_balance_paid_out() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_1").await;
    h.attributed_subscription(&recipient.id, 9999, None).await;

    let before = h.aggregator.recipient_earnings(&recipient.id).await.unwrap();
    assert_eq!(before.total_earnings, 6999);
    assert_eq!(before.unpaid_earnings, 6999);

    let receipt = assert_ok!(h.executor.execute(request(&recipient.id, 6999)).await);
    assert_eq!(receipt.transfer.amount, 6999);
    assert_eq!(receipt.transfer.destination, "acct_1");
    assert_eq!(receipt.payout.status, PayoutStatus::Completed);
    assert_eq!(receipt.payout.external_transfer_id.as_deref(), Some(receipt.transfer.id.as_str()));

    let stored = h.ledger.get_payout(&receipt.payout.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PayoutStatus::Completed);
    assert_eq!(stored.external_transfer_id, Some(receipt.transfer.id.clone()));

    let after = h.aggregator.recipient_earnings(&recipient.id).await.unwrap();
    assert_eq!(after.total_disbursed, 6999);
    assert_eq!(after.unpaid_earnings, 0);
}

#[tokio::test]
async fn test_transfer_carries_metadata_and_idempotency_key() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_meta").await;
    h.attributed_subscription(&recipient.id, 10_000, Some(50)).await;

    let receipt = h.executor.execute(request(&recipient.id, 1000)).await.unwrap();

    let requests = h.gateway.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.idempotency_key.as_deref(), Some(receipt.payout.id.as_str()));
    assert_eq!(sent.metadata.get(METADATA_RECIPIENT_ID), Some(&recipient.id));
    assert_eq!(sent.metadata.get(METADATA_PAYOUT_RECORD_ID), Some(&receipt.payout.id));
    assert_eq!(sent.metadata.get(METADATA_TYPE).map(String::as_str), Some("recipient_payout"));
    assert_eq!(sent.description.as_deref(), Some("Payout to acct_meta@example.com"));
}

#[tokio::test]
async fn test_custom_description_used() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_desc").await;
    h.attributed_subscription(&recipient.id, 10_000, None).await;

    let receipt = h
        .executor
        .execute(PayoutRequest {
            recipient_id: recipient.id.clone(),
            amount: 500,
            description: Some("March revenue share".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(receipt.payout.description.as_deref(), Some("March revenue share"));
}

// ============================================================================
// Validation and Eligibility
// ============================================================================

#[tokio::test]
async fn test_amount_limits() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_amt").await;

    let err = assert_err!(h.executor.execute(request(&recipient.id, 0)).await);
    assert!(matches!(err, PayoutError::InvalidAmount { .. }));

    let err = assert_err!(h.executor.execute(request(&recipient.id, -5)).await);
    assert!(matches!(err, PayoutError::InvalidAmount { .. }));

    let err = assert_err!(h.executor.execute(request(&recipient.id, 100_000_001)).await);
    assert!(matches!(err, PayoutError::InvalidAmount { .. }));

    assert_eq!(h.ledger.payout_count(), 0);
    assert_eq!(h.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_unknown_recipient() {
    let h = Harness::new();
    let err = assert_err!(h.executor.execute(request("missing", 100)).await);
    assert!(matches!(err, PayoutError::RecipientNotFound { .. }));
}

#[tokio::test]
async fn test_recipient_without_account_not_onboarded() {
    let h = Harness::new();
    let recipient = Recipient::new("new@example.com");
    h.ledger.insert_recipient(&recipient).await.unwrap();

    let err = assert_err!(h.executor.execute(request(&recipient.id, 100)).await);
    assert!(matches!(err, PayoutError::NotOnboarded { .. }));
    assert_eq!(h.ledger.payout_count(), 0);
    assert_eq!(h.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_payouts_disabled_blocks_execution() {
    let h = Harness::new();
    let mut recipient = Recipient::new("half@example.com").with_account_ref("acct_half");
    recipient.apply_account_status(&AccountStatus {
        charges_enabled: true,
        payouts_enabled: false,
        details_submitted: true,
        requirements_due: vec!["external_account".to_string()],
    });
    h.ledger.insert_recipient(&recipient).await.unwrap();
    h.attributed_subscription(&recipient.id, 10_000, None).await;

    let err = assert_err!(h.executor.execute(request(&recipient.id, 100)).await);
    assert!(matches!(err, PayoutError::NotEligible { .. }));
    assert_eq!(h.ledger.payout_count(), 0);
    assert_eq!(h.gateway.request_count(), 0);
}

#[tokio::test]
async fn test_amount_above_unpaid_balance_rejected() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_cap").await;
    h.attributed_subscription(&recipient.id, 9999, None).await;

    let err = assert_err!(h.executor.execute(request(&recipient.id, 7000)).await);
    match err {
        PayoutError::ExceedsUnpaidBalance { requested, available } => {
            assert_eq!(requested, 7000);
            assert_eq!(available, 6999);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.ledger.payout_count(), 0);
}

#[tokio::test]
async fn test_balance_check_can_be_disabled() {
    let h = Harness::with_config(ExecutorConfig {
        enforce_unpaid_balance: false,
        ..ExecutorConfig::default()
    });
    let recipient = h.eligible_recipient("acct_free").await;

    assert_ok!(h.executor.execute(request(&recipient.id, 5000)).await);

    let earnings = h.aggregator.recipient_earnings(&recipient.id).await.unwrap();
    assert_eq!(earnings.unpaid_earnings, -5000);
    assert_eq!(earnings.displayed_unpaid(), 0);
}

// ============================================================================
// Failure Outcomes
// ============================================================================

#[tokio::test]
async fn test_timeout_leaves_payout_pending() {
    let h = Harness::with_config(short_timeout());
    let recipient = h.eligible_recipient("acct_slow").await;
    h.attributed_subscription(&recipient.id, 10_000, Some(100)).await;
    h.gateway.push(Scripted::Hang);

    let err = assert_err!(h.executor.execute(request(&recipient.id, 4000)).await);
    let payout_id = match &err {
        PayoutError::TransferPending { payout_id, .. } => payout_id.clone(),
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(err.is_retryable());

    let stored = h.ledger.get_payout(&payout_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PayoutStatus::Pending);
    assert!(stored.external_transfer_id.is_none());

    // Pending payouts still count against the balance
    let earnings = h.aggregator.recipient_earnings(&recipient.id).await.unwrap();
    assert_eq!(earnings.unpaid_earnings, 6000);
}

#[tokio::test]
async fn test_unavailable_gateway_leaves_payout_pending() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_503").await;
    h.attributed_subscription(&recipient.id, 10_000, Some(100)).await;
    h.gateway.push(Scripted::Unavailable);

    let err = assert_err!(h.executor.execute(request(&recipient.id, 1000)).await);
    assert!(matches!(err, PayoutError::TransferPending { .. }));

    let history = h.history.history(Some(&recipient.id)).await.unwrap();
    assert_eq!(history.summary.pending, 1);
}

#[tokio::test]
async fn test_rejection_marks_payout_failed() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_rej").await;
    h.attributed_subscription(&recipient.id, 10_000, Some(100)).await;
    h.gateway.push(Scripted::Reject("Insufficient platform balance".to_string()));

    let err = assert_err!(h.executor.execute(request(&recipient.id, 1000)).await);
    let payout_id = match &err {
        PayoutError::TransferFailed { payout_id, message } => {
            assert_eq!(message, "Insufficient platform balance");
            payout_id.clone()
        }
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(!err.is_retryable());

    let stored = h.ledger.get_payout(&payout_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PayoutStatus::Failed);
    assert_eq!(stored.failure_message.as_deref(), Some("Insufficient platform balance"));

    // Failed payouts do not reduce the balance
    let earnings = h.aggregator.recipient_earnings(&recipient.id).await.unwrap();
    assert_eq!(earnings.unpaid_earnings, 10_000);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_cannot_overdraw() {
    // Both balance reads stall long enough to overlap unless execution is
    // serialized per recipient.
    let h = Harness::with_slow_balance(Duration::from_millis(50));
    let recipient = h.eligible_recipient("acct_race").await;
    h.attributed_subscription(&recipient.id, 9999, None).await;

    let first = tokio::spawn({
        let executor = h.executor.clone();
        let req = request(&recipient.id, 6999);
        async move { executor.execute(req).await }
    });
    let second = tokio::spawn({
        let executor = h.executor.clone();
        let req = request(&recipient.id, 6999);
        async move { executor.execute(req).await }
    });

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    let exceeded = outcomes
        .iter()
        .filter(|r| matches!(r, Err(PayoutError::ExceedsUnpaidBalance { .. })))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(exceeded, 1);
    assert_eq!(h.gateway.request_count(), 1);
    assert_eq!(h.ledger.payout_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_for_different_recipients_both_pay() {
    let h = Harness::with_slow_balance(Duration::from_millis(50));
    let alice = h.eligible_recipient("acct_alice").await;
    let bob = h.eligible_recipient("acct_bob").await;
    h.attributed_subscription(&alice.id, 5000, None).await;
    h.attributed_subscription(&bob.id, 5000, None).await;

    let first = tokio::spawn({
        let executor = h.executor.clone();
        let req = request(&alice.id, 3500);
        async move { executor.execute(req).await }
    });
    let second = tokio::spawn({
        let executor = h.executor.clone();
        let req = request(&bob.id, 3500);
        async move { executor.execute(req).await }
    });

    assert_ok!(first.await.unwrap());
    assert_ok!(second.await.unwrap());
    assert_eq!(h.gateway.request_count(), 2);
    assert_eq!(h.ledger.payout_count(), 2);
}

#[tokio::test]
async fn test_sequential_partial_payouts_until_exhausted() {
    let h = Harness::new();
    let recipient = h.eligible_recipient("acct_seq").await;
    h.attributed_subscription(&recipient.id, 3000, Some(100)).await;

    for _ in 0..3 {
        assert_ok!(h.executor.execute(request(&recipient.id, 1000)).await);
    }
    let err = assert_err!(h.executor.execute(request(&recipient.id, 1)).await);
    assert!(matches!(err, PayoutError::ExceedsUnpaidBalance { available: 0, .. }));

    let history = h.history.history(Some(&recipient.id)).await.unwrap();
    assert_eq!(history.summary.completed, 3);
    assert_eq!(history.summary.total_amount, 3000);
}
