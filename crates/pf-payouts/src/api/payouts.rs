//! Payouts API
//!
//! Execute payouts, calculate earnings, and list payout history.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use pf_common::{Payout, PayoutStatus, RevenueSplit};
use pf_gateway::Transfer;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::common::ApiError;
use crate::error::PayoutError;
use crate::service::{
    EarningsAggregator, EarningsSummary, PayoutExecutor, PayoutHistory, PayoutHistoryService,
    PayoutReceipt, PayoutRequest, PayoutSummary, RecipientEarnings, SubscriptionEarning,
};

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePayoutRequest {
    pub recipient_id: String,
    /// Minor units
    pub amount: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub id: String,
    pub amount: i64,
    pub destination: String,
    /// Unix seconds
    pub created: i64,
}

impl From<Transfer> for TransferResponse {
    fn from(t: Transfer) -> Self {
        Self {
            id: t.id,
            amount: t.amount,
            destination: t.destination,
            created: t.created,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResponse {
    pub id: String,
    pub recipient_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub period_start: String,
    pub period_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_payout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_payout_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payout> for PayoutResponse {
    fn from(p: Payout) -> Self {
        Self {
            id: p.id,
            recipient_id: p.recipient_id,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            period_start: p.period_start.to_string(),
            period_end: p.period_end.to_string(),
            description: p.description,
            external_transfer_id: p.external_transfer_id,
            bank_payout_id: p.bank_payout_id,
            bank_payout_status: p.bank_payout_status.map(|s| s.as_str().to_string()),
            failure_message: p.failure_message,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePayoutResponse {
    pub success: bool,
    pub transfer: TransferResponse,
    pub payout: PayoutResponse,
}

impl From<PayoutReceipt> for ExecutePayoutResponse {
    fn from(receipt: PayoutReceipt) -> Self {
        Self {
            success: true,
            transfer: receipt.transfer.into(),
            payout: receipt.payout.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEarningResponse {
    pub subscription_id: String,
    pub external_subscription_id: String,
    pub currency: String,
    #[serde(flatten)]
    pub split: RevenueSplit,
}

impl From<SubscriptionEarning> for SubscriptionEarningResponse {
    fn from(e: SubscriptionEarning) -> Self {
        Self {
            subscription_id: e.subscription_id,
            external_subscription_id: e.external_subscription_id,
            currency: e.currency,
            split: e.split,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub recipient_id: String,
    pub total_earnings: i64,
    pub subscription_count: usize,
    pub total_disbursed: i64,
    /// Clamped at zero
    pub unpaid_earnings: i64,
    /// Unclamped; negative when payouts exceeded earnings
    pub raw_unpaid_earnings: i64,
    pub subscriptions: Vec<SubscriptionEarningResponse>,
}

impl From<RecipientEarnings> for EarningsResponse {
    fn from(e: RecipientEarnings) -> Self {
        Self {
            unpaid_earnings: e.displayed_unpaid(),
            raw_unpaid_earnings: e.unpaid_earnings,
            recipient_id: e.recipient_id,
            total_earnings: e.total_earnings,
            subscription_count: e.subscription_count,
            total_disbursed: e.total_disbursed,
            subscriptions: e.subscriptions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummaryResponse {
    pub recipients: Vec<EarningsResponse>,
    pub total_earnings: i64,
    pub total_unpaid: i64,
    pub recipient_count: usize,
}

impl From<EarningsSummary> for EarningsSummaryResponse {
    fn from(s: EarningsSummary) -> Self {
        Self {
            recipients: s.recipients.into_iter().map(Into::into).collect(),
            total_earnings: s.total_earnings,
            total_unpaid: s.total_unpaid,
            recipient_count: s.recipient_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSummaryResponse {
    pub total_payouts: usize,
    pub total_amount: i64,
    pub completed: usize,
    pub pending: usize,
    pub failed: usize,
}

impl From<PayoutSummary> for PayoutSummaryResponse {
    fn from(s: PayoutSummary) -> Self {
        Self {
            total_payouts: s.total_payouts,
            total_amount: s.total_amount,
            completed: s.completed,
            pending: s.pending,
            failed: s.failed,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutHistoryResponse {
    pub payouts: Vec<PayoutResponse>,
    pub summary: PayoutSummaryResponse,
}

impl From<PayoutHistory> for PayoutHistoryResponse {
    fn from(h: PayoutHistory) -> Self {
        Self {
            payouts: h.payouts.into_iter().map(Into::into).collect(),
            summary: h.summary.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Restrict to one recipient
    pub recipient_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Clone)]
pub struct PayoutsState {
    pub executor: Arc<PayoutExecutor>,
    pub aggregator: Arc<EarningsAggregator>,
    pub history: Arc<PayoutHistoryService>,
}

/// Execute a payout to a recipient
#[utoipa::path(
    post,
    path = "/api/payouts/execute",
    tag = "payouts",
    request_body = ExecutePayoutRequest,
    responses(
        (status = 200, description = "Transfer created", body = ExecutePayoutResponse),
        (status = 400, description = "Invalid amount, ineligible recipient or rejected transfer", body = ApiError),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 503, description = "Transfer outcome unknown; payout left pending", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn execute_payout(
    State(state): State<PayoutsState>,
    Json(req): Json<ExecutePayoutRequest>,
) -> Result<Json<ExecutePayoutResponse>, PayoutError> {
    if req.recipient_id.trim().is_empty() {
        return Err(PayoutError::validation("recipientId is required"));
    }

    let receipt = state
        .executor
        .execute(PayoutRequest {
            recipient_id: req.recipient_id,
            amount: req.amount,
            description: req.description,
        })
        .await?;

    Ok(Json(receipt.into()))
}

/// Earnings and unpaid balances for all recipients
#[utoipa::path(
    get,
    path = "/api/payouts/calculate",
    tag = "payouts",
    responses(
        (status = 200, description = "Earnings summary", body = EarningsSummaryResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn calculate_all(
    State(state): State<PayoutsState>,
) -> Result<Json<EarningsSummaryResponse>, PayoutError> {
    let summary = state.aggregator.summary().await?;
    Ok(Json(summary.into()))
}

/// Earnings and unpaid balance for one recipient
#[utoipa::path(
    get,
    path = "/api/payouts/calculate/{recipient_id}",
    tag = "payouts",
    params(
        ("recipient_id" = String, Path, description = "Recipient ID")
    ),
    responses(
        (status = 200, description = "Recipient earnings", body = EarningsResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn calculate_recipient(
    State(state): State<PayoutsState>,
    Path(recipient_id): Path<String>,
) -> Result<Json<EarningsResponse>, PayoutError> {
    let earnings = state.aggregator.recipient_earnings(&recipient_id).await?;
    Ok(Json(earnings.into()))
}

/// Payout history, newest first
#[utoipa::path(
    get,
    path = "/api/payouts/history",
    tag = "payouts",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Payout history", body = PayoutHistoryResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn payout_history(
    State(state): State<PayoutsState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PayoutHistoryResponse>, PayoutError> {
    let history = state.history.history(query.recipient_id.as_deref()).await?;
    Ok(Json(history.into()))
}

/// Pending payouts older than the stale threshold
#[utoipa::path(
    get,
    path = "/api/payouts/stale",
    tag = "payouts",
    responses(
        (status = 200, description = "Stale pending payouts", body = Vec<PayoutResponse>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn stale_payouts(
    State(state): State<PayoutsState>,
) -> Result<Json<Vec<PayoutResponse>>, PayoutError> {
    let payouts = state.history.stale_pending().await?;
    Ok(Json(payouts.into_iter().map(Into::into).collect()))
}

pub fn payouts_router(state: PayoutsState) -> Router {
    Router::new()
        .route("/execute", post(execute_payout))
        .route("/calculate", get(calculate_all))
        .route("/calculate/:recipient_id", get(calculate_recipient))
        .route("/history", get(payout_history))
        .route("/stale", get(stale_payouts))
        .with_state(state)
}
