//! Gateway webhook endpoint
//!
//! Unauthenticated; trust comes from the signature header alone. The raw
//! body is passed through untouched since the signature covers its bytes.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, routing::post, Json, Router};
use pf_gateway::SIGNATURE_HEADER;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::common::ApiError;
use crate::error::PayoutError;
use crate::service::EventReconciler;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// applied, no_change, conflict, unmatched, ignored or duplicate
    pub outcome: String,
}

#[derive(Clone)]
pub struct WebhooksState {
    pub reconciler: Arc<EventReconciler>,
}

/// Receive a signed gateway event
#[utoipa::path(
    post,
    path = "/api/webhooks/gateway",
    tag = "webhooks",
    request_body(content = String, description = "Raw signed event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Signature or payload rejected", body = ApiError),
        (status = 500, description = "Ledger failure; the gateway will redeliver", body = ApiError)
    )
)]
pub async fn receive_gateway_event(
    State(state): State<WebhooksState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, PayoutError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = state.reconciler.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.as_str().to_string(),
    }))
}

pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        .route("/gateway", post(receive_gateway_event))
        .with_state(state)
}
