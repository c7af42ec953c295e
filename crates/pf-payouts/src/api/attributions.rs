//! Attributions API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use pf_common::Attribution;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::ApiError;
use crate::error::PayoutError;
use crate::service::AttributionService;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttributionRequest {
    pub subscription_id: String,
    pub recipient_id: String,
    /// 0-100; omitted means the default share
    pub percentage: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttributionResponse {
    pub id: String,
    pub subscription_id: String,
    pub recipient_id: String,
    pub percentage: Option<i32>,
    /// Percentage used in earnings calculations
    pub effective_percentage: i32,
    pub created_at: String,
}

impl From<Attribution> for AttributionResponse {
    fn from(a: Attribution) -> Self {
        Self {
            effective_percentage: a.effective_percentage(),
            id: a.id,
            subscription_id: a.subscription_id,
            recipient_id: a.recipient_id,
            percentage: a.percentage,
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct AttributionsState {
    pub attributions: Arc<AttributionService>,
}

/// Attribute a subscription to a recipient
#[utoipa::path(
    post,
    path = "/api/attributions",
    tag = "attributions",
    request_body = CreateAttributionRequest,
    responses(
        (status = 201, description = "Attribution created", body = AttributionResponse),
        (status = 400, description = "Percentage out of range", body = ApiError),
        (status = 404, description = "Subscription or recipient not found", body = ApiError),
        (status = 409, description = "Subscription already attributed to this recipient", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_attribution(
    State(state): State<AttributionsState>,
    Json(req): Json<CreateAttributionRequest>,
) -> Result<(StatusCode, Json<AttributionResponse>), PayoutError> {
    let attribution = state
        .attributions
        .create(&req.subscription_id, &req.recipient_id, req.percentage)
        .await?;
    Ok((StatusCode::CREATED, Json(attribution.into())))
}

pub fn attributions_router(state: AttributionsState) -> Router {
    Router::new()
        .route("/", post(create_attribution))
        .with_state(state)
}
