//! Recipients API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pf_common::Recipient;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::ApiError;
use crate::error::PayoutError;
use crate::service::{NewRecipient, RecipientService};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRecipientRequest {
    pub email: String,
    pub name: Option<String>,
    /// Connected account id at the payment gateway
    pub external_account_ref: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipientResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub external_account_ref: Option<String>,
    pub onboarding_complete: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub requirements_due: Vec<String>,
    pub payout_eligible: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Recipient> for RecipientResponse {
    fn from(r: Recipient) -> Self {
        Self {
            payout_eligible: r.is_payout_eligible(),
            id: r.id,
            email: r.email,
            name: r.name,
            external_account_ref: r.external_account_ref,
            onboarding_complete: r.onboarding_complete,
            charges_enabled: r.charges_enabled,
            payouts_enabled: r.payouts_enabled,
            details_submitted: r.details_submitted,
            requirements_due: r.requirements_due,
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct RecipientsState {
    pub recipients: Arc<RecipientService>,
}

/// Register a payout recipient
#[utoipa::path(
    post,
    path = "/api/recipients",
    tag = "recipients",
    request_body = RegisterRecipientRequest,
    responses(
        (status = 201, description = "Recipient registered", body = RecipientResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Connected account already registered", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_recipient(
    State(state): State<RecipientsState>,
    Json(req): Json<RegisterRecipientRequest>,
) -> Result<(StatusCode, Json<RecipientResponse>), PayoutError> {
    let recipient = state
        .recipients
        .register(NewRecipient {
            email: req.email,
            name: req.name,
            external_account_ref: req.external_account_ref,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(recipient.into())))
}

/// Get recipient with account status
#[utoipa::path(
    get,
    path = "/api/recipients/{id}",
    tag = "recipients",
    params(
        ("id" = String, Path, description = "Recipient ID")
    ),
    responses(
        (status = 200, description = "Recipient found", body = RecipientResponse),
        (status = 404, description = "Recipient not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_recipient(
    State(state): State<RecipientsState>,
    Path(id): Path<String>,
) -> Result<Json<RecipientResponse>, PayoutError> {
    let recipient = state.recipients.get(&id).await?;
    Ok(Json(recipient.into()))
}

/// Pull the recipient's account status from the gateway
#[utoipa::path(
    post,
    path = "/api/recipients/{id}/refresh",
    tag = "recipients",
    params(
        ("id" = String, Path, description = "Recipient ID")
    ),
    responses(
        (status = 200, description = "Account status refreshed", body = RecipientResponse),
        (status = 400, description = "Recipient has no connected account", body = ApiError),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 503, description = "Gateway unavailable", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_recipient(
    State(state): State<RecipientsState>,
    Path(id): Path<String>,
) -> Result<Json<RecipientResponse>, PayoutError> {
    let recipient = state.recipients.refresh_account_status(&id).await?;
    Ok(Json(recipient.into()))
}

pub fn recipients_router(state: RecipientsState) -> Router {
    Router::new()
        .route("/", post(register_recipient))
        .route("/:id", get(get_recipient))
        .route("/:id/refresh", post(refresh_recipient))
        .with_state(state)
}
