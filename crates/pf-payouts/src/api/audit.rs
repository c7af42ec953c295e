//! Audit trail API

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use pf_common::AuditEntry;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::PayoutError;
use crate::service::AuditService;

const MAX_LIMIT: u32 = 500;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryResponse {
    pub id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(e: AuditEntry) -> Self {
        Self {
            id: e.id,
            action: e.action.as_str().to_string(),
            entity_type: e.entity_type,
            entity_id: e.entity_id,
            description: e.description,
            details: e.details,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Filter by entity ID
    pub entity_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 { 50 }

#[derive(Clone)]
pub struct AuditState {
    pub audit: Arc<AuditService>,
}

/// List audit entries, newest first
#[utoipa::path(
    get,
    path = "/api/audit",
    tag = "audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries", body = Vec<AuditEntryResponse>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_audit(
    State(state): State<AuditState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntryResponse>>, PayoutError> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let entries = state.audit.list(query.entity_id.as_deref(), limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

pub fn audit_router(state: AuditState) -> Router {
    Router::new()
        .route("/", get(list_audit))
        .with_state(state)
}
