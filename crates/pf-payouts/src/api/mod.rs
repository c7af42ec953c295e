//! API Layer
//!
//! REST endpoints for operators plus the gateway webhook receiver.

pub mod attributions;
pub mod audit;
pub mod common;
pub mod middleware;
pub mod openapi;
pub mod payouts;
pub mod products;
pub mod recipients;
pub mod webhooks;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};

use crate::service::{
    AttributionService, AuditService, EarningsAggregator, EventReconciler, PayoutExecutor,
    PayoutHistoryService, ProductService, RecipientService,
};

pub use attributions::{attributions_router, AttributionsState};
pub use audit::{audit_router, AuditState};
pub use common::ApiError;
pub use middleware::{require_operator, OperatorToken};
pub use openapi::PayoutApiDoc;
pub use payouts::{payouts_router, PayoutsState};
pub use products::{products_router, ProductsState};
pub use recipients::{recipients_router, RecipientsState};
pub use webhooks::{webhooks_router, WebhooksState};

/// Services behind the HTTP API.
#[derive(Clone)]
pub struct ApiServices {
    pub executor: Arc<PayoutExecutor>,
    pub aggregator: Arc<EarningsAggregator>,
    pub history: Arc<PayoutHistoryService>,
    pub reconciler: Arc<EventReconciler>,
    pub attributions: Arc<AttributionService>,
    pub products: Arc<ProductService>,
    pub recipients: Arc<RecipientService>,
    pub audit: Arc<AuditService>,
}

/// Assemble all routes. Operator routes sit behind the bearer token check;
/// the webhook and health routes do not.
pub fn create_router(services: ApiServices, token: OperatorToken) -> Router {
    let operator = Router::new()
        .nest(
            "/api/payouts",
            payouts_router(PayoutsState {
                executor: services.executor,
                aggregator: services.aggregator,
                history: services.history,
            }),
        )
        .nest(
            "/api/attributions",
            attributions_router(AttributionsState {
                attributions: services.attributions,
            }),
        )
        .nest(
            "/api/products",
            products_router(ProductsState {
                products: services.products,
            }),
        )
        .nest(
            "/api/recipients",
            recipients_router(RecipientsState {
                recipients: services.recipients,
            }),
        )
        .nest("/api/audit", audit_router(AuditState { audit: services.audit }))
        .route_layer(from_fn_with_state(token, require_operator));

    Router::new()
        .merge(operator)
        .nest(
            "/api/webhooks",
            webhooks_router(WebhooksState {
                reconciler: services.reconciler,
            }),
        )
        .route("/health", get(health_handler))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
