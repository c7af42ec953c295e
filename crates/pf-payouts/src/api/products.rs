//! Products API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use pf_common::Product;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::common::ApiError;
use crate::error::PayoutError;
use crate::service::{NewProduct, ProductService};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub recipient_id: String,
    pub name: String,
    /// Minor units
    pub price_amount: i64,
    pub currency: String,
    /// `month`, `year`, ...
    pub interval: String,
    pub external_price_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub recipient_id: String,
    pub name: String,
    pub price_amount: i64,
    pub currency: String,
    pub interval: String,
    pub external_price_id: Option<String>,
    pub active: bool,
    pub created_at: String,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            recipient_id: p.recipient_id,
            name: p.name,
            price_amount: p.price_amount,
            currency: p.currency,
            interval: p.interval,
            external_price_id: p.external_price_id,
            active: p.active,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ProductsState {
    pub products: Arc<ProductService>,
}

/// Register a product sold by a recipient
#[utoipa::path(
    post,
    path = "/api/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid product", body = ApiError),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 409, description = "Price id already registered", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_product(
    State(state): State<ProductsState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), PayoutError> {
    let product = state
        .products
        .create(NewProduct {
            recipient_id: req.recipient_id,
            name: req.name,
            price_amount: req.price_amount,
            currency: req.currency,
            interval: req.interval,
            external_price_id: req.external_price_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub fn products_router(state: ProductsState) -> Router {
    Router::new()
        .route("/", post(create_product))
        .with_state(state)
}
