//! API Middleware
//!
//! Bearer token check for operator endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::api::common::ApiError;

/// Token required on operator routes. `None` disables the check.
#[derive(Clone, Default)]
pub struct OperatorToken(pub Option<Arc<str>>);

impl OperatorToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()).map(Arc::from))
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.0, presented) {
            (None, _) => true,
            (Some(expected), Some(given)) => expected.as_bytes().ct_eq(given.as_bytes()).into(),
            (Some(_), None) => false,
        }
    }
}

fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
}

fn unauthorized(message: &str) -> Response {
    let error = ApiError::new("UNAUTHORIZED", message);
    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

pub async fn require_operator(State(token): State<OperatorToken>, request: Request, next: Next) -> Response {
    if token.0.is_none() {
        return next.run(request).await;
    }

    let Some(header) = request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return unauthorized("Missing Authorization header");
    };
    let Some(presented) = extract_bearer_token(header) else {
        return unauthorized("Invalid Authorization header format");
    };
    if !token.accepts(Some(presented)) {
        return unauthorized("Invalid API token");
    }

    next.run(request).await
}
