//! Common API types and utilities

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::error::PayoutError;

/// Standard API error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            retryable: false,
            details: None,
        }
    }
}

impl PayoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAmount { .. }
            | Self::NotOnboarded { .. }
            | Self::NotEligible { .. }
            | Self::ExceedsUnpaidBalance { .. }
            | Self::TransferFailed { .. }
            | Self::Webhook(_)
            | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::RecipientNotFound { .. } | Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Duplicate { .. } => StatusCode::CONFLICT,
            Self::TransferPending { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Ledger(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PayoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let details = match &self {
            Self::ExceedsUnpaidBalance { requested, available } => Some(serde_json::json!({
                "requested": requested,
                "available": available,
            })),
            Self::TransferFailed { payout_id, .. } | Self::TransferPending { payout_id, .. } => {
                Some(serde_json::json!({ "payoutId": payout_id }))
            }
            _ => None,
        };

        let body = ApiError {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
            retryable: self.is_retryable(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_gateway::GatewayError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PayoutError::NotOnboarded { id: "r".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PayoutError::RecipientNotFound { id: "r".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PayoutError::TransferFailed {
                payout_id: "p".into(),
                message: "no".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PayoutError::Gateway(GatewayError::Timeout("slow".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(PayoutError::Gateway(GatewayError::Timeout("slow".into())).is_retryable());
    }
}
