//! Stripe-compatible HTTP gateway client
//!
//! Transfers are form-encoded `POST /v1/transfers` calls with the payout
//! record id as idempotency key. Failures are classified into transient
//! (timeout, transport, 429/5xx, unreadable success body) and permanent
//! (any other 4xx).

use std::time::Duration;

use async_trait::async_trait;
use pf_common::AccountStatus;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::event::AccountObject;
use crate::{GatewayError, PaymentGateway, Result, Transfer, TransferRequest};

#[derive(Debug, Clone)]
pub struct StripeGatewayConfig {
    pub api_base_url: String,
    pub secret_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for StripeGatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

pub struct StripeGateway {
    config: StripeGatewayConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(e.to_string())
                } else {
                    GatewayError::Decode(e.to_string())
                }
            });
        }

        let body = response.text().await.unwrap_or_default();
        let (message, code) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (
                envelope.error.message.unwrap_or_else(|| format!("HTTP {}", status)),
                envelope.error.code,
            ),
            Err(_) if body.is_empty() => (format!("HTTP {}", status), None),
            Err(_) => (body, None),
        };

        let status_code = status.as_u16();
        warn!(status = status_code, code = ?code, "Gateway request failed: {}", message);

        if status_code == 429 || status.is_server_error() {
            Err(GatewayError::Unavailable { status: status_code, message })
        } else {
            Err(GatewayError::Rejected { status: status_code, code, message })
        }
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("destination".to_string(), request.destination.clone()),
        ];
        if let Some(description) = &request.description {
            form.push(("description".to_string(), description.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let url = self.url("/v1/transfers");
        debug!(amount = request.amount, destination = %request.destination, "Creating transfer");

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&form);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key.as_str());
        }

        let response = builder.send().await.map_err(transport_error)?;
        Self::read_response::<Transfer>(response).await
    }

    async fn retrieve_account(&self, account_ref: &str) -> Result<AccountStatus> {
        let url = self.url(&format!("/v1/accounts/{}", account_ref));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(transport_error)?;
        let account = Self::read_response::<AccountObject>(response).await?;
        Ok(account.status())
    }
}
