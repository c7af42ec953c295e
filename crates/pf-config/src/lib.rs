//! PayoutFlow Configuration
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! TOML file named by `PF_CONFIG_FILE`, then `PF_*` environment overrides.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PF_CONFIG_FILE` | - | Path to a TOML config file |
//! | `PF_API_PORT` | `8080` | HTTP API port |
//! | `PF_METRICS_PORT` | `9090` | Metrics/health port |
//! | `PF_API_TOKEN` | - | Bearer token for operator endpoints |
//! | `PF_LEDGER_BACKEND` | `postgres` | `postgres` or `memory` |
//! | `PF_DATABASE_URL` | - | PostgreSQL connection URL |
//! | `PF_DATABASE_MAX_CONNECTIONS` | `10` | Pool size |
//! | `PF_GATEWAY_URL` | `https://api.stripe.com` | Gateway API base URL |
//! | `PF_GATEWAY_SECRET_KEY` | - | Gateway API secret key |
//! | `PF_WEBHOOK_SECRET` | - | Webhook signing secret |
//! | `PF_CURRENCY` | `usd` | Payout currency |
//! | `PF_TRANSFER_TIMEOUT_SECS` | `30` | Upper bound on one transfer call |
//! | `PF_ENFORCE_UNPAID_BALANCE` | `true` | Reject payouts above unpaid earnings |

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_port: u16,
    pub metrics_port: u16,
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            metrics_port: 9090,
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: LedgerBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Postgres,
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub api_base_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub webhook_tolerance_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            currency: "usd".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            webhook_tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// Smallest payout accepted, minor units
    pub min_amount: i64,
    /// Largest payout accepted, minor units
    pub max_amount: i64,
    pub enforce_unpaid_balance: bool,
    pub transfer_timeout_secs: u64,
    pub stale_pending_after_secs: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            min_amount: 1,
            max_amount: 100_000_000,
            enforce_unpaid_balance: true,
            transfer_timeout_secs: 30,
            stale_pending_after_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub payouts: PayoutConfig,
}

impl AppConfig {
    /// Load from `PF_CONFIG_FILE` (if set) and the process environment, then validate.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("PF_CONFIG_FILE") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PF_*` overrides, reading values through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PF_API_PORT") {
            self.server.api_port = parse_env("PF_API_PORT", &v)?;
        }
        if let Some(v) = lookup("PF_METRICS_PORT") {
            self.server.metrics_port = parse_env("PF_METRICS_PORT", &v)?;
        }
        if let Some(v) = lookup("PF_API_TOKEN") {
            self.server.api_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("PF_LEDGER_BACKEND") {
            self.database.backend = match v.to_ascii_lowercase().as_str() {
                "postgres" => LedgerBackend::Postgres,
                "memory" => LedgerBackend::Memory,
                _ => return Err(ConfigError::InvalidEnv { key: "PF_LEDGER_BACKEND".to_string(), value: v }),
            };
        }
        if let Some(v) = lookup("PF_DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = lookup("PF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("PF_DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("PF_GATEWAY_URL") {
            self.gateway.api_base_url = v;
        }
        if let Some(v) = lookup("PF_GATEWAY_SECRET_KEY") {
            self.gateway.secret_key = v;
        }
        if let Some(v) = lookup("PF_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = v;
        }
        if let Some(v) = lookup("PF_CURRENCY") {
            self.gateway.currency = v.to_ascii_lowercase();
        }
        if let Some(v) = lookup("PF_TRANSFER_TIMEOUT_SECS") {
            self.payouts.transfer_timeout_secs = parse_env("PF_TRANSFER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PF_ENFORCE_UNPAID_BALANCE") {
            self.payouts.enforce_unpaid_balance = parse_env("PF_ENFORCE_UNPAID_BALANCE", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.webhook_secret.is_empty() {
            return Err(invalid("gateway.webhook_secret must be set"));
        }
        if self.gateway.connect_timeout_secs == 0
            || self.gateway.request_timeout_secs == 0
            || self.payouts.transfer_timeout_secs == 0
        {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.payouts.min_amount < 1 {
            return Err(invalid("payouts.min_amount must be at least 1"));
        }
        if self.payouts.max_amount < self.payouts.min_amount {
            return Err(invalid("payouts.max_amount must not be below payouts.min_amount"));
        }
        if self.database.backend == LedgerBackend::Postgres && self.database.url.is_none() {
            return Err(invalid("database.url is required for the postgres backend"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid { message: message.to_string() }
}
