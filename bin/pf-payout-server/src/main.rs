//! PayoutFlow Payout Server
//!
//! Production server for the payout engine:
//! - Operator APIs: payout execution, earnings, history, attributions, products, recipients, audit
//! - Gateway webhook receiver
//! - Monitoring: health and Prometheus metrics on a separate port
//!
//! Configuration comes from `pf-config` (TOML file plus `PF_*` overrides).
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PF_CONFIG_FILE` | - | Path to a TOML config file |
//! | `PF_LOG_FORMAT` | `text` | `json` for structured log lines |
//! | `RUST_LOG` | `info` | Log level |
//!
//! See `pf_config` for the full list of `PF_*` settings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pf_config::{AppConfig, LedgerBackend};
use pf_gateway::{PaymentGateway, StripeGateway, StripeGatewayConfig, WebhookVerifier};
use pf_ledger::{LedgerStore, MemoryLedger, PostgresLedger};
use pf_payouts::api::{create_router, ApiServices, OperatorToken, PayoutApiDoc};
use pf_payouts::{
    AttributionService, AuditService, EarningsAggregator, EventReconciler, ExecutorConfig,
    PayoutExecutor, PayoutHistoryService, ProductService, RecipientService,
};
use sqlx::postgres::PgPoolOptions;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn init_logging() {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = std::env::var("PF_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn create_ledger(config: &AppConfig) -> Result<Arc<dyn LedgerStore>> {
    match config.database.backend {
        LedgerBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("PF_DATABASE_URL is required for the postgres ledger")?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(url)
                .await?;
            let ledger = PostgresLedger::new(pool);
            ledger.init_schema().await?;
            info!("Using PostgreSQL ledger");
            Ok(Arc::new(ledger))
        }
        LedgerBackend::Memory => {
            warn!("Using in-memory ledger; all state is lost on shutdown");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("Starting PayoutFlow Payout Server");

    let config = AppConfig::load()?;
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let ledger = create_ledger(&config).await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(StripeGatewayConfig {
        api_base_url: config.gateway.api_base_url.clone(),
        secret_key: config.gateway.secret_key.clone(),
        connect_timeout: Duration::from_secs(config.gateway.connect_timeout_secs),
        request_timeout: Duration::from_secs(config.gateway.request_timeout_secs),
    })?);
    info!(gateway = gateway.name(), base_url = %config.gateway.api_base_url, "Gateway client initialized");

    let verifier = WebhookVerifier::new(
        config.gateway.webhook_secret.clone(),
        Duration::from_secs(config.gateway.webhook_tolerance_secs),
    );

    // Services
    let audit = Arc::new(AuditService::new(ledger.clone()));
    let aggregator = Arc::new(EarningsAggregator::new(ledger.clone()));
    let executor = Arc::new(PayoutExecutor::new(
        ledger.clone(),
        gateway.clone(),
        aggregator.clone(),
        audit.clone(),
        ExecutorConfig {
            currency: config.gateway.currency.clone(),
            min_amount: config.payouts.min_amount,
            max_amount: config.payouts.max_amount,
            enforce_unpaid_balance: config.payouts.enforce_unpaid_balance,
            transfer_timeout: Duration::from_secs(config.payouts.transfer_timeout_secs),
        },
    ));
    let services = ApiServices {
        executor,
        aggregator,
        history: Arc::new(PayoutHistoryService::new(
            ledger.clone(),
            Duration::from_secs(config.payouts.stale_pending_after_secs),
        )),
        reconciler: Arc::new(EventReconciler::new(ledger.clone(), audit.clone(), verifier)),
        attributions: Arc::new(AttributionService::new(ledger.clone(), audit.clone())),
        products: Arc::new(ProductService::new(ledger.clone(), audit.clone())),
        recipients: Arc::new(RecipientService::new(ledger, gateway, audit.clone())),
        audit,
    };

    if config.server.api_token.is_none() {
        warn!("PF_API_TOKEN not set; operator endpoints are unauthenticated");
    }

    let app = create_router(services, OperatorToken::new(config.server.api_token.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", PayoutApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    // Start API server
    let api_addr = format!("0.0.0.0:{}", config.server.api_port);
    info!("API server listening on http://{}", api_addr);
    info!("Swagger UI available at http://{}/swagger-ui", api_addr);
    let api_listener = TcpListener::bind(&api_addr).await?;
    let api_task = tokio::spawn(async move { axum::serve(api_listener, app).await });

    // Start metrics server
    let metrics_addr = format!("0.0.0.0:{}", config.server.metrics_port);
    info!("Metrics server listening on http://{}/metrics", metrics_addr);
    let metrics_app = Router::new()
        .route("/metrics", get(move || metrics_handler(metrics.clone())))
        .route("/health", get(health_handler));
    let metrics_listener = TcpListener::bind(&metrics_addr).await?;
    let metrics_task = tokio::spawn(async move { axum::serve(metrics_listener, metrics_app).await });

    info!("PayoutFlow Payout Server started");

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received..."),
        res = api_task => warn!("API server exited: {:?}", res),
    }
    metrics_task.abort();

    info!("PayoutFlow Payout Server shutdown complete");
    Ok(())
}

async fn metrics_handler(handle: PrometheusHandle) -> String {
    handle.render()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
