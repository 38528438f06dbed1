// Server mode - HTTP ingestion endpoint and operator view
//
// Runs anywhere a long-lived process is available:
// - Docker containers
// - Local development next to LocalStack
// - VM instances on the plant network
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - In-memory or DynamoDB telemetry store
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use eras_telemetry_config::{RuntimeConfig, StorageBackend, ViewConfig};
use eras_telemetry_handlers::{IngestConfig, TelemetryIngestor};
use eras_telemetry_store::TelemetryStore;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

mod handlers;
mod init;
pub mod view;

use handlers::{dashboard, handle_ingest, health_check, list_records, ready_check};
pub use init::init_tracing;
use init::init_store;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<TelemetryIngestor>,
    pub store: Arc<dyn TelemetryStore>,
    pub view: ViewConfig,
    pub max_payload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn TelemetryStore>, config: &RuntimeConfig) -> Self {
        Self {
            ingestor: Arc::new(TelemetryIngestor::new(
                store.clone(),
                IngestConfig::from(&config.filter),
            )),
            store,
            view: config.view.clone(),
            max_payload_bytes: config.request.max_payload_bytes,
        }
    }
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
    error_type: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request error: {:?}", self.error);
        } else {
            warn!("Request rejected: {}", self.error);
        }

        let body = match self.error_type {
            Some(error_type) => json!({
                "error": self.error.to_string(),
                "type": error_type,
            }),
            None => json!({
                "error": self.error.to_string(),
            }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self {
            status,
            error,
            error_type: None,
        }
    }

    pub fn with_type(mut self, error_type: &'static str) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, error.into())
    }
}

/// Build the HTTP router over an existing state
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_payload_bytes;
    Router::new()
        .route("/v1/telemetry", get(list_records).post(handle_ingest))
        .route("/v1/dashboard", get(dashboard))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    info!("Server mode - telemetry ingestion and operator view");

    let addr = config
        .server
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("server config required"))?
        .listen_addr
        .clone();

    let store = init_store(&config).await?;

    info!(
        "Max payload size set to {} bytes",
        config.request.max_payload_bytes
    );

    let state = AppState::new(store.clone(), &config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Telemetry HTTP endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/v1/telemetry - Telemetry ingestion", addr);
    info!("  GET  http://{}/v1/telemetry - All stored records", addr);
    info!("  GET  http://{}/v1/dashboard - Operator view", addr);
    info!("  GET  http://{}/health       - Health check", addr);
    info!("  GET  http://{}/ready        - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    // DynamoDB expires records itself; the memory store needs a sweeper
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let purge_handle = if config.storage.backend == StorageBackend::Memory {
        let purge_store = store.clone();
        let purge_shutdown = Arc::clone(&shutdown_flag);
        Some(tokio::spawn(async move {
            run_expiry_sweep(purge_store, purge_shutdown, PURGE_INTERVAL).await;
        }))
    } else {
        None
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_flag.store(true, Ordering::SeqCst);
    if let Some(handle) = purge_handle {
        handle.abort();
        let _ = handle.await;
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Periodically drop records whose ttl has passed
async fn run_expiry_sweep(
    store: Arc<dyn TelemetryStore>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;

        let now = chrono::Utc::now().timestamp();
        match store.purge_expired(now).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired telemetry records"),
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }
    }
}
