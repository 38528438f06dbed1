// AWS Lambda runtime adapter
//
// Receives telemetry events (direct invoke, IoT rule action, API Gateway
// proxy) and reports the ingestion outcome as `{statusCode, body}`.
//
// Philosophy: Use lambda_runtime's provided tokio
// We don't add our own tokio - lambda_runtime provides it

use eras_telemetry_config::{LogFormat, Platform, RuntimeConfig};
use eras_telemetry_handlers::{IngestConfig, TelemetryIngestor};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod handlers;
mod response;

pub use response::LambdaResponse;

/// Lambda handler for one telemetry event
async fn handle_request(
    event: LambdaEvent<JsonValue>,
    state: Arc<LambdaState>,
) -> Result<LambdaResponse, Error> {
    let (payload, context) = event.into_parts();
    tracing::debug!(request_id = %context.request_id, "Handling telemetry event");
    Ok(handlers::handle_event(payload, &state).await)
}

pub(crate) struct LambdaState {
    pub ingestor: Arc<TelemetryIngestor>,
    pub max_payload_bytes: usize,
}

/// Lambda runtime entry point
pub async fn run() -> Result<(), Error> {
    let config = RuntimeConfig::load_for_platform(Platform::Lambda)
        .map_err(|e| Error::from(format!("Failed to load configuration: {:#}", e)))?;

    init_tracing(&config);

    let store = eras_telemetry_store::initialize_store(&config.storage)
        .await
        .map_err(|e| Error::from(format!("Failed to initialize store: {}", e)))?;

    tracing::info!(
        backend = store.backend_name(),
        write_mode = %config.filter.write_mode,
        threshold = %config.filter.change_threshold,
        "Lambda telemetry ingestor ready"
    );

    let state = Arc::new(LambdaState {
        ingestor: Arc::new(TelemetryIngestor::new(
            store,
            IngestConfig::from(&config.filter),
        )),
        max_payload_bytes: config.request.max_payload_bytes,
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<JsonValue>| {
        let state = state.clone();
        async move { handle_request(event, state).await }
    }))
    .await
}

/// `log.level` decides verbosity (set it with ERAS_TELEMETRY_LOG_LEVEL);
/// RUST_LOG is not consulted, matching the server.
fn log_filter(config: &RuntimeConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(config: &RuntimeConfig) {
    let env_filter = log_filter(config);

    // CloudWatch adds its own timestamps
    match config.log.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().without_time().with_ansi(false))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().without_time().with_ansi(false))
                .init();
        }
    }
}
