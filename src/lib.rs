//! eras-telemetry: device telemetry ingestion with change filtering
//!
//! Payloads from the plant's ESP32 controllers are normalized, compared
//! against each device's last stored sample, and persisted with a three-day
//! expiry when the temperature moved enough to matter. The same pipeline runs
//! behind AWS Lambda (`eras-telemetry-lambda`), the HTTP server
//! (`eras-telemetry-server`) and this crate's CLI.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

pub use eras_telemetry_common as common;
pub use eras_telemetry_config as config;
pub use eras_telemetry_handlers as handlers;
pub use eras_telemetry_store as store;

use eras_telemetry_common::TelemetryRecord;
use eras_telemetry_config::RuntimeConfig;
use eras_telemetry_handlers::{IngestConfig, IngestOutcome, TelemetryIngestor};
use eras_telemetry_store::TelemetryStore;

/// Load configuration from an explicit file, or from the usual sources.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => RuntimeConfig::load().context("Failed to load configuration"),
    }
}

/// Connect the configured store and wrap it in an ingestor.
pub async fn build_ingestor(config: &RuntimeConfig) -> Result<TelemetryIngestor> {
    let store = eras_telemetry_store::initialize_store(&config.storage)
        .await
        .context("Failed to initialize telemetry store")?;
    Ok(ingestor_for(store, config))
}

pub fn ingestor_for(store: Arc<dyn TelemetryStore>, config: &RuntimeConfig) -> TelemetryIngestor {
    TelemetryIngestor::new(store, IngestConfig::from(&config.filter))
}

/// Run one raw payload through the pipeline.
pub async fn ingest_once(config: &RuntimeConfig, body: &[u8]) -> Result<IngestOutcome> {
    let ingestor = build_ingestor(config).await?;
    Ok(ingestor.ingest_bytes(body).await)
}

/// Every stored record, oldest first.
pub async fn read_records(store: &dyn TelemetryStore) -> Result<Vec<TelemetryRecord>> {
    let mut records = store.scan().await.context("Failed to scan telemetry store")?;
    records.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.device_id().cmp(b.device_id()))
    });
    tracing::debug!(
        records = records.len(),
        backend = store.backend_name(),
        "Read telemetry records"
    );
    Ok(records)
}
