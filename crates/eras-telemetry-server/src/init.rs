// Initialization utilities for server mode
//
// Store backend and logging/tracing setup

use anyhow::{Context, Result};
use eras_telemetry_config::{LogFormat, RuntimeConfig};
use eras_telemetry_store::TelemetryStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the telemetry store from RuntimeConfig
pub(crate) async fn init_store(config: &RuntimeConfig) -> Result<Arc<dyn TelemetryStore>> {
    info!(
        "Initializing telemetry store with backend: {}",
        config.storage.backend
    );

    let store = eras_telemetry_store::initialize_store(&config.storage)
        .await
        .context("Failed to initialize telemetry store")?;

    info!(
        backend = store.backend_name(),
        write_mode = %config.filter.write_mode,
        threshold = %config.filter.change_threshold,
        ttl_days = config.filter.ttl_days,
        "Telemetry store ready"
    );

    Ok(store)
}

/// `log.level` decides verbosity (set it with ERAS_TELEMETRY_LOG_LEVEL);
/// RUST_LOG is not consulted, matching the Lambda adapter.
fn log_filter(config: &RuntimeConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*};

    let env_filter = log_filter(config);

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.log.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use eras_telemetry_config::Platform;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_log_filter_uses_configured_level() {
        let mut config = RuntimeConfig::from_platform_defaults(Platform::Server);
        config.log.level = "warn".to_string();
        assert_eq!(log_filter(&config).max_level_hint(), Some(LevelFilter::WARN));

        config.log.level = "eras=loud".to_string();
        assert_eq!(log_filter(&config).max_level_hint(), Some(LevelFilter::INFO));
    }
}
