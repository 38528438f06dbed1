use super::{DynamoDbConfig, LogFormat, RuntimeConfig, ServerConfig, StorageBackend, WriteMode};
use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const ENV_PREFIX: &str = "ERAS_TELEMETRY_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the ERAS_TELEMETRY_ prefix
    /// Used for AWS standard variables (AWS_REGION, AWS_ENDPOINT_URL)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Filter policy
    if let Some(val) = get_env_decimal(env, "CHANGE_THRESHOLD")? {
        config.filter.change_threshold = val;
    }
    if let Some(val) = get_env_u32(env, "TTL_DAYS")? {
        config.filter.ttl_days = val;
    }
    if let Some(device_id) = get_env_string(env, "DEFAULT_DEVICE_ID") {
        config.filter.default_device_id = device_id;
    }
    if let Some(mode) = get_env_string(env, "WRITE_MODE") {
        config.filter.write_mode = mode
            .parse::<WriteMode>()
            .context("Invalid ERAS_TELEMETRY_WRITE_MODE value")?;
    }

    // Request configuration
    if let Some(val) = get_env_usize(env, "MAX_PAYLOAD_BYTES")? {
        config.request.max_payload_bytes = val;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    // Server
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR") {
        ensure_server(config).listen_addr = addr;
    }

    // View thresholds
    if let Some(val) = get_env_decimal(env, "TEMP_WARNING")? {
        config.view.temp_warning = val;
    }
    if let Some(val) = get_env_decimal(env, "CURRENT_WARNING")? {
        config.view.current_warning = val;
    }
    if let Some(val) = get_env_usize(env, "RECENT_ROWS")? {
        config.view.recent_rows = val;
    }
    if let Some(val) = get_env_usize(env, "HISTORY_WINDOW")? {
        config.view.history_window = Some(val);
    }

    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .context("Invalid ERAS_TELEMETRY_STORAGE_BACKEND value")?;
    }

    // DynamoDB storage
    if let Some(table) = get_env_string(env, "DYNAMODB_TABLE") {
        ensure_dynamodb(config).table = table;
    }
    // AWS standard region variable (without prefix), prefixed variant wins
    if let Some(region) = get_env_string(env, "DYNAMODB_REGION")
        .or_else(|| get_raw_env_string(env, "AWS_REGION"))
    {
        if config.storage.backend == StorageBackend::DynamoDb || config.storage.dynamodb.is_some()
        {
            ensure_dynamodb(config).region = region;
        }
    }
    if let Some(endpoint) = get_env_string(env, "DYNAMODB_ENDPOINT")
        .or_else(|| get_raw_env_string(env, "AWS_ENDPOINT_URL"))
    {
        if config.storage.backend == StorageBackend::DynamoDb || config.storage.dynamodb.is_some()
        {
            ensure_dynamodb(config).endpoint = Some(endpoint);
        }
    }

    Ok(())
}

fn ensure_dynamodb(config: &mut RuntimeConfig) -> &mut DynamoDbConfig {
    config
        .storage
        .dynamodb
        .get_or_insert_with(DynamoDbConfig::default)
}

fn ensure_server(config: &mut RuntimeConfig) -> &mut ServerConfig {
    config.server.get_or_insert_with(ServerConfig::default)
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|val| !val.is_empty())
}

fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key).filter(|val| !val.is_empty())
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    get_env_string(env, key)
        .map(|val| {
            val.parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    get_env_string(env, key)
        .map(|val| {
            val.parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))
        })
        .transpose()
}

fn get_env_decimal<E: EnvSource>(env: &E, key: &str) -> Result<Option<Decimal>> {
    get_env_string(env, key)
        .map(|val| {
            Decimal::from_str(val.trim()).map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected decimal): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapEnv {
        prefixed: HashMap<String, String>,
        raw: HashMap<String, String>,
    }

    impl MapEnv {
        fn with(mut self, key: &str, val: &str) -> Self {
            self.prefixed.insert(key.to_string(), val.to_string());
            self
        }

        fn with_raw(mut self, key: &str, val: &str) -> Self {
            self.raw.insert(key.to_string(), val.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.prefixed.get(key).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.raw.get(key).cloned()
        }
    }

    #[test]
    fn test_filter_overrides() {
        let env = MapEnv::default()
            .with("CHANGE_THRESHOLD", "0.75")
            .with("TTL_DAYS", "7")
            .with("DEFAULT_DEVICE_ID", "bench-unit")
            .with("WRITE_MODE", "conditional");

        let mut config = RuntimeConfig::from_platform_defaults(Platform::Server);
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.filter.change_threshold, Decimal::new(75, 2));
        assert_eq!(config.filter.ttl_horizon_secs(), 7 * 86_400);
        assert_eq!(config.filter.default_device_id, "bench-unit");
        assert_eq!(config.filter.write_mode, WriteMode::Conditional);
    }

    #[test]
    fn test_invalid_decimal_is_rejected() {
        let env = MapEnv::default().with("CHANGE_THRESHOLD", "half");
        let mut config = RuntimeConfig::from_platform_defaults(Platform::Server);
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("ERAS_TELEMETRY_CHANGE_THRESHOLD"));
    }

    #[test]
    fn test_dynamodb_overrides_with_aws_fallbacks() {
        let env = MapEnv::default()
            .with("STORAGE_BACKEND", "dynamodb")
            .with("DYNAMODB_TABLE", "Telemetry")
            .with_raw("AWS_REGION", "eu-west-1")
            .with_raw("AWS_ENDPOINT_URL", "http://localhost:4566");

        let mut config = RuntimeConfig::from_platform_defaults(Platform::Server);
        apply_env_overrides(&mut config, &env).unwrap();

        let ddb = config.storage.dynamodb.unwrap();
        assert_eq!(config.storage.backend, StorageBackend::DynamoDb);
        assert_eq!(ddb.table, "Telemetry");
        assert_eq!(ddb.region, "eu-west-1");
        assert_eq!(ddb.endpoint.as_deref(), Some("http://localhost:4566"));
    }

    #[test]
    fn test_aws_region_ignored_for_memory_backend() {
        let env = MapEnv::default().with_raw("AWS_REGION", "eu-west-1");
        let mut config = RuntimeConfig::from_platform_defaults(Platform::Server);
        apply_env_overrides(&mut config, &env).unwrap();
        assert!(config.storage.dynamodb.is_none());
    }

    #[test]
    fn test_log_and_view_overrides() {
        let env = MapEnv::default()
            .with("LOG_LEVEL", "debug")
            .with("LOG_FORMAT", "JSON")
            .with("TEMP_WARNING", "31.5")
            .with("HISTORY_WINDOW", "100");

        let mut config = RuntimeConfig::from_platform_defaults(Platform::Lambda);
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.view.temp_warning, Decimal::new(315, 1));
        assert_eq!(config.view.history_window, Some(100));
    }
}
