// eras-telemetry-config - Unified configuration for all runtimes
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from ERAS_TELEMETRY_CONFIG env var
// 3. Config file contents from ERAS_TELEMETRY_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.eras-telemetry.toml)
// 5. Platform-specific defaults (lowest priority)

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

mod env_overrides;
mod platform;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use platform::{Platform, PlatformDefaults};

/// Fallback identity for payloads that do not name their device.
pub const DEFAULT_DEVICE_ID: &str = "esp32-001";

/// Main runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub request: RequestConfig,

    pub storage: StorageConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Config file contents. Sections left out of the file keep the values
/// already in place (platform defaults) when merged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub filter: Option<FilterConfig>,
    pub request: Option<RequestConfig>,
    pub storage: Option<StorageConfig>,
    pub log: Option<LogConfig>,
    pub view: Option<ViewConfig>,
    pub server: Option<ServerConfig>,
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Ingestion filter policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum absolute `temp` change against the last stored sample.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: Decimal,
    /// Expiry horizon applied to accepted records.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    #[serde(default = "default_device_id")]
    pub default_device_id: String,
    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_change_threshold() -> Decimal {
    Decimal::new(5, 1)
}

fn default_ttl_days() -> u32 {
    3
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

impl FilterConfig {
    pub fn ttl_horizon_secs(&self) -> i64 {
        i64::from(self.ttl_days) * 24 * 60 * 60
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            change_threshold: default_change_threshold(),
            ttl_days: default_ttl_days(),
            default_device_id: default_device_id(),
            write_mode: WriteMode::default(),
        }
    }
}

/// How the store writer guards against concurrent invocations for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Plain put after a plain read; concurrent same-device writes may both land.
    #[default]
    BestEffort,
    /// Put guarded by the previous timestamp the filter compared against.
    Conditional,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::BestEffort => write!(f, "best_effort"),
            WriteMode::Conditional => write!(f, "conditional"),
        }
    }
}

impl std::str::FromStr for WriteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_effort" | "besteffort" => Ok(WriteMode::BestEffort),
            "conditional" | "strict" => Ok(WriteMode::Conditional),
            _ => anyhow::bail!(
                "Unsupported write mode: {}. Supported: best_effort, conditional",
                s
            ),
        }
    }
}

/// Request handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub max_payload_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 256 * 1024,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamodb: Option<DynamoDbConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    DynamoDb,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::DynamoDb => write!(f, "dynamodb"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "in-memory" => Ok(StorageBackend::Memory),
            "dynamodb" | "dynamo" | "ddb" => Ok(StorageBackend::DynamoDb),
            _ => anyhow::bail!(
                "Unsupported storage backend: {}. Supported: memory, dynamodb",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    pub table: String,
    pub region: String,
    /// Override endpoint, e.g. `http://localhost:4566` for LocalStack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table: "DeviceTelemetry".to_string(),
            region: "ap-southeast-2".to_string(),
            endpoint: None,
        }
    }
}

/// Logging configuration shared by every binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Operator view presentation policy.
///
/// These thresholds only decide how the view highlights readings; ingestion
/// never consults them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_temp_warning")]
    pub temp_warning: Decimal,
    #[serde(default = "default_current_warning")]
    pub current_warning: Decimal,
    #[serde(default = "default_recent_rows")]
    pub recent_rows: usize,
    /// Limit history series to the newest N records; unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,
}

fn default_temp_warning() -> Decimal {
    Decimal::from(29)
}

fn default_current_warning() -> Decimal {
    Decimal::new(12, 1)
}

fn default_recent_rows() -> usize {
    5
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            temp_warning: default_temp_warning(),
            current_warning: default_current_warning(),
            recent_rows: default_recent_rows(),
            history_window: None,
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        let platform = Platform::detect();
        sources::load_config(platform)
    }

    /// Load configuration for a specific platform (useful for testing)
    pub fn load_for_platform(platform: Platform) -> Result<Self> {
        sources::load_config(platform)
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Construct a config that contains only platform defaults (no env or files).
    pub fn from_platform_defaults(platform: Platform) -> Self {
        platform_defaults(platform)
    }

    /// Merge the sections a config file actually sets (used for TOML layering).
    pub fn merge(&mut self, file: ConfigFile) {
        if let Some(filter) = file.filter {
            self.filter = filter;
        }
        if let Some(request) = file.request {
            self.request = request;
        }
        if let Some(storage) = file.storage {
            self.storage = storage;
        }
        if let Some(log) = file.log {
            self.log = log;
        }
        if let Some(view) = file.view {
            self.view = view;
        }
        if file.server.is_some() {
            self.server = file.server;
        }
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration for the given platform using inline config content
    /// plus overrides supplied by an `EnvSource`.
    pub fn load_for_platform_with_env<E: EnvSource>(
        platform: Platform,
        inline_config: Option<&str>,
        env: &E,
    ) -> Result<Self> {
        let mut config = RuntimeConfig::from_platform_defaults(platform);

        if let Some(inline) = inline_config {
            let file_config =
                ConfigFile::parse(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

fn platform_defaults(platform: Platform) -> RuntimeConfig {
    let defaults = platform.defaults();

    let storage_backend = defaults
        .storage_backend
        .parse::<StorageBackend>()
        .unwrap_or(StorageBackend::Memory);

    let storage = match storage_backend {
        StorageBackend::Memory => StorageConfig {
            backend: StorageBackend::Memory,
            dynamodb: None,
        },
        StorageBackend::DynamoDb => StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: Some(DynamoDbConfig::default()),
        },
    };

    RuntimeConfig {
        filter: FilterConfig::default(),
        request: RequestConfig {
            max_payload_bytes: defaults.max_payload_bytes,
        },
        storage,
        log: LogConfig {
            level: "info".to_string(),
            format: defaults.log_format,
        },
        view: ViewConfig::default(),
        server: defaults.serves_http.then(ServerConfig::default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "dynamodb".parse::<StorageBackend>().unwrap(),
            StorageBackend::DynamoDb
        );
        assert_eq!(
            "DDB".parse::<StorageBackend>().unwrap(),
            StorageBackend::DynamoDb
        );
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_write_mode_from_str() {
        assert_eq!(
            "best-effort".parse::<WriteMode>().unwrap(),
            WriteMode::BestEffort
        );
        assert_eq!(
            "conditional".parse::<WriteMode>().unwrap(),
            WriteMode::Conditional
        );
        assert_eq!("strict".parse::<WriteMode>().unwrap(), WriteMode::Conditional);
        assert!("sometimes".parse::<WriteMode>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let filter = FilterConfig::default();
        assert_eq!(filter.change_threshold, Decimal::new(5, 1));
        assert_eq!(filter.ttl_horizon_secs(), 259_200);
        assert_eq!(filter.default_device_id, "esp32-001");
        assert_eq!(filter.write_mode, WriteMode::BestEffort);

        let view = ViewConfig::default();
        assert_eq!(view.temp_warning, Decimal::from(29));
        assert_eq!(view.current_warning, Decimal::new(12, 1));
        assert_eq!(view.recent_rows, 5);

        let server = ServerConfig::default();
        assert_eq!(server.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [storage]
            backend = "dynamodb"

            [storage.dynamodb]
            table = "Telemetry"
            region = "us-east-1"

            [filter]
            change_threshold = 0.25
            write_mode = "conditional"
            "#,
        )
        .unwrap();

        assert_eq!(config.filter.change_threshold, Decimal::new(25, 2));
        assert_eq!(config.filter.ttl_days, 3);
        assert_eq!(config.filter.write_mode, WriteMode::Conditional);
        assert_eq!(config.storage.backend, StorageBackend::DynamoDb);
        assert_eq!(config.storage.dynamodb.unwrap().table, "Telemetry");
        assert_eq!(config.log.level, "info");
        assert!(config.server.is_none());
    }

    struct NoEnv;

    impl EnvSource for NoEnv {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_file_without_sections_keeps_platform_defaults() {
        let defaults = RuntimeConfig::from_platform_defaults(Platform::Lambda);
        let config = RuntimeConfig::load_for_platform_with_env(
            Platform::Lambda,
            Some(
                r#"
                [storage]
                backend = "dynamodb"

                [storage.dynamodb]
                table = "Telemetry"
                region = "us-east-1"
                "#,
            ),
            &NoEnv,
        )
        .unwrap();

        assert_eq!(config.log.format, defaults.log.format);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(
            config.request.max_payload_bytes,
            defaults.request.max_payload_bytes
        );
        assert_eq!(config.storage.dynamodb.unwrap().table, "Telemetry");
    }

    #[test]
    fn test_file_sections_override_platform_defaults() {
        let config = RuntimeConfig::load_for_platform_with_env(
            Platform::Lambda,
            Some(
                r#"
                [request]
                max_payload_bytes = 1024

                [log]
                level = "debug"
                format = "text"
                "#,
            ),
            &NoEnv,
        )
        .unwrap();

        assert_eq!(config.request.max_payload_bytes, 1024);
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.storage.backend, StorageBackend::DynamoDb);
    }
}
