// Configuration source loading.
//
// Priority order:
// 1. Environment variables (ERAS_TELEMETRY_* prefix)
// 2. Config file path from ERAS_TELEMETRY_CONFIG
// 3. Inline config content from ERAS_TELEMETRY_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.eras-telemetry.toml)
// 5. Platform defaults (based on auto-detected Platform)

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::platform::Platform;
use crate::*;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// Load configuration for the detected platform using native environment/file access.
pub fn load_config(platform: Platform) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::from_platform_defaults(platform);

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    let env_source = StdEnvSource;
    env_overrides::apply_env_overrides(&mut config, &env_source)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<ConfigFile>> {
    if let Ok(path) = env::var("ERAS_TELEMETRY_CONFIG") {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("ERAS_TELEMETRY_CONFIG_CONTENT") {
        let config = ConfigFile::parse(&content)
            .context("Failed to parse inline config from ERAS_TELEMETRY_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in &["./config.toml", "./.eras-telemetry.toml"] {
        let path = Path::new(path);
        if path.exists() {
            return read_config_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    ConfigFile::parse(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Starts with platform defaults, merges the file, then applies env overrides.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = read_config_file(path.as_ref())?;

    let platform = Platform::detect();
    let mut config = RuntimeConfig::from_platform_defaults(platform);
    config.merge(file_config);

    let env_source = StdEnvSource;
    env_overrides::apply_env_overrides(&mut config, &env_source)?;

    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn platform_defaults_match_expectations() {
        let server = RuntimeConfig::from_platform_defaults(Platform::Server);
        assert_eq!(server.storage.backend, StorageBackend::Memory);
        assert!(server.server.is_some());

        let lambda = RuntimeConfig::from_platform_defaults(Platform::Lambda);
        assert_eq!(lambda.storage.backend, StorageBackend::DynamoDb);
        assert_eq!(
            lambda.storage.dynamodb.as_ref().map(|d| d.table.as_str()),
            Some("DeviceTelemetry")
        );
        assert!(lambda.server.is_none());
    }

    #[test]
    fn read_config_file_parses_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [storage]
            backend = "memory"

            [view]
            temp_warning = 30
            recent_rows = 10
            "#
        )
        .unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.storage.unwrap().backend, StorageBackend::Memory);
        let view = config.view.unwrap();
        assert_eq!(view.temp_warning, rust_decimal::Decimal::from(30));
        assert_eq!(view.recent_rows, 10);
        assert!(config.log.is_none());
    }

    #[test]
    fn read_config_file_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "storage = 12").unwrap();

        let err = read_config_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
