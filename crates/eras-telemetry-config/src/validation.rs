// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_filter_config(&config.filter)?;
    validate_request_config(&config.request)?;
    validate_storage_config(&config.storage)?;
    validate_view_config(&config.view)?;

    if let Some(ref server) = config.server {
        validate_server_config(server)?;
    }

    Ok(())
}

fn validate_filter_config(config: &FilterConfig) -> Result<()> {
    if config.change_threshold.is_sign_negative() || config.change_threshold.is_zero() {
        bail!("filter.change_threshold must be greater than 0");
    }

    if config.ttl_days == 0 {
        bail!("filter.ttl_days must be greater than 0");
    }

    if config.default_device_id.trim().is_empty() {
        bail!("filter.default_device_id must not be empty");
    }

    if config.ttl_days > 365 {
        warn!(
            ttl_days = config.ttl_days,
            "filter.ttl_days is very large; storage will grow accordingly"
        );
    }

    Ok(())
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_payload_bytes == 0 {
        bail!("request.max_payload_bytes must be greater than 0");
    }

    // DynamoDB items cap out at 400 KB; bigger payloads cannot be stored anyway
    if config.max_payload_bytes > 6 * 1024 * 1024 {
        warn!(
            max_payload_bytes = config.max_payload_bytes,
            "request.max_payload_bytes is very large; may cause issues"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Memory => {}
        StorageBackend::DynamoDb => {
            let ddb = config.dynamodb.as_ref().ok_or_else(|| {
                anyhow::anyhow!("dynamodb storage backend requires 'dynamodb' configuration")
            })?;

            if ddb.table.is_empty() {
                bail!("storage.dynamodb.table is required for DynamoDB backend");
            }

            if ddb.region.is_empty() {
                bail!("storage.dynamodb.region is required for DynamoDB backend");
            }

            if let Some(endpoint) = &ddb.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    bail!("storage.dynamodb.endpoint must be an http(s) URL");
                }
            }
        }
    }

    Ok(())
}

fn validate_view_config(config: &ViewConfig) -> Result<()> {
    if config.recent_rows == 0 {
        bail!("view.recent_rows must be greater than 0");
    }

    if config.history_window == Some(0) {
        bail!("view.history_window must be greater than 0 when set");
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    // Basic validation that it looks like an address
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_validate_filter_config() {
        assert!(validate_filter_config(&FilterConfig::default()).is_ok());

        let zero_threshold = FilterConfig {
            change_threshold: Decimal::ZERO,
            ..FilterConfig::default()
        };
        assert!(validate_filter_config(&zero_threshold).is_err());

        let negative_threshold = FilterConfig {
            change_threshold: Decimal::new(-5, 1),
            ..FilterConfig::default()
        };
        assert!(validate_filter_config(&negative_threshold).is_err());

        let no_ttl = FilterConfig {
            ttl_days: 0,
            ..FilterConfig::default()
        };
        assert!(validate_filter_config(&no_ttl).is_err());

        let blank_device = FilterConfig {
            default_device_id: "  ".to_string(),
            ..FilterConfig::default()
        };
        assert!(validate_filter_config(&blank_device).is_err());
    }

    #[test]
    fn test_validate_storage_config() {
        let ddb_config = StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: Some(DynamoDbConfig {
                table: "DeviceTelemetry".to_string(),
                region: "ap-southeast-2".to_string(),
                endpoint: Some("http://localhost:4566".to_string()),
            }),
        };
        assert!(validate_storage_config(&ddb_config).is_ok());

        let missing_section = StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: None,
        };
        assert!(validate_storage_config(&missing_section).is_err());

        let empty_table = StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: Some(DynamoDbConfig {
                table: String::new(),
                ..DynamoDbConfig::default()
            }),
        };
        assert!(validate_storage_config(&empty_table).is_err());

        let bad_endpoint = StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: Some(DynamoDbConfig {
                endpoint: Some("localhost:4566".to_string()),
                ..DynamoDbConfig::default()
            }),
        };
        assert!(validate_storage_config(&bad_endpoint).is_err());
    }

    #[test]
    fn test_validate_server_and_view() {
        assert!(validate_server_config(&ServerConfig::default()).is_ok());
        assert!(validate_server_config(&ServerConfig {
            listen_addr: "8080".to_string()
        })
        .is_err());

        let view = ViewConfig {
            history_window: Some(0),
            ..ViewConfig::default()
        };
        assert!(validate_view_config(&view).is_err());
    }
}
