//! Store initialization from runtime configuration

use std::sync::Arc;

use eras_telemetry_config::{StorageBackend, StorageConfig};

use crate::error::{Result, StoreError};
use crate::{DynamoStore, MemoryStore, TelemetryStore};

/// Build the store selected by `storage.backend`.
pub async fn initialize_store(config: &StorageConfig) -> Result<Arc<dyn TelemetryStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory telemetry store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::DynamoDb => {
            let ddb = config.dynamodb.as_ref().ok_or_else(|| {
                StoreError::invalid_config("dynamodb backend requires a [storage.dynamodb] section")
            })?;
            Ok(Arc::new(DynamoStore::connect(ddb).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            dynamodb: None,
        };
        let store = initialize_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_dynamodb_backend_requires_section() {
        let config = StorageConfig {
            backend: StorageBackend::DynamoDb,
            dynamodb: None,
        };
        let err = initialize_store(&config).await.err().unwrap();
        assert_eq!(err.code(), "E101");
    }
}
