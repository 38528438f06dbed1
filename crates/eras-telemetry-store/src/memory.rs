use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eras_telemetry_common::{format_timestamp, TelemetryRecord};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::TelemetryStore;

type DeviceRows = BTreeMap<String, TelemetryRecord>;

/// In-process store, one sorted row family per device.
///
/// Used by the standalone server and as the substitute store in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<String, DeviceRows>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored for one device.
    pub async fn count(&self, device_id: &str) -> usize {
        self.devices
            .read()
            .await
            .get(device_id)
            .map_or(0, BTreeMap::len)
    }

    /// Number of records across all devices.
    pub async fn total(&self) -> usize {
        self.devices.read().await.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRecord>> {
        let devices = self.devices.read().await;
        Ok(devices
            .get(device_id)
            .and_then(|rows| rows.values().next_back())
            .cloned())
    }

    async fn put(&self, record: &TelemetryRecord) -> Result<()> {
        let mut devices = self.devices.write().await;
        devices
            .entry(record.device_id().to_string())
            .or_default()
            .insert(record.timestamp_key(), record.clone());
        Ok(())
    }

    async fn put_if_latest(
        &self,
        record: &TelemetryRecord,
        expected_latest: Option<&DateTime<Utc>>,
    ) -> Result<()> {
        let mut devices = self.devices.write().await;
        let rows = devices.entry(record.device_id().to_string()).or_default();

        let current = rows.keys().next_back().cloned();
        let expected = expected_latest.map(format_timestamp);
        if current != expected {
            return Err(StoreError::condition_failed(
                record.device_id(),
                format!(
                    "expected latest {:?}, found {:?}",
                    expected.as_deref().unwrap_or("<none>"),
                    current.as_deref().unwrap_or("<none>")
                ),
            ));
        }

        rows.insert(record.timestamp_key(), record.clone());
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<TelemetryRecord>> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .flat_map(|rows| rows.values().cloned())
            .collect())
    }

    async fn purge_expired(&self, now_epoch_secs: i64) -> Result<usize> {
        let mut devices = self.devices.write().await;
        let mut purged = 0;
        for rows in devices.values_mut() {
            let before = rows.len();
            rows.retain(|_, record| record.ttl > now_epoch_secs);
            purged += before - rows.len();
        }
        devices.retain(|_, rows| !rows.is_empty());
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use eras_telemetry_common::TelemetrySample;
    use rust_decimal::Decimal;

    fn record(device_id: &str, secs: i64, temp: i64) -> TelemetryRecord {
        let base = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        let timestamp = base + Duration::seconds(secs);
        TelemetryRecord {
            sample: TelemetrySample::new(device_id).with_temp(Decimal::from(temp)),
            timestamp,
            ttl: timestamp.timestamp() + 259_200,
        }
    }

    #[tokio::test]
    async fn test_latest_returns_newest_per_device() {
        let store = MemoryStore::new();
        store.put(&record("d1", 10, 20)).await.unwrap();
        store.put(&record("d1", 30, 22)).await.unwrap();
        store.put(&record("d1", 20, 21)).await.unwrap();
        store.put(&record("d2", 40, 99)).await.unwrap();

        let latest = store.latest("d1").await.unwrap().unwrap();
        assert_eq!(latest.temp(), Some(Decimal::from(22)));
        assert!(store.latest("unknown").await.unwrap().is_none());
        assert_eq!(store.count("d1").await, 3);
        assert_eq!(store.total().await, 4);
    }

    #[tokio::test]
    async fn test_put_same_key_overwrites() {
        let store = MemoryStore::new();
        store.put(&record("d1", 10, 20)).await.unwrap();
        store.put(&record("d1", 10, 25)).await.unwrap();

        assert_eq!(store.count("d1").await, 1);
        let latest = store.latest("d1").await.unwrap().unwrap();
        assert_eq!(latest.temp(), Some(Decimal::from(25)));
    }

    #[tokio::test]
    async fn test_put_if_latest_detects_stale_expectation() {
        let store = MemoryStore::new();
        let first = record("d1", 10, 20);

        store.put_if_latest(&first, None).await.unwrap();

        // A second writer that also saw "no records" loses
        let racing = record("d1", 11, 30);
        let err = store.put_if_latest(&racing, None).await.unwrap_err();
        assert!(err.is_condition_failed());
        assert_eq!(store.count("d1").await, 1);

        // Expecting the actual latest succeeds
        store
            .put_if_latest(&racing, Some(&first.timestamp))
            .await
            .unwrap();
        assert_eq!(store.count("d1").await, 2);
    }

    #[tokio::test]
    async fn test_scan_and_purge_expired() {
        let store = MemoryStore::new();
        let old = record("d1", 0, 20);
        let fresh = record("d2", 86_400, 21);
        store.put(&old).await.unwrap();
        store.put(&fresh).await.unwrap();
        assert_eq!(store.scan().await.unwrap().len(), 2);

        let purged = store.purge_expired(old.ttl).await.unwrap();
        assert_eq!(purged, 1);

        let remaining = store.scan().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].device_id(), "d2");
    }
}
