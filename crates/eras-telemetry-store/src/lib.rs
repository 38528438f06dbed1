//! Keyed telemetry stores
//!
//! Records are partitioned by `device_id` and sorted by `timestamp`. The
//! ingestion path needs only two calls (latest-by-device and put); the
//! operator view reads everything with `scan`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eras_telemetry_common::TelemetryRecord;

mod attribute;
mod dynamodb;
mod error;
mod init;
mod memory;

pub use dynamodb::{DynamoStore, LATEST_MARKER};
pub use error::{ErrorCode, Result, StoreError};
pub use init::initialize_store;
pub use memory::MemoryStore;

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Short name used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Most recent record for the device (descending by timestamp, limit one).
    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRecord>>;

    /// Unconditional put keyed by `(device_id, timestamp)`.
    async fn put(&self, record: &TelemetryRecord) -> Result<()>;

    /// Put only if the device's newest stored timestamp is still
    /// `expected_latest` (`None`: the device has no records yet).
    ///
    /// Fails with [`StoreError::ConditionFailed`] when another writer got there
    /// first.
    async fn put_if_latest(
        &self,
        record: &TelemetryRecord,
        expected_latest: Option<&DateTime<Utc>>,
    ) -> Result<()>;

    /// Every stored record, in no particular order.
    async fn scan(&self) -> Result<Vec<TelemetryRecord>>;

    /// Drop records whose `ttl` is at or before `now_epoch_secs`.
    ///
    /// Backends with native expiry leave this to the engine and return 0.
    async fn purge_expired(&self, _now_epoch_secs: i64) -> Result<usize> {
        Ok(0)
    }
}
