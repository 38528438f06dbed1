//! DynamoDB-backed telemetry store.
//!
//! Table layout: partition key `device_id` (S), sort key `timestamp` (S),
//! TTL attribute `ttl` (epoch seconds). Conditional writes additionally keep
//! one head item per device under the sort key [`LATEST_MARKER`], which sorts
//! after every ISO-8601 timestamp and is excluded from reads. The head item
//! carries the ttl of the record it points at, so it ages out with it.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem, Update};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use eras_telemetry_common::{
    format_timestamp, TelemetryRecord, DEVICE_ID_FIELD, TIMESTAMP_FIELD, TTL_FIELD,
};
use eras_telemetry_config::DynamoDbConfig;

use crate::attribute::{item_to_record, record_to_item, Item};
use crate::error::{Result, StoreError};
use crate::TelemetryStore;

/// Sort key of the per-device head item used by conditional writes.
pub const LATEST_MARKER: &str = "~latest";
const LATEST_ATTR: &str = "latest_timestamp";

/// Precondition on the head item for one conditional write.
#[derive(Debug, PartialEq)]
struct HeadGuard {
    condition: &'static str,
    values: Vec<(&'static str, AttributeValue)>,
}

/// The head may lag the real latest row (rows written in best-effort mode)
/// or outlive it (ttl deletion is asynchronous), so a head that is older than
/// the expected timestamp or already expired does not block the write.
fn head_guard(expected_latest: Option<&DateTime<Utc>>, now: i64) -> HeadGuard {
    let now = (":now", AttributeValue::N(now.to_string()));
    match expected_latest {
        Some(previous) => HeadGuard {
            condition: "attribute_not_exists(#latest) OR #latest <= :prev OR #ttl <= :now",
            values: vec![
                (":prev", AttributeValue::S(format_timestamp(previous))),
                now,
            ],
        },
        None => HeadGuard {
            condition: "attribute_not_exists(#latest) OR attribute_not_exists(#ttl) OR #ttl <= :now",
            values: vec![now],
        },
    }
}

pub struct DynamoStore {
    client: Client,
    table: String,
}

impl DynamoStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Build a client from the ambient AWS credential chain.
    pub async fn connect(config: &DynamoDbConfig) -> Result<Self> {
        if config.table.is_empty() {
            return Err(StoreError::invalid_config("DynamoDB table name is empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        tracing::info!(
            table = %config.table,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Connected DynamoDB telemetry store"
        );

        Ok(Self::new(Client::new(&sdk_config), config.table.clone()))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn head_key(device_id: &str) -> Item {
        Item::from([
            (
                DEVICE_ID_FIELD.to_string(),
                AttributeValue::S(device_id.to_string()),
            ),
            (
                TIMESTAMP_FIELD.to_string(),
                AttributeValue::S(LATEST_MARKER.to_string()),
            ),
        ])
    }
}

#[async_trait]
impl TelemetryStore for DynamoStore {
    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }

    async fn latest(&self, device_id: &str) -> Result<Option<TelemetryRecord>> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("#pk = :pk AND #sk < :marker")
            .expression_attribute_names("#pk", DEVICE_ID_FIELD)
            .expression_attribute_names("#sk", TIMESTAMP_FIELD)
            .expression_attribute_values(":pk", AttributeValue::S(device_id.to_string()))
            .expression_attribute_values(":marker", AttributeValue::S(LATEST_MARKER.to_string()))
            .scan_index_forward(false)
            .limit(1)
            .send()
            .await
            .map_err(|e| StoreError::lookup_failure(DisplayErrorContext(&e).to_string()))?;

        output
            .items()
            .first()
            .map(item_to_record)
            .transpose()
            .map_err(StoreError::lookup_failure)
    }

    async fn put(&self, record: &TelemetryRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(|e| StoreError::write_failure(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn put_if_latest(
        &self,
        record: &TelemetryRecord,
        expected_latest: Option<&DateTime<Utc>>,
    ) -> Result<()> {
        let put = Put::builder()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .build()
            .map_err(|e| StoreError::write_failure(e.to_string()))?;

        let guard = head_guard(expected_latest, Utc::now().timestamp());
        let mut update = Update::builder()
            .table_name(&self.table)
            .set_key(Some(Self::head_key(record.device_id())))
            .update_expression("SET #latest = :ts, #ttl = :ttl")
            .condition_expression(guard.condition)
            .expression_attribute_names("#latest", LATEST_ATTR)
            .expression_attribute_names("#ttl", TTL_FIELD)
            .expression_attribute_values(":ts", AttributeValue::S(record.timestamp_key()))
            .expression_attribute_values(":ttl", AttributeValue::N(record.ttl.to_string()));
        for (name, value) in guard.values {
            update = update.expression_attribute_values(name, value);
        }

        let update = update
            .build()
            .map_err(|e| StoreError::write_failure(e.to_string()))?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(TransactWriteItem::builder().update(update).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) =
                    err.as_service_error()
                {
                    let lost_condition = cancelled
                        .cancellation_reasons()
                        .iter()
                        .any(|reason| reason.code() == Some("ConditionalCheckFailed"));
                    if lost_condition {
                        return Err(StoreError::condition_failed(
                            record.device_id(),
                            "a newer record was stored concurrently",
                        ));
                    }
                }
                Err(StoreError::write_failure(
                    DisplayErrorContext(&err).to_string(),
                ))
            }
        }
    }

    async fn scan(&self) -> Result<Vec<TelemetryRecord>> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table)
                .filter_expression("#ts <> :marker")
                .expression_attribute_names("#ts", TIMESTAMP_FIELD)
                .expression_attribute_values(
                    ":marker",
                    AttributeValue::S(LATEST_MARKER.to_string()),
                )
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::scan_failure(DisplayErrorContext(&e).to_string()))?;

            for item in output.items() {
                match item_to_record(item) {
                    Ok(record) => records.push(record),
                    Err(reason) => {
                        tracing::warn!(error = %reason, "Skipping unreadable telemetry item");
                    }
                }
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::debug!(records = records.len(), table = %self.table, "Scanned telemetry table");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eras_telemetry_common::parse_timestamp;

    #[test]
    fn test_marker_sorts_after_timestamps() {
        let ts = format_timestamp(&Utc::now());
        assert!(ts.as_str() < LATEST_MARKER);
        assert!("9999-12-31T23:59:59.999999+00:00" < LATEST_MARKER);
    }

    #[test]
    fn test_head_key_targets_marker_row() {
        let key = DynamoStore::head_key("d1");
        assert_eq!(key.get("device_id"), Some(&AttributeValue::S("d1".to_string())));
        assert_eq!(
            key.get("timestamp"),
            Some(&AttributeValue::S(LATEST_MARKER.to_string()))
        );
    }

    #[test]
    fn test_first_write_guard_tolerates_expired_head() {
        let guard = head_guard(None, 1_700_000_000);
        assert_eq!(
            guard.condition,
            "attribute_not_exists(#latest) OR attribute_not_exists(#ttl) OR #ttl <= :now"
        );
        assert_eq!(
            guard.values,
            vec![(":now", AttributeValue::N("1700000000".to_string()))]
        );
    }

    #[test]
    fn test_guard_accepts_lagging_head() {
        let previous = parse_timestamp("2025-01-01T10:00:00.000000+00:00").unwrap();
        let guard = head_guard(Some(&previous), 42);
        assert!(guard.condition.contains("#latest <= :prev"));
        assert!(guard.condition.contains("#ttl <= :now"));
        assert_eq!(
            guard.values,
            vec![
                (
                    ":prev",
                    AttributeValue::S("2025-01-01T10:00:00.000000+00:00".to_string())
                ),
                (":now", AttributeValue::N("42".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_table() {
        let config = DynamoDbConfig {
            table: String::new(),
            ..DynamoDbConfig::default()
        };
        let err = DynamoStore::connect(&config).await.err().unwrap();
        assert_eq!(err.code(), "E101");
    }
}
