//! Conversions between telemetry records and DynamoDB items.
//!
//! Decimals travel as `N` attributes in their exact textual form. Extra
//! device fields map onto the closest attribute type; anything without a
//! JSON counterpart (binary and set types) is dropped on the way back.

use aws_sdk_dynamodb::types::AttributeValue;
use eras_telemetry_common::{
    parse_decimal, parse_timestamp, TelemetryRecord, TelemetrySample, DEVICE_ID_FIELD,
    TIMESTAMP_FIELD, TTL_FIELD,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;
use std::str::FromStr;

pub(crate) type Item = HashMap<String, AttributeValue>;

const TEMP_ATTR: &str = "temp";
const CURRENT_ATTR: &str = "current";
const STATUS_ATTR: &str = "status";
const FAULTED_ATTR: &str = "faulted";

pub(crate) fn record_to_item(record: &TelemetryRecord) -> Item {
    let sample = &record.sample;
    let mut item = Item::new();

    for (key, value) in &sample.extra {
        item.insert(key.clone(), json_to_attribute(value));
    }

    item.insert(
        DEVICE_ID_FIELD.to_string(),
        AttributeValue::S(sample.device_id.clone()),
    );
    item.insert(
        TIMESTAMP_FIELD.to_string(),
        AttributeValue::S(record.timestamp_key()),
    );
    item.insert(TTL_FIELD.to_string(), AttributeValue::N(record.ttl.to_string()));

    if let Some(temp) = sample.temp {
        item.insert(TEMP_ATTR.to_string(), AttributeValue::N(temp.to_string()));
    }
    if let Some(current) = sample.current {
        item.insert(CURRENT_ATTR.to_string(), AttributeValue::N(current.to_string()));
    }
    if let Some(status) = &sample.status {
        item.insert(STATUS_ATTR.to_string(), AttributeValue::S(status.clone()));
    }
    if let Some(faulted) = sample.faulted {
        item.insert(FAULTED_ATTR.to_string(), AttributeValue::N(faulted.to_string()));
    }

    item
}

pub(crate) fn item_to_record(item: &Item) -> Result<TelemetryRecord, String> {
    let device_id = string_attr(item, DEVICE_ID_FIELD)?
        .ok_or_else(|| format!("item is missing '{}'", DEVICE_ID_FIELD))?;
    let timestamp_raw = string_attr(item, TIMESTAMP_FIELD)?
        .ok_or_else(|| format!("item is missing '{}'", TIMESTAMP_FIELD))?;
    let timestamp = parse_timestamp(&timestamp_raw).map_err(|e| e.to_string())?;
    let ttl = number_attr(item, TTL_FIELD)?
        .and_then(|ttl| ttl.trunc().to_i64())
        .unwrap_or_default();

    let mut sample = TelemetrySample::new(device_id);
    sample.temp = number_attr(item, TEMP_ATTR)?;
    sample.current = number_attr(item, CURRENT_ATTR)?;
    sample.status = string_attr(item, STATUS_ATTR)?;
    sample.faulted = number_attr(item, FAULTED_ATTR)?.and_then(|flag| flag.trunc().to_i64());

    for (key, value) in item {
        match key.as_str() {
            DEVICE_ID_FIELD | TIMESTAMP_FIELD | TTL_FIELD | TEMP_ATTR | CURRENT_ATTR
            | STATUS_ATTR | FAULTED_ATTR => {}
            _ => {
                if let Some(json) = attribute_to_json(value) {
                    sample.extra.insert(key.clone(), json);
                }
            }
        }
    }

    Ok(TelemetryRecord {
        sample,
        timestamp,
        ttl,
    })
}

fn string_attr(item: &Item, name: &str) -> Result<Option<String>, String> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
        Some(other) => Err(format!("attribute '{}' is not a string: {:?}", name, other)),
    }
}

fn number_attr(item: &Item, name: &str) -> Result<Option<Decimal>, String> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::N(raw)) => parse_decimal(raw)
            .map(Some)
            .ok_or_else(|| format!("attribute '{}' is not a decimal: {}", name, raw)),
        Some(other) => Err(format!("attribute '{}' is not a number: {:?}", name, other)),
    }
}

pub(crate) fn json_to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(flag) => AttributeValue::Bool(*flag),
        JsonValue::Number(number) => AttributeValue::N(number.to_string()),
        JsonValue::String(text) => AttributeValue::S(text.clone()),
        JsonValue::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        JsonValue::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_attribute(value)))
                .collect(),
        ),
    }
}

pub(crate) fn attribute_to_json(value: &AttributeValue) -> Option<JsonValue> {
    match value {
        AttributeValue::Null(_) => Some(JsonValue::Null),
        AttributeValue::Bool(flag) => Some(JsonValue::Bool(*flag)),
        AttributeValue::N(raw) => Number::from_str(raw).ok().map(JsonValue::Number),
        AttributeValue::S(text) => Some(JsonValue::String(text.clone())),
        AttributeValue::L(items) => Some(JsonValue::Array(
            items.iter().filter_map(attribute_to_json).collect(),
        )),
        AttributeValue::M(map) => Some(JsonValue::Object(
            map.iter()
                .filter_map(|(key, value)| attribute_to_json(value).map(|v| (key.clone(), v)))
                .collect::<Map<String, JsonValue>>(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample_record() -> TelemetryRecord {
        let mut sample = TelemetrySample::new("esp32-001").with_temp(Decimal::new(2530, 2));
        sample.current = Some(Decimal::new(115, 2));
        sample.status = Some("RUNNING".to_string());
        sample.faulted = Some(0);
        sample.extra.insert("fw".to_string(), json!("1.4.2"));
        sample.extra.insert("axes".to_string(), json!({"x": 1, "y": [true, null]}));

        TelemetryRecord {
            sample,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap(),
            ttl: 1_792_400_400,
        }
    }

    #[test]
    fn test_record_to_item_uses_exact_number_text() {
        let item = record_to_item(&sample_record());

        assert_eq!(item.get("temp"), Some(&AttributeValue::N("25.30".to_string())));
        assert_eq!(item.get("current"), Some(&AttributeValue::N("1.15".to_string())));
        assert_eq!(
            item.get("timestamp"),
            Some(&AttributeValue::S("2026-10-17T09:00:00.000000+00:00".to_string()))
        );
        assert_eq!(item.get("ttl"), Some(&AttributeValue::N("1792400400".to_string())));
        assert_eq!(item.get("fw"), Some(&AttributeValue::S("1.4.2".to_string())));
    }

    #[test]
    fn test_item_to_record_restores_all_fields() {
        let record = sample_record();
        let restored = item_to_record(&record_to_item(&record)).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_item_to_record_rejects_missing_keys() {
        let mut item = record_to_item(&sample_record());
        item.remove("timestamp");
        assert!(item_to_record(&item).unwrap_err().contains("timestamp"));

        let mut item = record_to_item(&sample_record());
        item.insert("temp".to_string(), AttributeValue::S("hot".to_string()));
        assert!(item_to_record(&item).is_err());
    }

    #[test]
    fn test_unsupported_attribute_types_are_dropped() {
        let mut item = record_to_item(&sample_record());
        item.insert(
            "tags".to_string(),
            AttributeValue::Ss(vec!["a".to_string(), "b".to_string()]),
        );

        let restored = item_to_record(&item).unwrap();
        assert!(!restored.sample.extra.contains_key("tags"));
    }
}
