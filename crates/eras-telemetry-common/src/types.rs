use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::NormalizeError;
use crate::json_normalizer::NormalizedPayload;

pub const DEVICE_ID_FIELD: &str = "device_id";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const TTL_FIELD: &str = "ttl";
const TEMP_FIELD: &str = "temp";
const CURRENT_FIELD: &str = "current";
const STATUS_FIELD: &str = "status";
const FAULTED_FIELD: &str = "faulted";

/// A telemetry sample decoded from one inbound event, before acceptance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub device_id: String,
    #[serde(
        with = "rust_decimal::serde::arbitrary_precision_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub temp: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::arbitrary_precision_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub current: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faulted: Option<i64>,
    /// Fields the device sent that have no dedicated column.
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl TelemetrySample {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            temp: None,
            current: None,
            status: None,
            faulted: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_temp(mut self, temp: Decimal) -> Self {
        self.temp = Some(temp);
        self
    }

    /// Decode the known telemetry fields out of a normalized payload.
    ///
    /// `null` counts as absent. Server-assigned fields (`timestamp`, `ttl`)
    /// sent by a device are discarded.
    pub fn from_payload(payload: NormalizedPayload) -> Result<Self, NormalizeError> {
        let mut sample = TelemetrySample::new(payload.device_id());

        for (key, value) in payload.into_fields() {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                DEVICE_ID_FIELD | TIMESTAMP_FIELD | TTL_FIELD => {}
                TEMP_FIELD => sample.temp = Some(decimal_field(TEMP_FIELD, &value)?),
                CURRENT_FIELD => sample.current = Some(decimal_field(CURRENT_FIELD, &value)?),
                STATUS_FIELD => match value {
                    JsonValue::String(status) => sample.status = Some(status),
                    _ => return Err(NormalizeError::invalid_field(STATUS_FIELD, "expected a string")),
                },
                FAULTED_FIELD => sample.faulted = Some(flag_field(FAULTED_FIELD, &value)?),
                _ => {
                    sample.extra.insert(key, value);
                }
            }
        }

        Ok(sample)
    }

    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("RUNNING")
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.is_some_and(|flag| flag >= 1)
    }
}

/// An accepted sample as persisted: keyed by `(device_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(flatten)]
    pub sample: TelemetrySample,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Epoch seconds after which the store may reclaim the record.
    pub ttl: i64,
}

impl TelemetryRecord {
    pub fn device_id(&self) -> &str {
        &self.sample.device_id
    }

    pub fn temp(&self) -> Option<Decimal> {
        self.sample.temp
    }

    /// Sort key as stored.
    pub fn timestamp_key(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Canonical ISO-8601 form: fixed-width microseconds with a `+00:00` offset,
/// so lexical order matches chronological order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| NormalizeError::invalid_field(TIMESTAMP_FIELD, e.to_string()))
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(timestamp))
}

/// Parse a decimal from its textual form, accepting exponent notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn decimal_field(field: &str, value: &JsonValue) -> Result<Decimal, NormalizeError> {
    let parsed = match value {
        JsonValue::Number(number) => parse_decimal(&number.to_string()),
        JsonValue::String(text) => parse_decimal(text),
        _ => None,
    };
    parsed.ok_or_else(|| NormalizeError::invalid_field(field, format!("not a decimal: {}", value)))
}

fn flag_field(field: &str, value: &JsonValue) -> Result<i64, NormalizeError> {
    if let JsonValue::Bool(flag) = value {
        return Ok(i64::from(*flag));
    }

    let decimal = decimal_field(field, value)?;
    if !decimal.fract().is_zero() {
        return Err(NormalizeError::invalid_field(field, "expected an integer"));
    }
    decimal
        .trunc()
        .to_i64()
        .ok_or_else(|| NormalizeError::invalid_field(field, "integer out of range"))
}
