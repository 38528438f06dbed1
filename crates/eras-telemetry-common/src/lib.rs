//! Shared data model and payload normalization for eras-telemetry.

pub mod error;
pub mod json_normalizer;
pub mod types;

pub use error::NormalizeError;
pub use json_normalizer::{normalize_bytes, normalize_event, NormalizedPayload, BODY_FIELD};
pub use types::{
    format_timestamp, parse_decimal, parse_timestamp, TelemetryRecord, TelemetrySample,
    DEVICE_ID_FIELD, TIMESTAMP_FIELD, TTL_FIELD,
};
