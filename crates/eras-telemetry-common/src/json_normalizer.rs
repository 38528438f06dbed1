// Payload normalization for device telemetry events
//
// Transports hand us one of:
// - the telemetry object itself
// - the object serialized into a JSON string (raw string invocation)
// - a wrapper whose `body` field holds the JSON-encoded telemetry
//   (MQTT bridge, API Gateway / Function URL proxy events)
//
// serde_json is built with `arbitrary_precision`, so numbers keep their exact
// textual form until `parse_decimal` reads them.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde_json::{Map, Value as JsonValue};

use crate::error::NormalizeError;
use crate::types::DEVICE_ID_FIELD;

pub const BODY_FIELD: &str = "body";
const BASE64_FLAG_FIELD: &str = "isBase64Encoded";

/// Flat attribute map produced from a raw event.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    fields: Map<String, JsonValue>,
}

impl NormalizedPayload {
    pub fn device_id(&self) -> &str {
        self.fields
            .get(DEVICE_ID_FIELD)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Map<String, JsonValue> {
        self.fields
    }
}

/// Parse raw request bytes as an event and normalize it.
pub fn normalize_bytes(
    body: &[u8],
    default_device_id: &str,
) -> Result<NormalizedPayload, NormalizeError> {
    let event: JsonValue =
        serde_json::from_slice(body).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    normalize_event(event, default_device_id)
}

/// Flatten an event into a [`NormalizedPayload`].
///
/// Nested `body` fields overwrite same-named outer fields. A nested body that
/// cannot be decoded leaves the outer object untouched.
pub fn normalize_event(
    event: JsonValue,
    default_device_id: &str,
) -> Result<NormalizedPayload, NormalizeError> {
    let event = match event {
        JsonValue::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| NormalizeError::InvalidJson(e.to_string()))?,
        other => other,
    };

    let mut fields = match event {
        JsonValue::Object(map) => map,
        other => return Err(NormalizeError::NotAnObject(json_kind(&other))),
    };

    flatten_body(&mut fields);
    ensure_device_id(&mut fields, default_device_id);

    Ok(NormalizedPayload { fields })
}

fn flatten_body(fields: &mut Map<String, JsonValue>) {
    let Some(JsonValue::String(raw)) = fields.get(BODY_FIELD) else {
        return;
    };

    let base64_encoded = fields
        .get(BASE64_FLAG_FIELD)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    match decode_nested_body(raw, base64_encoded) {
        Ok(nested) => {
            fields.extend(nested);
            fields.remove(BODY_FIELD);
            if base64_encoded {
                fields.remove(BASE64_FLAG_FIELD);
            }
        }
        Err(reason) => {
            tracing::warn!(error = %reason, "Could not parse nested body; using outer payload");
        }
    }
}

fn decode_nested_body(
    raw: &str,
    base64_encoded: bool,
) -> Result<Map<String, JsonValue>, String> {
    let nested: JsonValue = if base64_encoded {
        let bytes = BASE64_STANDARD
            .decode(raw.as_bytes())
            .map_err(|e| format!("invalid base64 body: {}", e))?;
        serde_json::from_slice(&bytes).map_err(|e| e.to_string())?
    } else {
        serde_json::from_str(raw).map_err(|e| e.to_string())?
    };

    match nested {
        JsonValue::Object(map) => Ok(map),
        other => Err(format!(
            "nested body must be a JSON object, got {}",
            json_kind(&other)
        )),
    }
}

fn ensure_device_id(fields: &mut Map<String, JsonValue>, default_device_id: &str) {
    let usable = matches!(
        fields.get(DEVICE_ID_FIELD),
        Some(JsonValue::String(id)) if !id.trim().is_empty()
    );

    if !usable {
        fields.insert(
            DEVICE_ID_FIELD.to_string(),
            JsonValue::String(default_device_id.to_string()),
        );
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
