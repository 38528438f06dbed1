// Event handling for the Lambda adapter
//
// Every invocation is one telemetry event. The event is handed to the
// ingestor as-is: wrapper shapes (`body` strings, base64 proxy bodies) are
// unwrapped by the normalizer.

use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::response::LambdaResponse;
use crate::LambdaState;

pub(crate) async fn handle_event(event: JsonValue, state: &LambdaState) -> LambdaResponse {
    if let Some(size) = wrapped_body_len(&event) {
        if size > state.max_payload_bytes {
            return LambdaResponse::new(
                413,
                json!({
                    "error": "payload too large",
                    "limit_bytes": state.max_payload_bytes,
                })
                .to_string(),
            );
        }
    }

    let outcome = state.ingestor.ingest(event).await;
    debug!(
        outcome = outcome.label(),
        status = outcome.status_code(),
        "Lambda invocation complete"
    );
    LambdaResponse::from(&outcome)
}

fn wrapped_body_len(event: &JsonValue) -> Option<usize> {
    event.get("body").and_then(JsonValue::as_str).map(str::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eras_telemetry_handlers::{IngestConfig, TelemetryIngestor};
    use eras_telemetry_store::MemoryStore;
    use std::sync::Arc;

    fn state() -> LambdaState {
        LambdaState {
            ingestor: Arc::new(TelemetryIngestor::new(
                Arc::new(MemoryStore::new()),
                IngestConfig::default(),
            )),
            max_payload_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_mqtt_wrapped_event_is_stored() {
        let state = state();
        let event = json!({"body": "{\"device_id\":\"d1\",\"temp\":30.0}"});

        let response = handle_event(event, &state).await;
        assert_eq!(response, LambdaResponse::new(200, "Stored successfully"));

        let response = handle_event(json!({"device_id": "d1", "temp": 30.2}), &state).await;
        assert_eq!(response, LambdaResponse::new(200, "Filtered"));
    }

    #[tokio::test]
    async fn test_invalid_event_reports_bad_request() {
        let response = handle_event(json!([1, 2, 3]), &state()).await;
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let event = json!({"body": "x".repeat(2048)});
        let response = handle_event(event, &state()).await;
        assert_eq!(response.status_code, 413);
    }
}
