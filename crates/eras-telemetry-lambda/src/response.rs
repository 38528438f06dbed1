// Lambda response shape
//
// Direct invocations and the MQTT rule action read `statusCode`/`body`; API
// Gateway proxy integrations accept the same object.

use eras_telemetry_handlers::IngestOutcome;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaResponse {
    pub status_code: u16,
    pub body: String,
}

impl LambdaResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

impl From<&IngestOutcome> for LambdaResponse {
    fn from(outcome: &IngestOutcome) -> Self {
        Self::new(outcome.status_code(), outcome.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_status_code_in_camel_case() {
        let response = LambdaResponse::new(200, "Filtered");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 200, "body": "Filtered"})
        );
    }
}
