use thiserror::Error;

/// Errors raised while turning a raw event into a telemetry sample.
///
/// A malformed nested `body` never produces one of these; the normalizer logs
/// it and keeps the outer fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

impl NormalizeError {
    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
