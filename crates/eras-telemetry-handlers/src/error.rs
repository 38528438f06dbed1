use eras_telemetry_common::NormalizeError;
use eras_telemetry_store::StoreError;

/// Failure classification for one ingestion invocation
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    // 400-level: the event itself is unusable
    InvalidPayload {
        message: String,
    },

    // 409: conditional write lost to a concurrent writer
    Conflict {
        device_id: String,
        message: String,
    },

    // 500-level: store failures
    LookupFailed {
        message: String,
    },
    WriteFailed {
        message: String,
    },
}

impl IngestError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::LookupFailed { .. } => 500,
            Self::WriteFailed { .. } => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => "InvalidPayload",
            Self::Conflict { .. } => "Conflict",
            Self::LookupFailed { .. } => "LookupFailed",
            Self::WriteFailed { .. } => "WriteFailed",
        }
    }

    /// Error text reported back to the caller
    pub fn message(&self) -> String {
        match self {
            Self::InvalidPayload { message } => format!("Invalid payload: {}", message),
            Self::Conflict { message, .. } => message.clone(),
            Self::LookupFailed { message } => message.clone(),
            Self::WriteFailed { message } => message.clone(),
        }
    }

    pub fn lookup(err: StoreError) -> Self {
        Self::LookupFailed {
            message: err.to_string(),
        }
    }

    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::ConditionFailed { ref device_id, .. } => Self::Conflict {
                device_id: device_id.clone(),
                message: err.to_string(),
            },
            other => Self::WriteFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<NormalizeError> for IngestError {
    fn from(err: NormalizeError) -> Self {
        Self::InvalidPayload {
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for IngestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = IngestError::InvalidPayload {
            message: "expected an object".into(),
        };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_type(), "InvalidPayload");

        let err = IngestError::lookup(StoreError::lookup_failure("timeout"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_type(), "LookupFailed");

        let err = IngestError::write(StoreError::write_failure("throttled"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_type(), "WriteFailed");
    }

    #[test]
    fn test_condition_failure_becomes_conflict() {
        let err = IngestError::write(StoreError::condition_failed("d1", "stale"));
        assert_eq!(err.status_code(), 409);
        assert!(matches!(err, IngestError::Conflict { ref device_id, .. } if device_id == "d1"));
    }

    #[test]
    fn test_write_failure_carries_store_text() {
        let err = IngestError::write(StoreError::write_failure("ProvisionedThroughputExceeded"));
        assert_eq!(
            err.message(),
            "[E103] Write failed: ProvisionedThroughputExceeded"
        );
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn test_normalize_error_is_invalid_payload() {
        let err: IngestError = NormalizeError::NotAnObject("array").into();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().starts_with("Invalid payload:"));
    }
}
