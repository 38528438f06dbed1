//! Error types for telemetry store operations.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E101: Configuration missing or invalid
    E101InvalidConfig,
    /// E102: Last-sample lookup failed
    E102LookupFailure,
    /// E103: Write operation failed
    E103WriteFailure,
    /// E104: Full scan failed
    E104ScanFailure,
    /// E105: Conditional write lost to a newer record
    E105ConditionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E101InvalidConfig => "E101",
            Self::E102LookupFailure => "E102",
            Self::E103WriteFailure => "E103",
            Self::E104ScanFailure => "E104",
            Self::E105ConditionFailed => "E105",
        }
    }
}

/// Errors that can occur while talking to a telemetry store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Invalid configuration provided
    #[error("[{code}] Invalid store configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    #[error("[{code}] Lookup failed: {message}")]
    LookupFailure { code: &'static str, message: String },

    #[error("[{code}] Write failed: {message}")]
    WriteFailure { code: &'static str, message: String },

    #[error("[{code}] Scan failed: {message}")]
    ScanFailure { code: &'static str, message: String },

    /// Another writer stored a newer record for the device first
    #[error("[{code}] Conditional write rejected for device '{device_id}': {message}")]
    ConditionFailed {
        code: &'static str,
        device_id: String,
        message: String,
    },
}

impl StoreError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E101InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn lookup_failure(message: impl Into<String>) -> Self {
        Self::LookupFailure {
            code: ErrorCode::E102LookupFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::WriteFailure {
            code: ErrorCode::E103WriteFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn scan_failure(message: impl Into<String>) -> Self {
        Self::ScanFailure {
            code: ErrorCode::E104ScanFailure.as_str(),
            message: message.into(),
        }
    }

    pub fn condition_failed(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConditionFailed {
            code: ErrorCode::E105ConditionFailed.as_str(),
            device_id: device_id.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { code, .. }
            | Self::LookupFailure { code, .. }
            | Self::WriteFailure { code, .. }
            | Self::ScanFailure { code, .. }
            | Self::ConditionFailed { code, .. } => code,
        }
    }

    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}

/// Result type alias for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
