// Platform detection based on environment variables
//
// Auto-detects runtime environment:
// - AWS Lambda: AWS_LAMBDA_FUNCTION_NAME env var present
// - Server: otherwise (default)

use crate::LogFormat;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Server,
    Lambda,
}

impl Platform {
    /// Auto-detect the current platform based on environment variables
    pub fn detect() -> Self {
        if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
            Platform::Lambda
        } else {
            Platform::Server
        }
    }

    /// Get platform-specific defaults
    pub fn defaults(&self) -> PlatformDefaults {
        match self {
            Platform::Server => PlatformDefaults {
                max_payload_bytes: 256 * 1024, // 256 KB
                storage_backend: "memory",
                log_format: LogFormat::Text,
                serves_http: true,
            },
            Platform::Lambda => PlatformDefaults {
                max_payload_bytes: 6 * 1024 * 1024, // 6 MB invoke limit
                storage_backend: "dynamodb",
                log_format: LogFormat::Json,
                serves_http: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformDefaults {
    pub max_payload_bytes: usize,
    pub storage_backend: &'static str,
    pub log_format: LogFormat,
    pub serves_http: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_defaults() {
        let server = Platform::Server.defaults();
        assert_eq!(server.storage_backend, "memory");
        assert!(server.serves_http);

        let lambda = Platform::Lambda.defaults();
        assert_eq!(lambda.storage_backend, "dynamodb");
        assert_eq!(lambda.log_format, LogFormat::Json);
        assert!(!lambda.serves_http);
    }
}
