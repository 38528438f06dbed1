//! Telemetry ingestion: change filtering, record finalization and the
//! per-invocation processor shared by the Lambda and HTTP transports.

pub mod error;
pub mod filter;
pub mod finalizer;
pub mod processor;

pub use error::IngestError;
pub use filter::{AcceptReason, ChangeFilter, FilterDecision};
pub use finalizer::RecordFinalizer;
pub use processor::{
    IngestConfig, IngestOutcome, TelemetryIngestor, FILTERED_MESSAGE, STORED_MESSAGE,
};
