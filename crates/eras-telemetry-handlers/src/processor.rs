use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use eras_telemetry_common::{
    normalize_bytes, normalize_event, NormalizeError, NormalizedPayload, TelemetryRecord,
    TelemetrySample,
};
use eras_telemetry_config::{FilterConfig, WriteMode};
use eras_telemetry_store::TelemetryStore;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::filter::{ChangeFilter, FilterDecision};
use crate::finalizer::RecordFinalizer;

pub const STORED_MESSAGE: &str = "Stored successfully";
pub const FILTERED_MESSAGE: &str = "Filtered";

/// Ingestion policy, derived from the `[filter]` config section.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub change_threshold: Decimal,
    pub ttl_horizon_secs: i64,
    pub default_device_id: String,
    pub write_mode: WriteMode,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from(&FilterConfig::default())
    }
}

impl From<&FilterConfig> for IngestConfig {
    fn from(config: &FilterConfig) -> Self {
        Self {
            change_threshold: config.change_threshold,
            ttl_horizon_secs: config.ttl_horizon_secs(),
            default_device_id: config.default_device_id.clone(),
            write_mode: config.write_mode,
        }
    }
}

/// Terminal result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored(TelemetryRecord),
    Filtered { device_id: String, delta: Decimal },
    Error(IngestError),
}

impl IngestOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Stored(_) | Self::Filtered { .. } => 200,
            Self::Error(err) => err.status_code(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Stored(_) => STORED_MESSAGE.to_string(),
            Self::Filtered { .. } => FILTERED_MESSAGE.to_string(),
            Self::Error(err) => err.message(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored(_) => "stored",
            Self::Filtered { .. } => "filtered",
            Self::Error(_) => "error",
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered { .. })
    }

    pub fn error(&self) -> Option<&IngestError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Normalize, filter, finalize and store one event at a time.
///
/// Holds no per-device state; every decision is made against what the store
/// returns, so one instance is shared across concurrent invocations.
pub struct TelemetryIngestor {
    store: Arc<dyn TelemetryStore>,
    filter: ChangeFilter,
    finalizer: RecordFinalizer,
    config: IngestConfig,
}

impl TelemetryIngestor {
    pub fn new(store: Arc<dyn TelemetryStore>, config: IngestConfig) -> Self {
        Self {
            store,
            filter: ChangeFilter::new(config.change_threshold),
            finalizer: RecordFinalizer::new(config.ttl_horizon_secs),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest a decoded JSON event.
    pub async fn ingest(&self, event: JsonValue) -> IngestOutcome {
        let payload = normalize_event(event, &self.config.default_device_id);
        self.run(payload, Utc::now()).await
    }

    /// Ingest a raw request body.
    pub async fn ingest_bytes(&self, body: &[u8]) -> IngestOutcome {
        let payload = normalize_bytes(body, &self.config.default_device_id);
        self.run(payload, Utc::now()).await
    }

    /// Same as [`ingest`](Self::ingest) with a caller-supplied clock reading.
    pub async fn ingest_at(&self, event: JsonValue, now: DateTime<Utc>) -> IngestOutcome {
        let payload = normalize_event(event, &self.config.default_device_id);
        self.run(payload, now).await
    }

    async fn run(
        &self,
        payload: Result<NormalizedPayload, NormalizeError>,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        let start = Instant::now();
        counter!("telemetry.ingest.requests").increment(1);

        let outcome = match payload {
            Ok(payload) => match self.process(payload, now).await {
                Ok(outcome) => outcome,
                Err(err) => IngestOutcome::Error(err),
            },
            Err(err) => IngestOutcome::Error(err.into()),
        };

        match &outcome {
            IngestOutcome::Stored(_) => counter!("telemetry.ingest.stored").increment(1),
            IngestOutcome::Filtered { .. } => counter!("telemetry.ingest.filtered").increment(1),
            IngestOutcome::Error(err) => {
                counter!("telemetry.ingest.errors", "type" => err.error_type()).increment(1);
                warn!(
                    error_type = err.error_type(),
                    status = err.status_code(),
                    "Telemetry ingestion failed: {}",
                    err.message()
                );
            }
        }
        histogram!("telemetry.ingest.latency_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        outcome
    }

    async fn process(
        &self,
        payload: NormalizedPayload,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let sample = TelemetrySample::from_payload(payload)?;
        let device_id = sample.device_id.clone();

        let previous = self
            .store
            .latest(&device_id)
            .await
            .map_err(IngestError::lookup)?;

        let decision = self.filter.evaluate(&sample, previous.as_ref());
        let reason = match decision {
            FilterDecision::Reject { delta } => {
                debug!(
                    device_id = %device_id,
                    delta = %delta,
                    threshold = %self.filter.threshold(),
                    "Change below threshold; sample filtered"
                );
                return Ok(IngestOutcome::Filtered { device_id, delta });
            }
            FilterDecision::Accept(reason) => reason,
        };

        let record = self.finalizer.finalize(sample, previous.as_ref(), now);

        let written = match self.config.write_mode {
            WriteMode::BestEffort => self.store.put(&record).await,
            WriteMode::Conditional => {
                let expected = previous.as_ref().map(|p| &p.timestamp);
                self.store.put_if_latest(&record, expected).await
            }
        };
        written.map_err(IngestError::write)?;

        info!(
            device_id = %device_id,
            timestamp = %record.timestamp_key(),
            ttl = record.ttl,
            reason = ?reason,
            "Telemetry sample stored"
        );

        Ok(IngestOutcome::Stored(record))
    }
}
