// HTTP request handlers for server mode
//
// Implements telemetry ingestion, the read surface, the operator view and
// health check endpoints

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde_json::json;
use tracing::debug;

use eras_telemetry_common::format_timestamp;
use eras_telemetry_handlers::{IngestOutcome, FILTERED_MESSAGE, STORED_MESSAGE};

use crate::view::build_snapshot;
use crate::{AppError, AppState};

/// POST /v1/telemetry - ingest one device payload
pub(crate) async fn handle_ingest(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let max_payload = state.max_payload_bytes;

    // The router's body limit is max_payload_bytes; streamed bodies trip it here
    let body = body.map_err(|rejection| {
        let status = rejection.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            counter!("telemetry.ingest.rejected").increment(1);
        }
        AppError::with_status(
            status,
            anyhow::anyhow!("{} (limit {} bytes)", rejection.body_text(), max_payload),
        )
    })?;

    debug!("Received telemetry request ({} bytes)", body.len());

    if body.len() > max_payload {
        counter!("telemetry.ingest.rejected").increment(1);
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow::anyhow!("payload {} exceeds limit {}", body.len(), max_payload),
        ));
    }

    let outcome = state.ingestor.ingest_bytes(&body).await;
    let status = StatusCode::from_u16(outcome.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match outcome {
        IngestOutcome::Stored(record) => Ok((
            status,
            Json(json!({
                "status": "stored",
                "message": STORED_MESSAGE,
                "device_id": record.device_id(),
                "timestamp": format_timestamp(&record.timestamp),
                "ttl": record.ttl,
            })),
        )
            .into_response()),
        IngestOutcome::Filtered { device_id, delta } => Ok((
            status,
            Json(json!({
                "status": "filtered",
                "message": FILTERED_MESSAGE,
                "device_id": device_id,
                "delta": delta.to_string(),
            })),
        )
            .into_response()),
        IngestOutcome::Error(err) => Err(AppError::with_status(
            status,
            anyhow::anyhow!(err.message()),
        )
        .with_type(err.error_type())),
    }
}

/// GET /v1/telemetry - every stored record
pub(crate) async fn list_records(State(state): State<AppState>) -> Result<Response, AppError> {
    let mut records = state.store.scan().await.map_err(AppError::internal)?;
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(Json(records).into_response())
}

/// GET /v1/dashboard - operator view snapshot
pub(crate) async fn dashboard(State(state): State<AppState>) -> Result<Response, AppError> {
    let records = state.store.scan().await.map_err(AppError::internal)?;
    let snapshot = build_snapshot(records, &state.view);
    Ok(Json(snapshot).into_response())
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "backend": state.store.backend_name(),
        })),
    )
}
