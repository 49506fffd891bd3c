//! Job endpoints
//!
//! Mirrors the serverless platform's local test API: a job body is
//! `{"id": ..., "input": {"text": ..., "voice": ...}}`.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header::CONTENT_TYPE,
    response::Response,
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use telvox_core::JobRequest;
use tracing::info;

use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::state::AppState;

/// Aggregated result of `/runsync`
#[derive(Debug, Serialize)]
pub struct RunSyncResponse {
    pub id: String,
    pub status: &'static str,
    pub output: Vec<Envelope>,
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "engine": state.worker.engine().name(),
        "pipeline": state.worker.profile(),
    }))
}

/// Stream envelopes as newline-delimited JSON while the job runs
pub async fn run(
    State(state): State<AppState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(job) = payload?;
    info!("Streaming job {}", job.id);
    let id = job.id.clone();

    let lines = state.worker.handle(job).map(|event| {
        let mut line = serde_json::to_vec(&Envelope::from(event))?;
        line.push(b'\n');
        Ok::<_, serde_json::Error>(Bytes::from(line))
    });

    Response::builder()
        .header(CONTENT_TYPE, "application/x-ndjson")
        .header("x-job-id", id)
        .body(Body::from_stream(lines))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Run the job to completion and return every envelope at once
pub async fn runsync(
    State(state): State<AppState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Json<RunSyncResponse>, ApiError> {
    let Json(job) = payload?;
    info!("Running job {}", job.id);
    let id = job.id.clone();

    let output: Vec<Envelope> = state
        .worker
        .handle(job)
        .map(Envelope::from)
        .collect()
        .await;

    let status = match output.last() {
        Some(last) if !last.is_error() => "COMPLETED",
        _ => "FAILED",
    };

    Ok(Json(RunSyncResponse { id, status, output }))
}
