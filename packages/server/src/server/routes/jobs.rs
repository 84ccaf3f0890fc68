//! Ingest API (C7): typed job enqueue and status lookup.
//!
//! Grounded on the original `job_status_handler`: job status queries
//! surface `attempts`, `last_error`, and whatever `result` landed in the
//! payload on success, verbatim.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::kernel::ServerKernel;
use crate::server::error::{IngestError, IngestResult};

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    #[serde(default)]
    args: Value,
    #[serde(default)]
    kwargs: Option<Value>,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    max_attempts: Option<i32>,
    #[serde(default)]
    run_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueJobResponse {
    job_id: Uuid,
    created: bool,
}

/// `POST /jobs/{logical-name}`.
pub async fn enqueue_job(
    State(kernel): State<Arc<ServerKernel>>,
    Path(logical_name): Path<String>,
    body: axum::body::Bytes,
) -> IngestResult<(axum::http::StatusCode, Json<EnqueueJobResponse>)> {
    let request: EnqueueJobRequest = if body.is_empty() {
        EnqueueJobRequest {
            args: Value::Array(vec![]),
            kwargs: None,
            idempotency_key: None,
            max_attempts: None,
            run_after: None,
        }
    } else {
        serde_json::from_slice(&body).map_err(|_| IngestError::InvalidJson)?
    };

    if !request.args.is_null() && !request.args.is_array() {
        return Err(IngestError::InvalidPayload("args must be an array".to_string()));
    }

    let (job_id, created) = kernel
        .enqueue
        .enqueue(
            &logical_name,
            request.args,
            request.kwargs,
            request.idempotency_key.as_deref(),
            request.max_attempts,
            request.run_after,
        )
        .await
        .map_err(IngestError::ServiceUnavailable)?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(EnqueueJobResponse { job_id, created }),
    ))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    job_id: Uuid,
    #[serde(rename = "type")]
    job_type: String,
    status: &'static str,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    result: Option<Value>,
}

/// `GET /jobs/{id}`.
pub async fn get_job_status(
    State(kernel): State<Arc<ServerKernel>>,
    Path(id): Path<Uuid>,
) -> IngestResult<Json<JobStatusResponse>> {
    let job = kernel
        .store
        .get(id)
        .await
        .map_err(IngestError::ServiceUnavailable)?
        .ok_or(IngestError::NotFound)?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        job_type: job.job_type,
        status: job.status.as_db_str(),
        attempts: job.attempts,
        max_attempts: job.max_attempts,
        last_error: job.last_error,
        result: job.result(),
    }))
}
