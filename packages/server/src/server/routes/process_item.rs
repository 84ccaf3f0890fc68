//! `POST /process-item/{id}` — manual single-item enqueue (C7).
//!
//! Grounded on the original `process_contact_handler`: the idempotency
//! key includes a fresh nonce (the request timestamp) so repeated calls
//! against the same id always produce a fresh job rather than collapsing
//! into one, unlike the webhook paths.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::handlers::webhook::JOB_TYPE as WEBHOOK_GENERIC;
use crate::kernel::ServerKernel;
use crate::server::error::{IngestError, IngestResult};

#[derive(Debug, Serialize)]
pub struct ProcessItemResponse {
    status: &'static str,
    source: &'static str,
    item_id: String,
    job_id: uuid::Uuid,
}

pub async fn process_item(
    State(kernel): State<Arc<ServerKernel>>,
    Path(item_id): Path<String>,
) -> IngestResult<(axum::http::StatusCode, Json<ProcessItemResponse>)> {
    let nonce = Utc::now().to_rfc3339();
    let key = format!("manual:{item_id}:{nonce}");

    let (job_id, _created) = kernel
        .enqueue
        .enqueue(
            WEBHOOK_GENERIC,
            serde_json::json!(["manual", {"id": item_id.clone()}]),
            None,
            Some(&key),
            None,
            None,
        )
        .await
        .map_err(IngestError::ServiceUnavailable)?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(ProcessItemResponse {
            status: "queued",
            source: "manual",
            item_id,
            job_id,
        }),
    ))
}
