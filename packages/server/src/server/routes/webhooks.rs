//! Ingest API (C7): webhook endpoints.
//!
//! Both webhook shapes share the path `POST /webhooks/{source}`; the body
//! decides which one applies, since distinct domain sources are not known
//! statically by this core, which excludes CRM/Discord sync and keeps no
//! fixed source list. A JSON object
//! takes the generic path, keyed by its own `id` field if present. A JSON
//! array takes the schema-validated, possibly-multi-event path, grounded
//! on the original `espocrm_webhook_handler`: each array element must be
//! `{id, name?}` and becomes its own job.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handlers::webhook::JOB_TYPE as WEBHOOK_GENERIC;
use crate::kernel::ServerKernel;
use crate::server::error::{IngestError, IngestResult};

#[derive(Debug, Serialize)]
pub struct GenericWebhookResponse {
    status: &'static str,
    job_id: uuid::Uuid,
    source: String,
}

/// `POST /webhooks/{source}` entrypoint: dispatches to the generic or
/// array-of-events path by body shape.
pub async fn webhook_entrypoint(
    state: State<Arc<ServerKernel>>,
    path: Path<String>,
    body: axum::body::Bytes,
) -> IngestResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let payload: Value = serde_json::from_slice(&body).map_err(|_| IngestError::InvalidJson)?;
    if payload.is_array() {
        Ok(domain_webhook(state, path, payload).await?.into_response())
    } else {
        Ok(generic_webhook(state, path, payload).await?.into_response())
    }
}

/// Generic path: the body is a JSON object, keyed by its own `id` field.
async fn generic_webhook(
    State(kernel): State<Arc<ServerKernel>>,
    Path(source): Path<String>,
    payload: Value,
) -> IngestResult<(axum::http::StatusCode, Json<GenericWebhookResponse>)> {
    if !payload.is_object() {
        return Err(IngestError::WrongShape("object"));
    }

    let idempotency_key = payload
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("{source}:{id}"));

    let (job_id, _created) = kernel
        .enqueue
        .enqueue(
            WEBHOOK_GENERIC,
            serde_json::json!([source, payload]),
            None,
            idempotency_key.as_deref(),
            None,
            None,
        )
        .await
        .map_err(IngestError::ServiceUnavailable)?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(GenericWebhookResponse {
            status: "queued",
            job_id,
            source,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct DomainWebhookEvent {
    id: String,
    #[allow(dead_code)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnqueuedEvent {
    event_id: String,
    job_id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
pub struct DomainWebhookResponse {
    status: &'static str,
    domain: String,
    events_received: usize,
    events_enqueued: usize,
    jobs: Vec<EnqueuedEvent>,
}

/// `POST /webhooks/{domain}` — an array-of-events webhook. Each event
/// collapses into its own job keyed `"<domain>:<event-id>"`; duplicate
/// deliveries of the same event id produce no new job.
async fn domain_webhook(
    State(kernel): State<Arc<ServerKernel>>,
    Path(domain): Path<String>,
    payload: Value,
) -> IngestResult<(axum::http::StatusCode, Json<DomainWebhookResponse>)> {
    let Value::Array(items) = payload else {
        return Err(IngestError::WrongShape("array_of_events"));
    };

    let mut events = Vec::with_capacity(items.len());
    for item in &items {
        let event: DomainWebhookEvent = serde_json::from_value(item.clone())
            .map_err(|e| IngestError::InvalidPayload(e.to_string()))?;
        events.push(event);
    }

    let events_received = events.len();
    let mut jobs = Vec::with_capacity(events_received);

    for event in events {
        let key = format!("{domain}:{}", event.id);
        let (job_id, _created) = kernel
            .enqueue
            .enqueue(
                WEBHOOK_GENERIC,
                serde_json::json!([domain, {"id": event.id.clone()}]),
                None,
                Some(&key),
                None,
                None,
            )
            .await
            .map_err(IngestError::ServiceUnavailable)?;
        jobs.push(EnqueuedEvent {
            event_id: event.id,
            job_id,
        });
    }

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(DomainWebhookResponse {
            status: "queued",
            events_enqueued: jobs.len(),
            events_received,
            domain,
            jobs,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_event_requires_id() {
        let bad = serde_json::json!({"name": "no id here"});
        let result: Result<DomainWebhookEvent, _> = serde_json::from_value(bad);
        assert!(result.is_err());
    }

    #[test]
    fn domain_event_name_optional() {
        let ok = serde_json::json!({"id": "c-1"});
        let event: DomainWebhookEvent = serde_json::from_value(ok).unwrap();
        assert_eq!(event.id, "c-1");
        assert_eq!(event.name, None);
    }
}
