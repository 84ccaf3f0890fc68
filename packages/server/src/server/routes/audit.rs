//! `POST /audit/events` (C7 → C10): append-only audit write endpoint.
//!
//! Used by collaborators outside this core (the chat command surface, the
//! dashboard) to record their own privileged actions through the same
//! sink the ingest routes use internally.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::kernel::audit::{AuditEvent, AuditResult};
use crate::kernel::ServerKernel;
use crate::server::error::{IngestError, IngestResult};

#[derive(Debug, Deserialize)]
pub struct AuditEventRequest {
    source: String,
    action: String,
    result: String,
    actor_provider: String,
    actor_subject: String,
    #[serde(default)]
    actor_display_name: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct AuditEventResponse {
    status: &'static str,
}

const VALID_SOURCES: &[&str] = &["discord", "admin_dashboard"];
const VALID_PROVIDERS: &[&str] = &["discord", "admin_sso"];

pub async fn record_audit_event(
    State(kernel): State<Arc<ServerKernel>>,
    body: axum::body::Bytes,
) -> IngestResult<(axum::http::StatusCode, Json<AuditEventResponse>)> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| IngestError::InvalidJson)?;
    if !payload.is_object() {
        return Err(IngestError::WrongShape("object"));
    }
    let request: AuditEventRequest =
        serde_json::from_value(payload).map_err(|e| IngestError::InvalidPayload(e.to_string()))?;

    if !VALID_SOURCES.contains(&request.source.as_str()) {
        return Err(IngestError::InvalidPayload(format!(
            "source must be one of {VALID_SOURCES:?}"
        )));
    }
    if !VALID_PROVIDERS.contains(&request.actor_provider.as_str()) {
        return Err(IngestError::InvalidPayload(format!(
            "actor_provider must be one of {VALID_PROVIDERS:?}"
        )));
    }
    let result = match request.result.as_str() {
        "success" => AuditResult::Success,
        "denied" => AuditResult::Denied,
        "error" => AuditResult::Error,
        other => {
            return Err(IngestError::InvalidPayload(format!(
                "result must be one of success|denied|error, got {other}"
            )))
        }
    };

    let normalized_subject =
        AuditEvent::normalized_subject(&request.actor_provider, &request.actor_subject);

    kernel
        .audit
        .record(AuditEvent {
            source: request.source,
            action: request.action,
            result,
            actor_provider: request.actor_provider,
            actor_subject: normalized_subject,
            actor_display_name: request.actor_display_name,
            resource_type: request.resource_type,
            resource_id: request.resource_id,
            correlation_id: request.correlation_id,
            person_id: None::<Uuid>,
            metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
        })
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(AuditEventResponse { status: "recorded" }),
    ))
}
