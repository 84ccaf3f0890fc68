//! Audit Sink (C10).
//!
//! Append-only log of privileged, human-initiated actions. Writes are
//! best-effort and asynchronous: a failure to persist an audit event must
//! never fail the operation it accompanies, only log a warning.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditResult {
    Success,
    Denied,
    Error,
}

impl AuditResult {
    fn as_db_str(&self) -> &'static str {
        match self {
            AuditResult::Success => "success",
            AuditResult::Denied => "denied",
            AuditResult::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub source: String,
    pub action: String,
    pub result: AuditResult,
    pub actor_provider: String,
    pub actor_subject: String,
    pub actor_display_name: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub correlation_id: Option<String>,
    pub person_id: Option<Uuid>,
    pub metadata: Value,
}

impl AuditEvent {
    /// Normalizes the actor subject: lowercase email for SSO-sourced
    /// events, raw id for chat-sourced ones.
    pub fn normalized_subject(provider: &str, raw_subject: &str) -> String {
        if provider == "admin_sso" {
            raw_subject.to_lowercase()
        } else {
            raw_subject.to_string()
        }
    }
}

pub struct AuditSink {
    pool: PgPool,
}

impl AuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists one event. Insertion order is preserved per actor because
    /// this is a single `INSERT`, invoked synchronously in request order
    /// by the caller; the caller should `tokio::spawn` this if it wants
    /// fire-and-forget semantics, but must still await it before returning
    /// in contexts where ordering for the same actor matters.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.try_record(&event).await {
            tracing::warn!(
                action = %event.action,
                actor_subject = %event.actor_subject,
                error = %e,
                "failed to persist audit event"
            );
        }
    }

    async fn try_record(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                id, occurred_at, source, action, result,
                actor_provider, actor_subject, actor_display_name,
                resource_type, resource_id, correlation_id, person_id, metadata
            ) VALUES (gen_random_uuid(), NOW(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&event.source)
        .bind(&event.action)
        .bind(event.result.as_db_str())
        .bind(&event.actor_provider)
        .bind(&event.actor_subject)
        .bind(&event.actor_display_name)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.correlation_id)
        .bind(event.person_id)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await
        .context("inserting audit event")?;

        Ok(())
    }
}
