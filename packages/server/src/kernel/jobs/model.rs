//! Persisted job model (C1 data shape).
//!
//! Mirrors `jobs` table columns one-to-one. `payload` holds `args`, `kwargs`
//! and, once a job succeeds, a merged `result` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job lifecycle status. `failed` is transient: it means "awaiting retry",
/// not terminal. Terminal states are `succeeded`, `dead`, `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Dead,
    Canceled,
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Unknown values from the database are coerced to `failed` and logged
    /// by the caller rather than panicking.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            "dead" => JobStatus::Dead,
            "canceled" => JobStatus::Canceled,
            other => {
                tracing::warn!(status = other, "unknown job status coerced to failed");
                JobStatus::Failed
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Dead | JobStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory view of a job row with `status` parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            job_type: row.job_type,
            status: JobStatus::from_db_str(&row.status),
            payload: row.payload,
            idempotency_key: row.idempotency_key,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_after: row.run_after,
            locked_at: row.locked_at,
            locked_by: row.locked_by,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Job {
    /// Args/kwargs view of the payload, as handed to a handler.
    pub fn args(&self) -> Value {
        self.payload
            .get("args")
            .cloned()
            .unwrap_or(Value::Array(vec![]))
    }

    pub fn kwargs(&self) -> Value {
        self.payload
            .get("kwargs")
            .cloned()
            .unwrap_or(Value::Object(Default::default()))
    }

    pub fn result(&self) -> Option<Value> {
        self.payload.get("result").cloned()
    }

    pub fn build_payload(args: Value, kwargs: Option<Value>) -> Value {
        serde_json::json!({
            "args": args,
            "kwargs": kwargs.unwrap_or(Value::Object(Default::default())),
        })
    }
}
