//! Postgres-backed Job Store (C1) and Idempotency Index (C2).
//!
//! C2 is not a separate service: it is the `idempotency_key` unique
//! constraint on `jobs`, enforced by the database. `create` below never
//! relies on a prior `SELECT`; it races the `INSERT ... ON CONFLICT` against
//! the constraint itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{Job, JobRow};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(
        &self,
        job_type: &str,
        payload: Value,
        idempotency_key: Option<&str>,
        max_attempts: i32,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(Uuid, bool)>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Atomically claims up to `limit` ready jobs for `worker_id`. Ready
    /// means `status IN ('queued', 'failed')` and `run_after <= now()` (or
    /// null). Used by the Worker Runner after a broker wake-up and by the
    /// recovery sweeper's poll fallback.
    async fn claim_ready(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    /// Marks a single job running for `worker_id`. Only succeeds (returns
    /// `true`) if the row was in `queued` or `failed` — this is the sole
    /// mutual-exclusion point between the poll loop and a broker delivery.
    async fn mark_running(&self, id: Uuid, worker_id: &str) -> Result<bool>;

    async fn mark_succeeded(&self, id: Uuid, result: Option<Value>) -> Result<()>;

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        run_after: DateTime<Utc>,
        error: &str,
    ) -> Result<()>;

    async fn mark_dead(&self, id: Uuid, attempts: i32, error: &str) -> Result<()>;

    /// Jobs eligible for sweeper re-dispatch: `queued` or `failed` with
    /// `run_after <= now` and not currently locked.
    async fn find_due_for_sweep(&self, limit: i64) -> Result<Vec<Job>>;
}

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Truncates an error message to fit the `last_error` column, per spec
/// section 4.6's "Error string" rule.
pub fn truncate_error(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

const LAST_ERROR_MAX_LEN: usize = 2000;

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(
        &self,
        job_type: &str,
        payload: Value,
        idempotency_key: Option<&str>,
        max_attempts: i32,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(Uuid, bool)> {
        if let Some(key) = idempotency_key {
            let row = sqlx::query_as::<_, JobRow>(
                r#"
                INSERT INTO jobs (id, type, status, payload, idempotency_key, attempts, max_attempts, run_after)
                VALUES (gen_random_uuid(), $1, 'queued', $2, $3, 0, $4, $5)
                ON CONFLICT (idempotency_key) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(job_type)
            .bind(&payload)
            .bind(key)
            .bind(max_attempts)
            .bind(run_after)
            .fetch_optional(&self.pool)
            .await
            .context("inserting job")?;

            if let Some(row) = row {
                return Ok((row.id, true));
            }

            let existing = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM jobs WHERE idempotency_key = $1",
            )
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context("looking up existing job by idempotency key")?;

            return Ok((existing.id, false));
        }

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, type, status, payload, idempotency_key, attempts, max_attempts, run_after)
            VALUES (gen_random_uuid(), $1, 'queued', $2, NULL, 0, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job_type)
        .bind(&payload)
        .bind(max_attempts)
        .bind(run_after)
        .fetch_one(&self.pool)
        .await
        .context("inserting job without idempotency key")?;

        Ok((row.id, true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching job by id")?;
        Ok(row.map(Job::from))
    }

    async fn claim_ready(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running', locked_by = $1, locked_at = NOW(), run_after = NULL
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status IN ('queued', 'failed')
                  AND (run_after IS NULL OR run_after <= NOW())
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("claiming ready jobs")?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn mark_running(&self, id: Uuid, worker_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', locked_by = $2, locked_at = NOW(), run_after = NULL
            WHERE id = $1 AND status IN ('queued', 'failed')
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .context("marking job running")?;

        Ok(row.rows_affected() == 1)
    }

    async fn mark_succeeded(&self, id: Uuid, result: Option<Value>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                locked_by = NULL,
                locked_at = NULL,
                last_error = NULL,
                payload = CASE WHEN $2::jsonb IS NULL THEN payload ELSE payload || jsonb_build_object('result', $2::jsonb) END
            WHERE id = $1 AND status != 'canceled'
            "#,
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await
        .context("marking job succeeded")?;

        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        run_after: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        let truncated = truncate_error(error, LAST_ERROR_MAX_LEN);
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', attempts = $2, run_after = $3, last_error = $4,
                locked_by = NULL, locked_at = NULL
            WHERE id = $1 AND status != 'canceled'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(run_after)
        .bind(truncated)
        .execute(&self.pool)
        .await
        .context("marking job for retry")?;

        Ok(())
    }

    async fn mark_dead(&self, id: Uuid, attempts: i32, error: &str) -> Result<()> {
        let truncated = truncate_error(error, LAST_ERROR_MAX_LEN);
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead', attempts = $2, last_error = $3, locked_by = NULL, locked_at = NULL
            WHERE id = $1 AND status != 'canceled'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(truncated)
        .execute(&self.pool)
        .await
        .context("marking job dead")?;

        Ok(())
    }

    async fn find_due_for_sweep(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('queued', 'failed')
              AND (run_after IS NULL OR run_after <= NOW())
            ORDER BY run_after NULLS FIRST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("finding jobs due for sweep")?;

        Ok(rows.into_iter().map(Job::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_error_short_unchanged() {
        assert_eq!(truncate_error("boom", 100), "boom");
    }

    #[test]
    fn truncate_error_long_truncated() {
        let long = "x".repeat(10);
        let truncated = truncate_error(&long, 4);
        assert_eq!(truncated, "xxxx...");
    }
}
