//! Worker Runner (C6).
//!
//! Claims jobs (woken by a broker notification or, absent one, its own
//! poll interval), executes the registered handler, and transitions the
//! job's terminal or retry state. Concurrency safety comes from the
//! store-level claim (`mark_running`/`claim_ready`), not from anything
//! in this process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::broker::Broker;
use super::registry::SharedHandlerRegistry;
use super::store::JobStore;
use crate::kernel::ServerKernel;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub worker_id: String,
    pub retry_base_seconds: i64,
    pub retry_max_seconds: i64,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::new_v4()),
            retry_base_seconds: 5,
            retry_max_seconds: 300,
        }
    }
}

pub struct JobRunner {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    registry: SharedHandlerRegistry,
    kernel: Arc<ServerKernel>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<dyn Broker>,
        registry: SharedHandlerRegistry,
        kernel: Arc<ServerKernel>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            store,
            broker,
            registry,
            kernel,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Runs until shutdown is requested. Shutdown is observed between
    /// jobs, never mid-job.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "worker runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self
                .store
                .claim_ready(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            for job in jobs {
                if self.is_shutdown_requested() {
                    break;
                }
                self.process_claimed(job.id, &job.job_type, job.attempts, job.max_attempts, job.args(), job.kwargs())
                    .await;
            }
        }

        info!(worker_id = %self.config.worker_id, "worker runner stopped");
        Ok(())
    }

    /// Processes a single already-`running` job (claimed either by
    /// `claim_ready` above or directly by `handle_delivery` below).
    async fn process_claimed(
        &self,
        job_id: Uuid,
        job_type: &str,
        attempts: i32,
        max_attempts: i32,
        args: serde_json::Value,
        kwargs: serde_json::Value,
    ) {
        if !self.registry.is_registered(job_type) {
            warn!(job_id = %job_id, job_type, "unknown job type; marking dead");
            if let Err(e) = self.store.mark_dead(job_id, attempts, "unknown-type").await {
                error!(job_id = %job_id, error = %e, "failed to mark unknown-type job dead");
            }
            return;
        }

        let result = self
            .registry
            .execute(job_type, args, kwargs, self.kernel.clone())
            .await;

        match result {
            Ok(value) => {
                info!(job_id = %job_id, job_type, "job succeeded");
                if let Err(e) = self.store.mark_succeeded(job_id, value).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job succeeded");
                }
            }
            Err(e) => {
                let next_attempts = attempts + 1;
                let error_string = format!("{e:#}");
                warn!(job_id = %job_id, job_type, attempts = next_attempts, error = %error_string, "job failed");

                if next_attempts >= max_attempts {
                    if let Err(mark_err) = self.store.mark_dead(job_id, next_attempts, &error_string).await {
                        error!(job_id = %job_id, error = %mark_err, "failed to mark job dead");
                    }
                    return;
                }

                let delay_seconds = (self.config.retry_base_seconds
                    * 2i64.pow((next_attempts - 1).max(0) as u32))
                .min(self.config.retry_max_seconds);
                let run_after = chrono::Utc::now() + chrono::Duration::seconds(delay_seconds);

                if let Err(mark_err) = self
                    .store
                    .mark_retry(job_id, next_attempts, run_after, &error_string)
                    .await
                {
                    error!(job_id = %job_id, error = %mark_err, "failed to mark job for retry");
                    return;
                }

                if let Err(broker_err) = self.broker.enqueue(job_id, Some(run_after)).await {
                    warn!(job_id = %job_id, error = %broker_err, "broker redelivery request failed; sweeper will recover");
                }
            }
        }
    }

    /// Handles a single `job_id` delivered by the broker: loads it, checks
    /// terminal/ownership, claims it, and executes. This is the push-path
    /// counterpart to the poll loop in `run()` above — both funnel into
    /// `process_claimed`.
    pub async fn handle_delivery(&self, job_id: Uuid) -> Result<()> {
        let Some(job) = self.store.get(job_id).await? else {
            warn!(job_id = %job_id, "delivered job not found; ignoring");
            return Ok(());
        };

        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = ?job.status, "delivered job already terminal; skipping");
            return Ok(());
        }

        if job.status == super::model::JobStatus::Running
            && job.locked_by.as_deref() != Some(self.config.worker_id.as_str())
        {
            debug!(job_id = %job_id, "job already running under another worker; skipping");
            return Ok(());
        }

        let claimed = self.store.mark_running(job_id, &self.config.worker_id).await?;
        if !claimed {
            debug!(job_id = %job_id, "lost the claim race; skipping");
            return Ok(());
        }

        self.process_claimed(job_id, &job.job_type, job.attempts, job.max_attempts, job.args(), job.kwargs())
            .await;
        Ok(())
    }

    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });
        self.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = JobRunnerConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.retry_base_seconds, 5);
        assert_eq!(config.retry_max_seconds, 300);
        assert!(config.worker_id.starts_with("runner-"));
    }

    #[test]
    fn backoff_caps_at_max() {
        let base: i64 = 5;
        let cap: i64 = 300;
        let delay = |attempt: i64| (base * 2i64.pow((attempt - 1) as u32)).min(cap);
        assert_eq!(delay(1), 5);
        assert_eq!(delay(2), 10);
        assert_eq!(delay(3), 20);
        assert_eq!(delay(10), 300);
    }
}
