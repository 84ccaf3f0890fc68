//! Recovery sweeper (C8, background companion).
//!
//! Closes the gap left when the Enqueue Service's broker dispatch step
//! fails after the store write succeeds: a job can sit `queued` or
//! `failed` with `run_after <= now` and no in-flight broker delivery. The
//! sweeper periodically re-invokes the broker for such rows.
//!
//! Sweep frequency is a tradeoff between recovery latency and scan cost;
//! 30 seconds is chosen here and documented in DESIGN.md.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::broker::Broker;
use super::store::JobStore;

pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 30;
const SWEEP_BATCH_SIZE: i64 = 100;

pub async fn run_sweeper(
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    interval_seconds: u64,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = interval.tick() => {
                match store.find_due_for_sweep(SWEEP_BATCH_SIZE).await {
                    Ok(jobs) => {
                        if !jobs.is_empty() {
                            debug!(count = jobs.len(), "sweeper re-dispatching due jobs");
                        }
                        for job in jobs {
                            if let Err(e) = broker.enqueue(job.id, job.run_after).await {
                                warn!(job_id = %job.id, error = %e, "sweeper broker dispatch failed");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "sweeper failed to query due jobs");
                    }
                }
            }
        }
    }
}
