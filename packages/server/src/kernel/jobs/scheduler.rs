//! Scheduler (C8).
//!
//! A set of long-running, fixed-interval loops. Each tick calls the
//! Enqueue Service with a bucketed idempotency key
//! (`"<job-type>:<timestamp // interval_seconds>"`) so that concurrent
//! scheduler instances collapse to at most one job per window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::enqueue::EnqueueService;

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub job_type: &'static str,
    pub interval_seconds: i64,
}

/// Runs one scheduled task's tick loop until `cancel` fires. Cancellation
/// is observed between ticks; an in-flight enqueue call is always allowed
/// to finish.
pub async fn run_scheduled_task(
    task: ScheduledTask,
    enqueue: Arc<EnqueueService>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(task.interval_seconds.max(1) as u64));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(job_type = task.job_type, "scheduler task cancelled");
                break;
            }
            _ = interval.tick() => {
                let bucket = Utc::now().timestamp() / task.interval_seconds.max(1);
                let key = format!("{}:{}", task.job_type, bucket);

                match enqueue
                    .enqueue(task.job_type, serde_json::json!([]), None, Some(&key), None, None)
                    .await
                {
                    Ok((id, created)) => {
                        if created {
                            info!(job_type = task.job_type, job_id = %id, "scheduler enqueued job");
                        } else {
                            tracing::debug!(job_type = task.job_type, bucket, "scheduler tick collapsed into existing job");
                        }
                    }
                    Err(e) => {
                        tracing::error!(job_type = task.job_type, error = %e, "scheduler enqueue failed");
                    }
                }
            }
        }
    }
}

/// Spawns every configured scheduled task as its own background task,
/// returning a handle that cancels all of them together.
pub fn spawn_scheduler(
    tasks: Vec<ScheduledTask>,
    enqueue: Arc<EnqueueService>,
) -> (CancellationToken, Vec<tokio::task::JoinHandle<()>>) {
    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let enqueue = enqueue.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(run_scheduled_task(task, enqueue, cancel)));
    }

    (cancel, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_collapses_within_interval() {
        let interval_seconds: i64 = 60;
        let t1: i64 = 1_000_000;
        let t2: i64 = 1_000_030;
        let t3: i64 = 1_000_061;

        assert_eq!(t1 / interval_seconds, t2 / interval_seconds);
        assert_ne!(t1 / interval_seconds, t3 / interval_seconds);
    }
}
