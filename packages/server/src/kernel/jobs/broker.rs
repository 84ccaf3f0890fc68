//! Broker Adapter (C3).
//!
//! Advisory delivery of `job_id` to workers. The broker is never
//! authoritative: C1 is the source of truth, and a lost or delayed
//! delivery is recovered by the sweeper (see `sweeper.rs`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::kernel::nats::NatsPublisher;

pub const JOBS_READY_SUBJECT: &str = "jobs.ready";

#[async_trait]
pub trait Broker: Send + Sync {
    /// Triggers worker attention for `job_id`. If `run_at` is in the
    /// future, delivery must be delayed by at least `run_at - now`;
    /// delivering early is a bug, delivering late is tolerable.
    async fn enqueue(&self, job_id: Uuid, run_at: Option<chrono::DateTime<Utc>>) -> Result<()>;

    /// Liveness check used by the health endpoint.
    async fn ping(&self) -> Result<()>;

    /// Subscribes to job-ready notifications, yielding the `job_id` of each
    /// delivered message. The push-path counterpart to the Worker Runner's
    /// own poll loop; advisory only, same as `enqueue`.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Uuid>>;
}

/// Publishes job-ready notifications over NATS. Delay is implemented as a
/// spawned sleep-then-publish task rather than a broker-native scheduled
/// delivery feature, since the broker is advisory only — losing the delayed
/// publish (process restart mid-sleep) is exactly the gap the sweeper
/// exists to close.
pub struct NatsBroker {
    publisher: Arc<dyn NatsPublisher>,
}

impl NatsBroker {
    pub fn new(publisher: Arc<dyn NatsPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn enqueue(&self, job_id: Uuid, run_at: Option<chrono::DateTime<Utc>>) -> Result<()> {
        let payload = Bytes::from(job_id.to_string());

        let delay = run_at.and_then(|at| {
            let millis = (at - Utc::now()).num_milliseconds();
            if millis > 0 {
                Some(Duration::from_millis(millis as u64))
            } else {
                None
            }
        });

        match delay {
            None => {
                self.publisher
                    .publish(JOBS_READY_SUBJECT.to_string(), payload)
                    .await?;
            }
            Some(delay) => {
                let publisher = self.publisher.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = publisher
                        .publish(JOBS_READY_SUBJECT.to_string(), payload)
                        .await
                    {
                        tracing::warn!(error = %e, "delayed broker publish failed");
                    }
                });
            }
        }

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        // NatsPublisher has no dedicated health probe; a successful publish
        // to a throwaway subject is the liveness signal.
        self.publisher
            .publish("jobs.health".to_string(), Bytes::new())
            .await
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Uuid>> {
        let mut payloads = self.publisher.subscribe(JOBS_READY_SUBJECT.to_string()).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(payload) = payloads.recv().await {
                let Ok(text) = std::str::from_utf8(&payload) else {
                    continue;
                };
                let Ok(job_id) = Uuid::parse_str(text.trim()) else {
                    continue;
                };
                if tx.send(job_id).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::nats::TestNats;

    #[tokio::test]
    async fn enqueue_without_run_at_publishes_immediately() {
        let nats = Arc::new(TestNats::new());
        let broker = NatsBroker::new(nats.clone());

        let id = Uuid::new_v4();
        broker.enqueue(id, None).await.unwrap();

        assert!(nats.was_published_to(JOBS_READY_SUBJECT));
        assert_eq!(nats.publish_count_for(JOBS_READY_SUBJECT), 1);
    }

    #[tokio::test]
    async fn enqueue_with_past_run_at_publishes_immediately() {
        let nats = Arc::new(TestNats::new());
        let broker = NatsBroker::new(nats.clone());

        let id = Uuid::new_v4();
        broker
            .enqueue(id, Some(Utc::now() - chrono::Duration::seconds(5)))
            .await
            .unwrap();

        assert!(nats.was_published_to(JOBS_READY_SUBJECT));
    }

    #[tokio::test]
    async fn subscribe_records_subscription_to_jobs_ready() {
        let nats = Arc::new(TestNats::new());
        let broker = NatsBroker::new(nats.clone());

        let _rx = broker.subscribe().await.unwrap();

        assert!(nats.was_subscribed_to(JOBS_READY_SUBJECT));
    }
}
