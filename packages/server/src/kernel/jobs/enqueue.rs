//! Enqueue Service (C4).
//!
//! Builds the payload document, writes through C1 (guarded by C2), and
//! dispatches via C3 on fresh creation only. A duplicate idempotency key
//! never re-triggers the broker.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::broker::Broker;
use super::store::JobStore;

pub struct EnqueueService {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn Broker>,
    default_max_attempts: i32,
}

impl EnqueueService {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<dyn Broker>, default_max_attempts: i32) -> Self {
        Self {
            store,
            broker,
            default_max_attempts,
        }
    }

    /// Returns `(id, was_created)`. The caller must treat "created" as
    /// success regardless of whether the broker dispatch below it
    /// succeeds — if it fails, the row is still `queued` and the sweeper
    /// will eventually dispatch it.
    pub async fn enqueue(
        &self,
        job_type: &str,
        args: Value,
        kwargs: Option<Value>,
        idempotency_key: Option<&str>,
        max_attempts: Option<i32>,
        run_after: Option<DateTime<Utc>>,
    ) -> Result<(Uuid, bool)> {
        let payload = super::model::Job::build_payload(args, kwargs);
        let max_attempts = max_attempts.unwrap_or(self.default_max_attempts);

        let (id, created) = self
            .store
            .create(job_type, payload, idempotency_key, max_attempts, run_after)
            .await?;

        if created {
            if let Err(e) = self.broker.enqueue(id, run_after).await {
                tracing::warn!(job_id = %id, error = %e, "broker dispatch failed after job creation; sweeper will recover");
            }
        }

        Ok((id, created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::broker::NatsBroker;
    use crate::kernel::nats::TestNats;
    use std::sync::Mutex;

    /// In-memory store double used only to test EnqueueService's
    /// create-then-dispatch sequencing in isolation from Postgres.
    struct FakeStore {
        keys: Mutex<std::collections::HashMap<String, Uuid>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                keys: Mutex::new(std::collections::HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl JobStore for FakeStore {
        async fn create(
            &self,
            _job_type: &str,
            _payload: Value,
            idempotency_key: Option<&str>,
            _max_attempts: i32,
            _run_after: Option<DateTime<Utc>>,
        ) -> Result<(Uuid, bool)> {
            let Some(key) = idempotency_key else {
                return Ok((Uuid::new_v4(), true));
            };
            let mut keys = self.keys.lock().unwrap();
            if let Some(id) = keys.get(key) {
                return Ok((*id, false));
            }
            let id = Uuid::new_v4();
            keys.insert(key.to_string(), id);
            Ok((id, true))
        }

        async fn get(&self, _id: Uuid) -> Result<Option<super::super::model::Job>> {
            unimplemented!()
        }

        async fn claim_ready(&self, _worker_id: &str, _limit: i64) -> Result<Vec<super::super::model::Job>> {
            unimplemented!()
        }

        async fn mark_running(&self, _id: Uuid, _worker_id: &str) -> Result<bool> {
            unimplemented!()
        }

        async fn mark_succeeded(&self, _id: Uuid, _result: Option<Value>) -> Result<()> {
            unimplemented!()
        }

        async fn mark_retry(
            &self,
            _id: Uuid,
            _attempts: i32,
            _run_after: DateTime<Utc>,
            _error: &str,
        ) -> Result<()> {
            unimplemented!()
        }

        async fn mark_dead(&self, _id: Uuid, _attempts: i32, _error: &str) -> Result<()> {
            unimplemented!()
        }

        async fn find_due_for_sweep(&self, _limit: i64) -> Result<Vec<super::super::model::Job>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_does_not_redispatch() {
        let store = Arc::new(FakeStore::new());
        let nats = Arc::new(TestNats::new());
        let broker = Arc::new(NatsBroker::new(nats.clone()));
        let service = EnqueueService::new(store, broker, 8);

        let (id1, created1) = service
            .enqueue("example", serde_json::json!([]), None, Some("example:evt-1"), None, None)
            .await
            .unwrap();
        let (id2, created2) = service
            .enqueue("example", serde_json::json!([]), None, Some("example:evt-1"), None, None)
            .await
            .unwrap();

        assert_eq!(id1, id2);
        assert!(created1);
        assert!(!created2);
        assert_eq!(nats.publish_count_for(super::super::broker::JOBS_READY_SUBJECT), 1);
    }
}
