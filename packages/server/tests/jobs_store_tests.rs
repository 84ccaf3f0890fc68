//! Job Store (C1) + Idempotency Index (C2) integration tests against a real
//! Postgres instance: the CHECK constraints and the `ON CONFLICT` race are
//! database behavior the unit tests in `kernel::jobs::store` cannot exercise
//! against a fake.

mod common;

use common::TestHarness;
use server_core::kernel::jobs::{EnqueueService, JobStore, NatsBroker, PostgresJobStore};
use server_core::kernel::nats::TestNats;
use std::sync::Arc;
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn duplicate_idempotency_key_returns_same_job_and_skips_redispatch(ctx: &TestHarness) {
    let store: Arc<dyn JobStore> = Arc::new(PostgresJobStore::new(ctx.db_pool.clone()));
    let nats = Arc::new(TestNats::new());
    let broker = Arc::new(NatsBroker::new(nats.clone()));
    let enqueue = EnqueueService::new(store.clone(), broker, 8);

    let (id1, created1) = enqueue
        .enqueue("example.job", serde_json::json!([1]), None, Some("example:dup-1"), None, None)
        .await
        .expect("first enqueue");
    let (id2, created2) = enqueue
        .enqueue("example.job", serde_json::json!([1]), None, Some("example:dup-1"), None, None)
        .await
        .expect("second enqueue");

    assert_eq!(id1, id2);
    assert!(created1);
    assert!(!created2);
    assert_eq!(
        nats.publish_count_for(server_core::kernel::jobs::broker::JOBS_READY_SUBJECT),
        1
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_ready_locks_job_exclusively(ctx: &TestHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());

    let (id, created) = store
        .create("example.job", serde_json::json!({}), None, 8, None)
        .await
        .expect("create");
    assert!(created);

    let claimed_a = store.claim_ready("worker-a", 10).await.expect("claim a");
    let claimed_b = store.claim_ready("worker-b", 10).await.expect("claim b");

    assert!(claimed_a.iter().any(|j| j.id == id));
    assert!(claimed_b.is_empty(), "a job already running must not be claimable again");

    let job = store.get(id).await.expect("get").expect("job exists");
    assert_eq!(job.status, server_core::kernel::jobs::JobStatus::Running);
    assert_eq!(job.locked_by.as_deref(), Some("worker-a"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn mark_retry_reopens_job_for_claiming_after_run_after(ctx: &TestHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());

    let (id, _) = store
        .create("example.job", serde_json::json!({}), None, 8, None)
        .await
        .expect("create");
    store.mark_running(id, "worker-a").await.expect("mark running");
    store
        .mark_retry(id, 1, chrono::Utc::now() - chrono::Duration::seconds(1), "boom")
        .await
        .expect("mark retry");

    let claimed = store.claim_ready("worker-b", 10).await.expect("claim");
    assert!(claimed.iter().any(|j| j.id == id));

    let job = store.get(id).await.expect("get").expect("job exists");
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("boom"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn mark_dead_job_is_not_claimable(ctx: &TestHarness) {
    let store = PostgresJobStore::new(ctx.db_pool.clone());

    let (id, _) = store
        .create("example.job", serde_json::json!({}), None, 1, None)
        .await
        .expect("create");
    store.mark_running(id, "worker-a").await.expect("mark running");
    store.mark_dead(id, 1, "exhausted").await.expect("mark dead");

    let claimed = store.claim_ready("worker-b", 10).await.expect("claim");
    assert!(claimed.is_empty());

    let job = store.get(id).await.expect("get").expect("job exists");
    assert_eq!(job.status, server_core::kernel::jobs::JobStatus::Dead);
}
