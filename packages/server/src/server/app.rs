//! Application wiring: the Axum router plus the background tasks that run
//! alongside it in the same process (Worker Runner, Scheduler, recovery
//! sweeper).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::kernel::jobs::{run_sweeper, spawn_scheduler, JobRunner, JobRunnerConfig, ScheduledTask};
use crate::kernel::ServerKernel;
use crate::server::middleware::{attach_session, require_shared_secret};
use crate::server::routes::{audit, auth, health, jobs, process_item, webhooks};

/// Handles to every background task spawned alongside the router, held so
/// `main` can observe shutdown: scheduler loops and the sweeper are
/// cancel-safe; Worker Runners observe shutdown between jobs.
pub struct BackgroundTasks {
    pub scheduler_cancel: CancellationToken,
    pub sweeper_cancel: CancellationToken,
    pub handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn shutdown(&self) {
        self.scheduler_cancel.cancel();
        self.sweeper_cancel.cancel();
    }
}

/// Spawns one `JobRunner` per configured queue, the scheduler's fixed-
/// interval tasks, and the recovery sweeper.
pub fn spawn_background_tasks(kernel: Arc<ServerKernel>) -> BackgroundTasks {
    let mut handles = Vec::new();

    for queue_name in &kernel.config.worker_queue_names {
        let runner_config = JobRunnerConfig {
            worker_id: format!("{}-{}", queue_name, uuid::Uuid::new_v4()),
            retry_base_seconds: kernel.config.job_retry_base_seconds,
            retry_max_seconds: kernel.config.job_retry_max_seconds,
            ..JobRunnerConfig::default()
        };
        let runner = JobRunner::new(
            kernel.store.clone(),
            kernel.broker.clone(),
            kernel.registry.clone(),
            kernel.clone(),
            runner_config,
        );
        handles.push(tokio::spawn(async move {
            if let Err(e) = runner.run_until_shutdown().await {
                error!(error = %e, "worker runner exited with error");
            }
        }));
    }

    // Push-path counterpart to the poll-driven runners above: wakes on a
    // broker delivery instead of waiting out `poll_interval`. Shares the
    // store/registry/kernel with the poll runners, so a job claimed here
    // is exactly as safe as one claimed by `claim_ready` — `mark_running`
    // is the only arbiter.
    let push_runner = JobRunner::new(
        kernel.store.clone(),
        kernel.broker.clone(),
        kernel.registry.clone(),
        kernel.clone(),
        JobRunnerConfig {
            worker_id: format!("push-{}", uuid::Uuid::new_v4()),
            retry_base_seconds: kernel.config.job_retry_base_seconds,
            retry_max_seconds: kernel.config.job_retry_max_seconds,
            ..JobRunnerConfig::default()
        },
    );
    let push_broker = kernel.broker.clone();
    handles.push(tokio::spawn(async move {
        let mut deliveries = match push_broker.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "failed to subscribe to broker deliveries; push path disabled");
                return;
            }
        };
        while let Some(job_id) = deliveries.recv().await {
            if let Err(e) = push_runner.handle_delivery(job_id).await {
                error!(job_id = %job_id, error = %e, "push-path delivery failed");
            }
        }
    }));

    // ScheduledTask wants a 'static job_type; the configured list is fixed
    // for the process lifetime, so leaking it once at startup is cheap and
    // avoids threading a lifetime through the scheduler for no benefit.
    let scheduled_tasks: Vec<ScheduledTask> = kernel
        .config
        .scheduler_intervals
        .iter()
        .map(|(job_type, interval_seconds)| ScheduledTask {
            job_type: Box::leak(job_type.clone().into_boxed_str()),
            interval_seconds: *interval_seconds,
        })
        .collect();
    let (scheduler_cancel, scheduler_handles) = spawn_scheduler(scheduled_tasks, kernel.enqueue.clone());
    handles.extend(scheduler_handles);

    let sweeper_cancel = CancellationToken::new();
    let sweeper_store = kernel.store.clone();
    let sweeper_broker = kernel.broker.clone();
    let sweeper_cancel_child = sweeper_cancel.clone();
    handles.push(tokio::spawn(async move {
        run_sweeper(
            sweeper_store,
            sweeper_broker,
            crate::kernel::jobs::sweeper::DEFAULT_SWEEP_INTERVAL_SECONDS,
            sweeper_cancel_child,
        )
        .await;
    }));

    BackgroundTasks {
        scheduler_cancel,
        sweeper_cancel,
        handles,
    }
}

/// Builds the Axum router. Machine-to-machine endpoints are guarded by
/// [`require_shared_secret`]; human dashboard endpoints rely on the
/// session cookie populated by [`attach_session`] plus the
/// [`crate::server::middleware::session_auth::RequireSession`] extractor
/// where a session is mandatory.
pub fn build_router(kernel: Arc<ServerKernel>) -> Router {
    let machine_routes = Router::new()
        .route("/webhooks/{source}", post(webhooks::webhook_entrypoint))
        .route("/process-item/{id}", post(process_item::process_item))
        .route("/jobs/{id}", post(jobs::enqueue_job).get(jobs::get_job_status))
        .route("/audit/events", post(audit::record_audit_event))
        .route("/auth/deep-links", post(auth::create_deep_link))
        .route_layer(middleware::from_fn_with_state(kernel.clone(), require_shared_secret));

    let session_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout));

    let public_routes = Router::new()
        .route("/health", get(health::health_handler))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/deep-links/{token}", get(auth::consume_deep_link));

    Router::new()
        .merge(machine_routes)
        .merge(session_routes)
        .merge(public_routes)
        .layer(middleware::from_fn_with_state(kernel.clone(), attach_session))
        .layer(TraceLayer::new_for_http())
        .with_state(kernel)
}
