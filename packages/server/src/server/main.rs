// Entry point for the job orchestration core's server process.

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::config::Config;
use server_core::kernel::jobs::{Broker, EnqueueService, HandlerRegistry, NatsBroker, PostgresJobStore};
use server_core::kernel::nats::NatsClientPublisher;
use server_core::kernel::oidc::{OidcClient, OidcConfig};
use server_core::kernel::{AuditSink, ServerKernel, SessionStore};
use server_core::server::app::{build_router, spawn_background_tasks};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting job orchestration core");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("configuration loaded");

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("database connected");

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    tracing::info!("connecting to NATS...");
    let nats_client = async_nats::connect(&config.nats_url)
        .await
        .context("failed to connect to NATS")?;
    let publisher = Arc::new(NatsClientPublisher::new(nats_client));
    let broker: Arc<dyn Broker> = Arc::new(NatsBroker::new(publisher));

    let store = Arc::new(PostgresJobStore::new(pool.clone()));
    let enqueue = Arc::new(EnqueueService::new(store.clone(), broker.clone(), config.job_max_attempts));

    let mut registry = HandlerRegistry::new();
    server_core::handlers::register_all(&mut registry);
    let registry = Arc::new(registry);

    let audit = Arc::new(AuditSink::new(pool.clone()));
    let sessions = Arc::new(SessionStore::new());

    let oidc = Arc::new(
        OidcClient::new(OidcConfig {
            issuer: config.oidc_issuer.clone(),
            client_id: config.oidc_client_id.clone(),
            client_secret: config.oidc_client_secret.clone(),
            scope: config.oidc_scope.clone(),
            groups_claim: config.oidc_groups_claim.clone(),
            admin_groups: config.oidc_admin_groups.clone(),
            redirect_uri: config.oidc_redirect_uri.clone(),
        })
        .context("failed to build OIDC client")?,
    );

    let config = Arc::new(config);
    let kernel = Arc::new(ServerKernel::new(
        pool,
        store,
        broker,
        enqueue,
        registry,
        audit,
        sessions,
        oidc,
        config.clone(),
    ));

    let background = spawn_background_tasks(kernel.clone());
    let app = build_router(kernel);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "binding server");
    tracing::info!("health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    let serve_result = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    tracing::info!("shutting down background tasks");
    background.shutdown();
    for handle in background.handles {
        let _ = handle.await;
    }

    serve_result
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received shutdown signal");
}
