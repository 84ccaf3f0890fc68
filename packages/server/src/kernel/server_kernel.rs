//! ServerKernel — shared, process-wide infrastructure handed to every
//! request handler, job handler, and background task.

use std::sync::Arc;

use sqlx::PgPool;

use super::audit::AuditSink;
use super::jobs::{Broker, EnqueueService, HandlerRegistry, JobStore};
use super::oidc::OidcClient;
use super::session_store::SessionStore;
use crate::config::Config;

/// ServerKernel holds all server dependencies. Infrastructure only — no
/// business logic lives here.
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub store: Arc<dyn JobStore>,
    pub broker: Arc<dyn Broker>,
    pub enqueue: Arc<EnqueueService>,
    pub registry: Arc<HandlerRegistry>,
    pub audit: Arc<AuditSink>,
    pub sessions: Arc<SessionStore>,
    pub oidc: Arc<OidcClient>,
    pub config: Arc<Config>,
}

impl ServerKernel {
    pub fn new(
        db_pool: PgPool,
        store: Arc<dyn JobStore>,
        broker: Arc<dyn Broker>,
        enqueue: Arc<EnqueueService>,
        registry: Arc<HandlerRegistry>,
        audit: Arc<AuditSink>,
        sessions: Arc<SessionStore>,
        oidc: Arc<OidcClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db_pool,
            store,
            broker,
            enqueue,
            registry,
            audit,
            sessions,
            oidc,
            config,
        }
    }
}
