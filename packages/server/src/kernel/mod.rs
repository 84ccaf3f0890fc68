// Kernel — core infrastructure with dependency injection.
//
// The ServerKernel holds all server dependencies (database, broker,
// handler registry, session store, audit sink) and is handed by reference
// to request handlers, job handlers, and background tasks.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic belongs in handlers registered with the job registry.

pub mod audit;
pub mod jobs;
pub mod nats;
pub mod oidc;
pub mod server_kernel;
pub mod session_store;

pub use audit::{AuditEvent, AuditResult, AuditSink};
pub use nats::{NatsClientPublisher, NatsPublisher, TestNats};
pub use oidc::{IdTokenClaims, OidcClient, OidcConfig};
pub use server_kernel::ServerKernel;
pub use session_store::{DeepLinkGrant, PendingAuthState, Session, SessionStore};
