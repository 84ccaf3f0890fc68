//! Job orchestration core.
//!
//! - [`model`] — the persisted `Job`/`JobStatus` shape (C1 data model).
//! - [`store`] — `PostgresJobStore`, the Job Store + Idempotency Index
//!   (C1/C2).
//! - [`broker`] — `Broker`/`NatsBroker`, the Broker Adapter (C3).
//! - [`enqueue`] — `EnqueueService` (C4).
//! - [`registry`] — `HandlerRegistry` (C5).
//! - [`runner`] — `JobRunner` (C6).
//! - [`scheduler`] — fixed-interval scheduled tasks (C8).
//! - [`sweeper`] — the recovery sweeper (C8 companion).
//!
//! ```text
//! Ingest API / Scheduler ──► EnqueueService ──► JobStore (C1, guarded by C2)
//!                                           └──► Broker (C3, advisory)
//!
//! Broker notification ──► JobRunner ──► HandlerRegistry ──► JobStore (transition)
//! Sweeper (timer) ───────────────────────────────────────► Broker (recovery)
//! ```

pub mod broker;
pub mod enqueue;
pub mod model;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod sweeper;

pub use broker::{Broker, NatsBroker};
pub use enqueue::EnqueueService;
pub use model::{Job, JobStatus};
pub use registry::{HandlerRegistry, SharedHandlerRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
pub use scheduler::{spawn_scheduler, ScheduledTask};
pub use store::{JobStore, PostgresJobStore};
pub use sweeper::run_sweeper;
