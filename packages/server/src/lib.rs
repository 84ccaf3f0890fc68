// Job orchestration core — library crate backing the `server` binary.
//
// `kernel` holds the infrastructure (job store, broker, enqueue service,
// handler registry, audit sink, session store, OIDC client); `handlers`
// holds the job handler bodies registered into the kernel at startup;
// `server` holds the Axum HTTP layer (routes, middleware, app wiring).

pub mod config;
pub mod handlers;
pub mod kernel;
pub mod server;

pub use config::Config;
