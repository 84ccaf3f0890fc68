//! Domain handler bodies live outside this core; this module holds only
//! the minimal illustrative handler kept to demonstrate the registry
//! wiring end to end.

pub mod webhook;

use std::sync::Arc;

use crate::kernel::jobs::HandlerRegistry;
use crate::kernel::ServerKernel;

/// Registers every handler this process knows how to run. Called once at
/// startup; the registry is read-only thereafter.
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register(webhook::JOB_TYPE, |args, kwargs, kernel: Arc<ServerKernel>| {
        webhook::handle(args, kwargs, kernel)
    });
}
