//! Handler Registry (C5).
//!
//! A process-wide immutable mapping from handler-name to handler function,
//! populated once at startup and read-only thereafter. The Worker Runner
//! looks up a job's `type` here; an unknown name is fatal for that job
//! (transitions straight to `dead`) but not for the runner.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::kernel::ServerKernel;

type BoxedHandler = Box<
    dyn Fn(Value, Value, Arc<ServerKernel>) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job type strings to handlers.
///
/// Each handler receives the job's `args` and `kwargs` views plus the
/// shared kernel, and returns an optional result value merged into the
/// job's payload on success.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under `job_type`. Handlers are plain async
    /// closures; this keeps the registry free of any domain-specific
    /// generics — decoding `args`/`kwargs` into a typed shape is each
    /// handler's own responsibility.
    pub fn register<F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        F: Fn(Value, Value, Arc<ServerKernel>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |args, kwargs, kernel| Box::pin(handler(args, kwargs, kernel)));
        self.handlers.insert(job_type, boxed);
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Invokes the handler registered for `job_type`. Callers must check
    /// `is_registered` first to distinguish "unknown type" (fatal, ->
    /// `mark_dead`) from a handler that ran and failed (retryable).
    pub async fn execute(
        &self,
        job_type: &str,
        args: Value,
        kwargs: Value,
        kernel: Arc<ServerKernel>,
    ) -> Result<Option<Value>> {
        let handler = self
            .handlers
            .get(job_type)
            .ok_or_else(|| anyhow::anyhow!("unknown job type: {job_type}"))?;
        handler(args, kwargs, kernel).await
    }
}

pub type SharedHandlerRegistry = Arc<HandlerRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_check() {
        let mut registry = HandlerRegistry::new();
        registry.register("test_job", |_args, _kwargs, _kernel| async move { Ok(None) });

        assert!(registry.is_registered("test_job"));
        assert!(!registry.is_registered("unknown_job"));
        assert_eq!(registry.registered_types(), vec!["test_job"]);
    }
}
