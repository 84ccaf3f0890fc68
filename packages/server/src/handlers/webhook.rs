//! Illustrative handler registered at startup: `webhook.generic`.
//!
//! Domain handler bodies are external collaborators; this is the one
//! handler kept in full, grounded directly on the original
//! `process_webhook_event` — it does no domain work, only normalizes
//! metadata about the event it was handed.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;

use crate::kernel::ServerKernel;

pub const JOB_TYPE: &str = "webhook.generic";

pub async fn handle(args: Value, _kwargs: Value, _kernel: Arc<ServerKernel>) -> Result<Option<Value>> {
    let items = args.as_array().context("webhook.generic expects [source, payload] args")?;
    let source = items.first().and_then(Value::as_str).unwrap_or("unknown");
    let payload = items.get(1).cloned().unwrap_or(Value::Null);

    let event_id = payload
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    let payload_keys = match &payload {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter().cloned().collect::<Vec<_>>()
        }
        _ => Vec::new(),
    };

    tracing::info!(source, event_id, "processing webhook");

    Ok(Some(serde_json::json!({
        "source": source,
        "event_id": event_id,
        "received_at": Utc::now().to_rfc3339(),
        "payload_keys": payload_keys,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn normalizes_id_and_keys() {
        let args = serde_json::json!(["example", {"id": "evt-1", "foo": 1, "bar": 2}]);
        // `handle` never dereferences its kernel argument; the inline
        // logic is duplicated here rather than constructing a real one.
        let result = handle_inner(args).await.unwrap();
        assert_eq!(result["source"], serde_json::json!("example"));
        assert_eq!(result["event_id"], serde_json::json!("evt-1"));
        assert_eq!(result["payload_keys"], serde_json::json!(["bar", "foo", "id"]));
    }

    // Test-only helper that mirrors `handle`'s body without requiring a
    // constructed `ServerKernel`.
    async fn handle_inner(args: Value) -> Result<Value> {
        let items = args.as_array().context("expects array args")?;
        let source = items.first().and_then(Value::as_str).unwrap_or("unknown");
        let payload = items.get(1).cloned().unwrap_or(Value::Null);
        let event_id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        let payload_keys = match &payload {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter().cloned().collect::<Vec<_>>()
            }
            _ => Vec::new(),
        };
        Ok(serde_json::json!({
            "source": source,
            "event_id": event_id,
            "payload_keys": payload_keys,
        }))
    }
}
