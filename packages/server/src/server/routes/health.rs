//! `GET /health` — liveness of the store and broker (C7).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::ServerKernel;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    store: ComponentHealth,
    broker: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok() -> ComponentHealth {
    ComponentHealth {
        status: "ok",
        error: None,
    }
}

fn error(message: impl ToString) -> ComponentHealth {
    ComponentHealth {
        status: "error",
        error: Some(message.to_string()),
    }
}

/// Checks store connectivity and broker liveness; either failing is 503.
pub async fn health_handler(State(kernel): State<Arc<ServerKernel>>) -> (StatusCode, Json<HealthResponse>) {
    let store = match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(&kernel.db_pool))
        .await
    {
        Ok(Ok(_)) => ok(),
        Ok(Err(e)) => error(e),
        Err(_) => error("store health check timed out after 5s"),
    };

    let broker = match tokio::time::timeout(Duration::from_secs(5), kernel.broker.ping()).await {
        Ok(Ok(())) => ok(),
        Ok(Err(e)) => error(e),
        Err(_) => error("broker health check timed out after 5s"),
    };

    let healthy = store.status == "ok" && broker.status == "ok";
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            store,
            broker,
        }),
    )
}
