//! Shared-secret authentication for machine-to-machine endpoints (C7).
//!
//! Fail closed: if `api.shared_secret` is not configured, every guarded
//! request is rejected, never silently allowed through. Comparison is
//! constant-time so response latency can't leak how much of the header
//! matched.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::kernel::ServerKernel;
use crate::server::error::IngestError;
use std::sync::Arc;

pub const SHARED_SECRET_HEADER: &str = "x-api-secret";

pub async fn require_shared_secret(
    State(kernel): State<Arc<ServerKernel>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, IngestError> {
    let configured = kernel
        .config
        .api_shared_secret
        .as_deref()
        .ok_or(IngestError::Unauthorized)?;

    let provided = request
        .headers()
        .get(SHARED_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(IngestError::Unauthorized)?;

    if !bool::from(provided.as_bytes().ct_eq(configured.as_bytes())) {
        return Err(IngestError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_secrets() {
        let a = b"the-secret";
        let b = b"the-secret";
        assert!(bool::from(a.ct_eq(b)));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        let a = b"short";
        let b = b"much-longer-secret";
        assert!(!bool::from(a.ct_eq(b)));
    }
}
