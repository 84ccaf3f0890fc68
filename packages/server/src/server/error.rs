//! Ingest API error boundary (C7).
//!
//! Every fallible ingest handler returns `Result<_, IngestError>`.
//! `IngestError` is the single place that maps ingest-layer error kinds
//! to HTTP status codes and the `{error, detail}` JSON body callers see.
//! Library code below the HTTP boundary returns plain
//! `anyhow::Result`; only the route handlers convert into this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Request body was not valid JSON at all.
    #[error("invalid_json")]
    InvalidJson,

    /// Body parsed as JSON but was the wrong shape (e.g. an array where an
    /// object was expected).
    #[error("payload_must_be_{0}")]
    WrongShape(&'static str),

    /// Body was the right shape but failed schema/semantic validation.
    #[error("invalid_payload: {0}")]
    InvalidPayload(String),

    /// Missing or invalid shared-secret / session credential.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated but not permitted to perform the action, with a
    /// short machine-readable detail tag (e.g. `oidc_user_not_linked`).
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// No job with the requested id.
    #[error("not_found")]
    NotFound,

    /// Store or broker unavailable. Never used for a created-but-not-
    /// dispatched job: the store write landing is still a success, since
    /// the sweeper will pick up an undelivered dispatch later.
    #[error("service_unavailable")]
    ServiceUnavailable(#[from] anyhow::Error),

    /// Upstream OIDC provider returned an error during the callback.
    #[error("provider_error")]
    BadGateway(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            IngestError::InvalidJson => (StatusCode::BAD_REQUEST, "invalid_json", None),
            IngestError::WrongShape(shape) => {
                (StatusCode::BAD_REQUEST, "invalid_payload", Some(format!("payload_must_be_{shape}")))
            }
            IngestError::InvalidPayload(detail) => {
                (StatusCode::BAD_REQUEST, "invalid_payload", Some(detail))
            }
            IngestError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            IngestError::Forbidden(detail) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(detail.to_string()))
            }
            IngestError::NotFound => (StatusCode::NOT_FOUND, "not_found", None),
            IngestError::ServiceUnavailable(e) => {
                tracing::error!(error = %e, "ingest request failed: store or broker unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", None)
            }
            IngestError::BadGateway(detail) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(detail))
            }
        };

        (status, Json(ErrorBody { error, detail })).into_response()
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
