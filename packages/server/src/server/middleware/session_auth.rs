//! Session-cookie authentication for human dashboard endpoints (C7/C9).
//!
//! Populates an `AuthContext` request extension from the session cookie.
//! Unlike the shared-secret middleware this does not reject requests by
//! itself — `GET /auth/me` and friends need to distinguish "no session"
//! (401) from "never authenticated at all", so routes that require a
//! session call [`require_session`] explicitly via an extractor.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::kernel::session_store::Session;
use crate::kernel::ServerKernel;
use crate::server::error::IngestError;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session_id: String,
    pub session: Session,
}

/// Attaches `AuthContext` to the request if a valid session cookie is
/// present. Always calls through; absence of a session is not rejected
/// here so that unauthenticated-but-public routes keep working.
pub async fn attach_session(
    State(kernel): State<Arc<ServerKernel>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let jar = CookieJar::from_headers(&parts.headers);

    if let Some(cookie) = jar.get(&kernel.config.auth_cookie_name) {
        if let Some(session) = kernel.sessions.get_session(cookie.value()).await {
            parts.extensions.insert(AuthContext {
                session_id: cookie.value().to_string(),
                session,
            });
        }
    }

    let request = Request::from_parts(parts, body);
    next.run(request).await
}

/// Extractor that requires a populated `AuthContext`, returning 401 when
/// absent. Used by session-gated handlers (`GET /auth/me`, etc.).
pub struct RequireSession(pub AuthContext);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = IngestError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(RequireSession)
            .ok_or(IngestError::Unauthorized)
    }
}
