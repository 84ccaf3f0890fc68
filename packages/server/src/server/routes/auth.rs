//! Session/Auth Store (C9): the OIDC PKCE login/callback/me/logout surface
//! plus the deep-link bind flow.
//!
//! Grounded on the original `backend/auth.py` flow functions
//! (`make_pkce_pair`, `build_authorization_url`, `validate_id_token`,
//! `is_admin_email_for_discord_user`): the bind check there queries
//! `people` for a row whose `discord_user_id` matches the chat-origin
//! subject and whose email matches the OIDC identity, which this module
//! reproduces against the `people` table here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::kernel::audit::{AuditEvent, AuditResult};
use crate::kernel::oidc::{generate_pkce, sanitize_next_path, SessionView};
use crate::kernel::session_store::{random_token, DeepLinkGrant, PendingAuthState, Session};
use crate::kernel::ServerKernel;
use crate::server::error::{IngestError, IngestResult};
use crate::server::middleware::session_auth::RequireSession;

const AUTH_SOURCE: &str = "admin_dashboard";
const DEFAULT_NEXT_PATH: &str = "/";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    deep_link: Option<String>,
}

/// `GET /auth/login` — starts the PKCE flow and redirects to the
/// provider's authorization endpoint.
pub async fn login(
    State(kernel): State<Arc<ServerKernel>>,
    Query(query): Query<LoginQuery>,
) -> IngestResult<Response> {
    let discovery = kernel
        .oidc
        .discover()
        .await
        .map_err(|e| IngestError::BadGateway(e.to_string()))?;

    let (verifier, challenge) = generate_pkce();
    let nonce = random_token();
    let next_path = sanitize_next_path(
        query.next.as_deref().unwrap_or(DEFAULT_NEXT_PATH),
        DEFAULT_NEXT_PATH,
    );

    let state = kernel
        .sessions
        .create_pending_state(
            PendingAuthState {
                nonce: nonce.clone(),
                verifier,
                next_path,
                deep_link: query.deep_link,
                expires_at: Utc::now() + Duration::seconds(kernel.config.state_ttl_seconds),
            },
            Duration::seconds(kernel.config.state_ttl_seconds),
        )
        .await;

    let authorization_url = kernel
        .oidc
        .authorization_url(&discovery, &state, &nonce, &challenge)
        .map_err(|e| IngestError::BadGateway(e.to_string()))?;
    Ok(Redirect::to(&authorization_url).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `GET /auth/callback` — exchanges the code, validates the id-token,
/// performs the deep-link bind check when the pending state carries one,
/// and establishes the session.
pub async fn callback(
    State(kernel): State<Arc<ServerKernel>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> IngestResult<Response> {
    if let Some(provider_error) = query.error {
        return Err(IngestError::BadGateway(provider_error));
    }
    let code = query.code.ok_or_else(|| IngestError::InvalidPayload("missing code".to_string()))?;
    let state = query.state.ok_or_else(|| IngestError::InvalidPayload("missing state".to_string()))?;

    let pending = kernel
        .sessions
        .take_pending_state(&state)
        .await
        .ok_or(IngestError::Unauthorized)?;

    let discovery = kernel
        .oidc
        .discover()
        .await
        .map_err(|e| IngestError::BadGateway(e.to_string()))?;

    let id_token = kernel
        .oidc
        .exchange_code(&discovery, &code, &pending.verifier)
        .await
        .map_err(|e| IngestError::BadGateway(e.to_string()))?;

    let claims = kernel
        .oidc
        .validate_id_token(&discovery, &id_token, &pending.nonce)
        .await
        .map_err(|_| IngestError::Unauthorized)?;

    let email = claims.email.clone().unwrap_or_default();
    let normalized_email = email.to_lowercase();
    let is_admin = kernel.oidc.is_admin(&claims);
    let groups = claims.groups(&kernel.config.oidc_groups_claim);

    if let Some(deep_link_token) = pending.deep_link.as_deref() {
        let grant = kernel.sessions.take_deep_link(deep_link_token).await;
        let Some(grant) = grant else {
            kernel
                .audit
                .record(AuditEvent {
                    source: AUTH_SOURCE.to_string(),
                    action: "auth.deep_link.bind".to_string(),
                    result: AuditResult::Denied,
                    actor_provider: "admin_sso".to_string(),
                    actor_subject: AuditEvent::normalized_subject("admin_sso", &claims.sub),
                    actor_display_name: claims.name.clone(),
                    resource_type: Some("deep_link".to_string()),
                    resource_id: Some(deep_link_token.to_string()),
                    correlation_id: None,
                    person_id: None,
                    metadata: json!({"reason": "expired_or_consumed"}),
                })
                .await;
            return Err(IngestError::Forbidden("deep_link_expired"));
        };

        let bound = bind_check(&kernel, &grant.subject_id, &normalized_email).await?;
        if !bound {
            kernel
                .audit
                .record(AuditEvent {
                    source: AUTH_SOURCE.to_string(),
                    action: "auth.login".to_string(),
                    result: AuditResult::Denied,
                    actor_provider: "admin_sso".to_string(),
                    actor_subject: AuditEvent::normalized_subject("admin_sso", &claims.sub),
                    actor_display_name: claims.name.clone(),
                    resource_type: Some("deep_link".to_string()),
                    resource_id: Some(deep_link_token.to_string()),
                    correlation_id: None,
                    person_id: None,
                    metadata: json!({"discord_subject": grant.subject_id}),
                })
                .await;
            return Err(IngestError::Forbidden("oidc_user_not_linked"));
        }

        kernel
            .audit
            .record(AuditEvent {
                source: AUTH_SOURCE.to_string(),
                action: "auth.deep_link.bind".to_string(),
                result: AuditResult::Success,
                actor_provider: "admin_sso".to_string(),
                actor_subject: AuditEvent::normalized_subject("admin_sso", &claims.sub),
                actor_display_name: claims.name.clone(),
                resource_type: Some("deep_link".to_string()),
                resource_id: Some(deep_link_token.to_string()),
                correlation_id: None,
                person_id: None,
                metadata: json!({"discord_subject": grant.subject_id}),
            })
            .await;
    }

    let session_ttl = Duration::seconds(kernel.config.session_ttl_seconds);
    let session_id = kernel
        .sessions
        .create_session(Session {
            subject: claims.sub.clone(),
            email: claims.email.clone(),
            display_name: claims.name.clone(),
            groups,
            is_admin,
            id_token,
            expires_at: Utc::now() + session_ttl,
        })
        .await;

    kernel
        .audit
        .record(AuditEvent {
            source: AUTH_SOURCE.to_string(),
            action: "auth.login".to_string(),
            result: AuditResult::Success,
            actor_provider: "admin_sso".to_string(),
            actor_subject: AuditEvent::normalized_subject("admin_sso", &claims.sub),
            actor_display_name: claims.name.clone(),
            resource_type: None,
            resource_id: None,
            correlation_id: None,
            person_id: None,
            metadata: json!({"is_admin": is_admin}),
        })
        .await;

    let cookie = session_cookie(&kernel, session_id, session_ttl);
    let jar = jar.add(cookie);
    Ok((jar, Redirect::to(&pending.next_path)).into_response())
}

/// Queries `people` for an active row linking the chat-origin subject to
/// the OIDC email, matching the original `is_admin_email_for_discord_user`
/// lookup.
async fn bind_check(kernel: &ServerKernel, discord_subject: &str, normalized_email: &str) -> IngestResult<bool> {
    if normalized_email.is_empty() {
        return Ok(false);
    }
    let row: Option<(uuid::Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM people
        WHERE sync_status = 'active'
          AND discord_subject = $1
          AND $2 = ANY(emails)
        LIMIT 1
        "#,
    )
    .bind(discord_subject)
    .bind(normalized_email)
    .fetch_optional(&kernel.db_pool)
    .await
    .map_err(|e| IngestError::ServiceUnavailable(e.into()))?;

    Ok(row.is_some())
}

fn session_cookie(kernel: &ServerKernel, session_id: String, ttl: Duration) -> Cookie<'static> {
    let samesite = match kernel.config.auth_cookie_samesite.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    };

    Cookie::build((kernel.config.auth_cookie_name.clone(), session_id))
        .path("/")
        .http_only(true)
        .secure(kernel.config.auth_cookie_secure)
        .same_site(samesite)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// `GET /auth/me`.
pub async fn me(RequireSession(auth): RequireSession) -> Json<SessionView> {
    Json(SessionView {
        subject: auth.session.subject,
        email: auth.session.email,
        display_name: auth.session.display_name,
        groups: auth.session.groups,
        is_admin: auth.session.is_admin,
    })
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_logout_url: Option<String>,
}

/// `POST /auth/logout`.
pub async fn logout(
    State(kernel): State<Arc<ServerKernel>>,
    RequireSession(auth): RequireSession,
    jar: CookieJar,
) -> IngestResult<Response> {
    kernel.sessions.delete_session(&auth.session_id).await;

    kernel
        .audit
        .record(AuditEvent {
            source: AUTH_SOURCE.to_string(),
            action: "auth.logout".to_string(),
            result: AuditResult::Success,
            actor_provider: "admin_sso".to_string(),
            actor_subject: AuditEvent::normalized_subject("admin_sso", &auth.session.subject),
            actor_display_name: auth.session.display_name.clone(),
            resource_type: None,
            resource_id: None,
            correlation_id: None,
            person_id: None,
            metadata: json!({}),
        })
        .await;

    let provider_logout_url = match kernel.oidc.discover().await {
        Ok(discovery) => kernel.oidc.end_session_url(&discovery, &auth.session.id_token),
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch OIDC discovery for logout redirect");
            None
        }
    };

    let cleared = Cookie::build((kernel.config.auth_cookie_name.clone(), ""))
        .path("/")
        .http_only(true)
        .secure(kernel.config.auth_cookie_secure)
        .max_age(time::Duration::seconds(0))
        .build();
    let jar = jar.add(cleared);

    Ok((
        jar,
        Json(LogoutResponse {
            status: "logged_out",
            provider_logout_url,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateDeepLinkRequest {
    subject_id: String,
    #[serde(default)]
    next_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateDeepLinkResponse {
    token: String,
    expires_in_seconds: i64,
}

/// `POST /auth/deep-links` — issued by the chat-command surface to hand a
/// human a one-shot link.
pub async fn create_deep_link(
    State(kernel): State<Arc<ServerKernel>>,
    body: axum::body::Bytes,
) -> IngestResult<(axum::http::StatusCode, Json<CreateDeepLinkResponse>)> {
    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|_| IngestError::InvalidJson)?;
    if !payload.is_object() {
        return Err(IngestError::WrongShape("object"));
    }
    let request: CreateDeepLinkRequest =
        serde_json::from_value(payload).map_err(|e| IngestError::InvalidPayload(e.to_string()))?;

    let next_path = sanitize_next_path(
        request.next_path.as_deref().unwrap_or(DEFAULT_NEXT_PATH),
        DEFAULT_NEXT_PATH,
    );
    let ttl = Duration::seconds(kernel.config.deep_link_ttl_seconds);

    let token = kernel
        .sessions
        .create_deep_link(
            DeepLinkGrant {
                subject_id: request.subject_id,
                next_path,
                expires_at: Utc::now() + ttl,
            },
            ttl,
        )
        .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateDeepLinkResponse {
            token,
            expires_in_seconds: kernel.config.deep_link_ttl_seconds,
        }),
    ))
}

/// `GET /auth/deep-links/{token}` — peeks the grant (without consuming it;
/// consumption happens atomically during the bind check in `callback`)
/// and forwards into the login flow.
pub async fn consume_deep_link(
    State(kernel): State<Arc<ServerKernel>>,
    Path(token): Path<String>,
) -> IngestResult<Response> {
    let grant = kernel
        .sessions
        .peek_deep_link(&token)
        .await
        .ok_or(IngestError::NotFound)?;

    let next = urlencoding_escape(&grant.next_path);
    let login_url = format!("/auth/login?deep_link={token}&next={next}");
    Ok(Redirect::to(&login_url).into_response())
}

/// Minimal query-string escaping sufficient for a path that was already
/// validated by [`sanitize_next_path`] (starts with a single `/`).
fn urlencoding_escape(value: &str) -> String {
    value.replace('%', "%25").replace('&', "%26").replace('#', "%23")
}
