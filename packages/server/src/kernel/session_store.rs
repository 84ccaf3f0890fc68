//! Session/Auth Store (C9) — three keyed in-memory maps with TTL.
//!
//! A single `HashMap<token, Session>` with a fixed 24h TTL checked on read
//! generalized to three maps and to atomic get-and-delete semantics for
//! the two single-use kinds (PendingAuthState, DeepLinkGrant).

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

/// Generates a random URL-safe token suitable for session ids, OIDC
/// `state`, and deep-link tokens.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub groups: Vec<String>,
    pub is_admin: bool,
    pub id_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PendingAuthState {
    pub nonce: String,
    pub verifier: String,
    pub next_path: String,
    pub deep_link: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeepLinkGrant {
    pub subject_id: String,
    pub next_path: String,
    pub expires_at: DateTime<Utc>,
}

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// A TTL-bearing map with atomic get-and-delete reads, used for the
/// single-use PendingAuthState and DeepLinkGrant kinds.
struct TtlMap<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Clone> TtlMap<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, key: String, value: T, expires_at: DateTime<Utc>) {
        self.entries.write().await.insert(key, Entry { value, expires_at });
    }

    /// Reads and removes the entry in one step. Returns `None` if absent
    /// or expired (an expired entry found during the read is also purged).
    async fn take(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value)
    }

    /// Reads without removing, purging on expiry. Used for Session, which
    /// is repeatable-read (not single-use).
    async fn peek(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > Utc::now() {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn retain_live(&self) {
        let now = Utc::now();
        self.entries.write().await.retain(|_, e| e.expires_at > now);
    }
}

pub struct SessionStore {
    sessions: TtlMap<Session>,
    pending_states: TtlMap<PendingAuthState>,
    deep_links: TtlMap<DeepLinkGrant>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: TtlMap::new(),
            pending_states: TtlMap::new(),
            deep_links: TtlMap::new(),
        }
    }

    pub async fn create_session(&self, session: Session) -> String {
        let token = random_token();
        let expires_at = session.expires_at;
        self.sessions.insert(token.clone(), session, expires_at).await;
        token
    }

    /// Repeatable read: a session may be read many times until its TTL
    /// elapses, unlike PendingAuthState/DeepLinkGrant.
    pub async fn get_session(&self, token: &str) -> Option<Session> {
        self.sessions.peek(token).await
    }

    pub async fn delete_session(&self, token: &str) {
        self.sessions.remove(token).await;
    }

    pub async fn create_pending_state(&self, state: PendingAuthState, ttl: Duration) -> String {
        let token = random_token();
        let expires_at = Utc::now() + ttl;
        self.pending_states.insert(token.clone(), state, expires_at).await;
        token
    }

    /// Single-use: the entry is gone after this call regardless of
    /// outcome, so a replayed `state` parameter can never complete the
    /// OIDC callback twice.
    pub async fn take_pending_state(&self, state: &str) -> Option<PendingAuthState> {
        self.pending_states.take(state).await
    }

    pub async fn create_deep_link(&self, grant: DeepLinkGrant, ttl: Duration) -> String {
        let token = random_token();
        let expires_at = Utc::now() + ttl;
        self.deep_links.insert(token.clone(), grant, expires_at).await;
        token
    }

    pub async fn take_deep_link(&self, token: &str) -> Option<DeepLinkGrant> {
        self.deep_links.take(token).await
    }

    /// Non-consuming read, used by `GET /auth/deep-links/{token}` to check
    /// the grant is still live before forwarding into the login flow.
    /// Actual one-shot consumption happens later via `take_deep_link`
    /// during the callback's bind check.
    pub async fn peek_deep_link(&self, token: &str) -> Option<DeepLinkGrant> {
        self.deep_links.peek(token).await
    }

    pub async fn cleanup_expired(&self) {
        self.sessions.retain_live().await;
        self.pending_states.retain_live().await;
        self.deep_links.retain_live().await;
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSessionStore = Arc<SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(expires_at: DateTime<Utc>) -> Session {
        Session {
            subject: "user-1".to_string(),
            email: Some("user@example.com".to_string()),
            display_name: None,
            groups: vec![],
            is_admin: false,
            id_token: "token".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn session_readable_until_expiry() {
        let store = SessionStore::new();
        let token = store
            .create_session(sample_session(Utc::now() + Duration::hours(1)))
            .await;

        assert!(store.get_session(&token).await.is_some());
        assert!(store.get_session(&token).await.is_some(), "repeatable read");
    }

    #[tokio::test]
    async fn expired_session_returns_none() {
        let store = SessionStore::new();
        let token = store
            .create_session(sample_session(Utc::now() - Duration::seconds(1)))
            .await;

        assert!(store.get_session(&token).await.is_none());
    }

    #[tokio::test]
    async fn logout_invalidates_session_permanently() {
        let store = SessionStore::new();
        let token = store
            .create_session(sample_session(Utc::now() + Duration::hours(1)))
            .await;

        store.delete_session(&token).await;
        assert!(store.get_session(&token).await.is_none());
    }

    #[tokio::test]
    async fn pending_state_is_single_use() {
        let store = SessionStore::new();
        let token = store
            .create_pending_state(
                PendingAuthState {
                    nonce: "n".to_string(),
                    verifier: "v".to_string(),
                    next_path: "/".to_string(),
                    deep_link: None,
                    expires_at: Utc::now() + Duration::minutes(5),
                },
                Duration::minutes(5),
            )
            .await;

        assert!(store.take_pending_state(&token).await.is_some());
        assert!(store.take_pending_state(&token).await.is_none(), "replay must fail");
    }

    #[tokio::test]
    async fn deep_link_is_single_use() {
        let store = SessionStore::new();
        let token = store
            .create_deep_link(
                DeepLinkGrant {
                    subject_id: "s1".to_string(),
                    next_path: "/dashboard".to_string(),
                    expires_at: Utc::now() + Duration::minutes(10),
                },
                Duration::minutes(10),
            )
            .await;

        assert!(store.take_deep_link(&token).await.is_some());
        assert!(store.take_deep_link(&token).await.is_none());
    }
}
