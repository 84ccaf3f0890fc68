use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub port: u16,

    pub job_max_attempts: i32,
    pub job_retry_base_seconds: i64,
    pub job_retry_max_seconds: i64,
    pub job_timeout_seconds: u64,

    pub worker_queue_names: Vec<String>,

    pub session_ttl_seconds: i64,
    pub state_ttl_seconds: i64,
    pub deep_link_ttl_seconds: i64,

    pub oidc_issuer: String,
    pub oidc_client_id: String,
    pub oidc_client_secret: String,
    pub oidc_scope: String,
    pub oidc_groups_claim: String,
    pub oidc_admin_groups: Vec<String>,
    pub oidc_redirect_uri: String,

    pub auth_cookie_name: String,
    pub auth_cookie_secure: bool,
    pub auth_cookie_samesite: String,

    /// Absence means all shared-secret-guarded endpoints fail closed; this
    /// is therefore `Option`, not a required field at boot, per spec
    /// section 6.
    pub api_shared_secret: Option<String>,

    /// Per-scheduled-task interval, keyed by logical job type.
    pub scheduler_intervals: Vec<(String, i64)>,
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.split(',').map(|s| s.trim().to_string()).collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

impl Config {
    /// Load configuration from environment variables. `.env` is loaded
    /// first if present (development convenience).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            nats_url: env_var("NATS_URL", "nats://localhost:4222"),
            port: env_var("PORT", "8080")
                .parse()
                .context("PORT must be a valid number")?,

            job_max_attempts: env_var("JOB_MAX_ATTEMPTS", "8")
                .parse()
                .context("JOB_MAX_ATTEMPTS must be a valid integer")?,
            job_retry_base_seconds: env_var("JOB_RETRY_BASE_SECONDS", "5")
                .parse()
                .context("JOB_RETRY_BASE_SECONDS must be a valid integer")?,
            job_retry_max_seconds: env_var("JOB_RETRY_MAX_SECONDS", "300")
                .parse()
                .context("JOB_RETRY_MAX_SECONDS must be a valid integer")?,
            job_timeout_seconds: env_var("JOB_TIMEOUT_SECONDS", "600")
                .parse()
                .context("JOB_TIMEOUT_SECONDS must be a valid integer")?,

            worker_queue_names: env_list("WORKER_QUEUE_NAMES", &["default"]),

            session_ttl_seconds: env_var("SESSION_TTL_SECONDS", "86400")
                .parse()
                .context("SESSION_TTL_SECONDS must be a valid integer")?,
            state_ttl_seconds: env_var("STATE_TTL_SECONDS", "600")
                .parse()
                .context("STATE_TTL_SECONDS must be a valid integer")?,
            deep_link_ttl_seconds: env_var("DEEP_LINK_TTL_SECONDS", "900")
                .parse()
                .context("DEEP_LINK_TTL_SECONDS must be a valid integer")?,

            oidc_issuer: env_var("OIDC_ISSUER", ""),
            oidc_client_id: env_var("OIDC_CLIENT_ID", ""),
            oidc_client_secret: env_var("OIDC_CLIENT_SECRET", ""),
            oidc_scope: env_var("OIDC_SCOPE", "openid email profile groups"),
            oidc_groups_claim: env_var("OIDC_GROUPS_CLAIM", "groups"),
            oidc_admin_groups: env_list("OIDC_ADMIN_GROUPS", &[]),
            oidc_redirect_uri: env_var("OIDC_REDIRECT_URI", ""),

            auth_cookie_name: env_var("AUTH_COOKIE_NAME", "session_id"),
            auth_cookie_secure: env_var("AUTH_COOKIE_SECURE", "true") == "true",
            auth_cookie_samesite: env_var("AUTH_COOKIE_SAMESITE", "lax"),

            api_shared_secret: env::var("API_SHARED_SECRET").ok(),

            scheduler_intervals: parse_scheduler_intervals(),
        })
    }
}

/// Parses `SCHEDULER_INTERVALS` as `name=seconds,name2=seconds2`. Unset or
/// empty means no scheduled tasks beyond the sweeper, which runs on its own
/// fixed interval (see `kernel::jobs::sweeper::DEFAULT_SWEEP_INTERVAL_SECONDS`)
/// regardless of this setting.
fn parse_scheduler_intervals() -> Vec<(String, i64)> {
    match env::var("SCHEDULER_INTERVALS") {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .filter_map(|pair| {
                let (name, seconds) = pair.split_once('=')?;
                seconds.trim().parse::<i64>().ok().map(|s| (name.trim().to_string(), s))
            })
            .collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_list_splits_and_trims() {
        std::env::set_var("TEST_ENV_LIST_CFG", "a, b ,c");
        assert_eq!(env_list("TEST_ENV_LIST_CFG", &["x"]), vec!["a", "b", "c"]);
        std::env::remove_var("TEST_ENV_LIST_CFG");
    }

    #[test]
    fn env_list_falls_back_to_default() {
        std::env::remove_var("TEST_ENV_LIST_CFG_MISSING");
        assert_eq!(
            env_list("TEST_ENV_LIST_CFG_MISSING", &["default"]),
            vec!["default"]
        );
    }
}
