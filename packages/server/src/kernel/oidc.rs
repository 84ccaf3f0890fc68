//! OIDC PKCE client (C9 flow mechanics).
//!
//! Grounded on `domains/auth/jwt.rs`'s `jsonwebtoken`-based pattern,
//! generalized from HMAC-secret validation (appropriate for tokens this
//! service mints itself) to JWKS-based RSA validation (required for a
//! third-party identity provider's id-token).

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub groups_claim: String,
    pub admin_groups: Vec<String>,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    #[allow(dead_code)]
    access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub nonce: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Extracts the configured groups claim as a list of strings,
    /// tolerating both a JSON array and a single string value.
    pub fn groups(&self, groups_claim: &str) -> Vec<String> {
        match self.extra.get(groups_claim) {
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => vec![],
        }
    }
}

pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("building OIDC HTTP client")?;
        Ok(Self { config, http })
    }

    pub async fn discover(&self) -> Result<Discovery> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            self.config.issuer.trim_end_matches('/')
        );
        let discovery = self
            .http
            .get(&url)
            .send()
            .await
            .context("fetching OIDC discovery document")?
            .error_for_status()
            .context("OIDC discovery endpoint returned an error status")?
            .json::<Discovery>()
            .await
            .context("parsing OIDC discovery document")?;
        Ok(discovery)
    }

    /// Builds the authorization-endpoint redirect URL for a login attempt.
    pub fn authorization_url(
        &self,
        discovery: &Discovery,
        state: &str,
        nonce: &str,
        challenge: &str,
    ) -> Result<String> {
        let mut url = url::Url::parse(&discovery.authorization_endpoint)
            .context("discovery document's authorization_endpoint is not a valid URL")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, discovery: &Discovery, code: &str, verifier: &str) -> Result<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(&discovery.token_endpoint)
            .form(&params)
            .send()
            .await
            .context("calling OIDC token endpoint")?
            .error_for_status()
            .context("OIDC token endpoint returned an error status")?
            .json::<TokenResponse>()
            .await
            .context("parsing OIDC token response")?;

        Ok(response.id_token)
    }

    async fn fetch_jwks(&self, discovery: &Discovery) -> Result<JwkSet> {
        let jwks = self
            .http
            .get(&discovery.jwks_uri)
            .send()
            .await
            .context("fetching JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json::<JwkSet>()
            .await
            .context("parsing JWKS")?;
        Ok(jwks)
    }

    /// Validates signature, issuer, audience and expiry, and (if supplied)
    /// the nonce against what was stashed in PendingAuthState.
    pub async fn validate_id_token(
        &self,
        discovery: &Discovery,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims> {
        let jwks = self.fetch_jwks(discovery).await?;

        let header = jsonwebtoken::decode_header(id_token).context("decoding id-token header")?;
        let kid = header.kid.ok_or_else(|| anyhow!("id-token header missing kid"))?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| anyhow!("no matching JWK for kid {kid}"))?;

        let decoding_key = DecodingKey::from_jwk(jwk).context("building decoding key from JWK")?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&discovery.issuer]);
        validation.set_audience(&[&self.config.client_id]);

        let data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .context("validating id-token signature/claims")?;

        let claims = data.claims;
        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(anyhow!("id-token nonce does not match the pending auth state"));
        }

        Ok(claims)
    }

    pub fn is_admin(&self, claims: &IdTokenClaims) -> bool {
        let groups = claims.groups(&self.config.groups_claim);
        groups.iter().any(|g| self.config.admin_groups.contains(g))
    }

    /// Builds the provider's RP-initiated logout URL, if it advertises one.
    pub fn end_session_url(&self, discovery: &Discovery, id_token_hint: &str) -> Option<String> {
        let endpoint = discovery.end_session_endpoint.as_ref()?;
        let mut url = url::Url::parse(endpoint).ok()?;
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint)
            .append_pair("post_logout_redirect_uri", &self.config.redirect_uri);
        Some(url.to_string())
    }
}

/// Generates a PKCE verifier/challenge pair: a random 32-byte verifier and
/// its base64url(SHA-256(verifier)) challenge.
pub fn generate_pkce() -> (String, String) {
    let verifier = crate::kernel::session_store::random_token();
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let digest = hasher.finalize();
    let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    (verifier, challenge)
}

/// Open-redirect guard: `next_path` must start with `/` and not `//`,
/// otherwise the caller falls back to a safe default.
pub fn sanitize_next_path(next_path: &str, fallback: &str) -> String {
    if next_path.starts_with('/') && !next_path.starts_with("//") {
        next_path.to_string()
    } else {
        fallback.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub groups: Vec<String>,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_is_deterministic_sha256() {
        let (verifier, challenge) = generate_pkce();
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let expected = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(challenge, expected);
    }

    #[test]
    fn sanitize_next_path_rejects_protocol_relative() {
        assert_eq!(sanitize_next_path("//evil.example.com", "/"), "/");
        assert_eq!(sanitize_next_path("https://evil.example.com", "/"), "/");
        assert_eq!(sanitize_next_path("/dashboard", "/"), "/dashboard");
    }

    #[test]
    fn groups_claim_handles_array_and_string() {
        let mut extra = HashMap::new();
        extra.insert(
            "groups".to_string(),
            serde_json::json!(["admins", "staff"]),
        );
        let claims = IdTokenClaims {
            sub: "s".to_string(),
            email: None,
            name: None,
            nonce: None,
            extra,
        };
        assert_eq!(claims.groups("groups"), vec!["admins", "staff"]);
        assert!(claims.groups("missing").is_empty());
    }
}
