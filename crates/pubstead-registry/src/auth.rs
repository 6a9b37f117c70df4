//! Operator identity resolution.
//!
//! A bearer credential is turned into a verified email by one call to an
//! [`IdentityVerifier`]. Nothing is cached: every request verifies again.
//!
//! # Token info endpoint
//!
//! [`TokenInfoVerifier`] speaks the OAuth2 token info protocol:
//!
//! ```text
//! GET {tokeninfo_url}?access_token={token}
//! 200 {"email": "alice@example.com", ...}   -> Some("alice@example.com")
//! 4xx                                       -> None
//! 5xx / transport failure                   -> Infrastructure error
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::deadline::bounded;
use crate::error::{Collaborator, RegistryError, RegistryResult};
use crate::types::{normalize_email, RegistryConfig};
use crate::upstream::REGISTRY_USER_AGENT;

/// External service mapping a bearer token to a verified identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// `Ok(None)` when the token is rejected; `Err` only when the verifier
    /// could not be reached or answered unusably.
    async fn verify(&self, token: &str) -> RegistryResult<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    #[serde(default)]
    email: Option<String>,
}

/// Verifier backed by an OAuth2 token info endpoint.
#[derive(Debug, Clone)]
pub struct TokenInfoVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl TokenInfoVerifier {
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(REGISTRY_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.tokeninfo_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for TokenInfoVerifier {
    async fn verify(&self, token: &str) -> RegistryResult<Option<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("access_token", token)])
            .send()
            .await
            .map_err(|e| RegistryError::infra(Collaborator::IdentityVerifier, e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            debug!(status = status.as_u16(), "token rejected by verifier");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RegistryError::infra(
                Collaborator::IdentityVerifier,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body: TokenInfoResponse = response.json().await.map_err(|e| {
            RegistryError::infra(
                Collaborator::IdentityVerifier,
                format!("failed to parse token info: {}", e),
            )
        })?;

        Ok(body.email.filter(|email| !email.trim().is_empty()))
    }
}

/// Token of a `Bearer` `Authorization` value, or a bare token.
///
/// Any other scheme yields `None`.
fn bearer_token(credential: &str) -> Option<&str> {
    let trimmed = credential.trim();
    let token = match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        // Basic, Digest and other schemes never reach the verifier.
        Some(_) => "",
        None if trimmed.eq_ignore_ascii_case("bearer") => "",
        None => trimmed,
    };
    (!token.is_empty()).then_some(token)
}

/// Turns request credentials into verified identities.
#[derive(Clone)]
pub struct IdentityResolver {
    verifier: Arc<dyn IdentityVerifier>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Resolve a raw `Authorization` value (or bare token).
    ///
    /// Returns `Ok(None)` for an absent, empty or rejected credential. A
    /// verifier that cannot be reached surfaces as a retriable error rather
    /// than as "no identity".
    pub async fn resolve(&self, credential: Option<&str>) -> RegistryResult<Option<String>> {
        let Some(token) = credential.and_then(bearer_token) else {
            return Ok(None);
        };

        let identity = bounded(
            Collaborator::IdentityVerifier,
            self.timeout,
            self.verifier.verify(token),
        )
        .await?
        .map(|email| normalize_email(&email));

        if identity.is_none() {
            warn!("credential rejected");
        }
        Ok(identity)
    }

    /// Like [`resolve`](Self::resolve), but a missing identity is `Unauthenticated`.
    pub async fn require(&self, credential: Option<&str>) -> RegistryResult<String> {
        self.resolve(credential)
            .await?
            .ok_or(RegistryError::Unauthenticated)
    }
}
