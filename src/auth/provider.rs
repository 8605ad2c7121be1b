//! Identity-provider token client.
//!
//! The [`IdentityProvider`] trait is the seam between the token lifecycle
//! and the actual OAuth endpoints; the production implementation speaks
//! form-encoded HTTP, and tests substitute a mock or point the endpoint
//! URLs at a local server.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::error::AuthError;
use crate::config::OauthConfig;

/// Request timeout for token-endpoint calls.
const TOKEN_TIMEOUT_SECS: u64 = 30;

/// A token pair issued by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedTokens {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token; absent on refresh responses that keep the old one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error payload from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the identity provider's token lifecycle endpoints.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges an authorization code (plus the PKCE verifier) for tokens.
    async fn exchange_code(&self, code: &str, code_verifier: &str)
    -> Result<IssuedTokens, AuthError>;

    /// Exchanges a refresh token for a fresh token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError>;

    /// Revokes a token upstream. Callers treat failures as best-effort.
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;
}

/// Production provider client speaking form-encoded OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OauthProvider {
    http: reqwest::Client,
    config: OauthConfig,
}

impl OauthProvider {
    /// Creates a provider client from endpoint configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: OauthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { http, config }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<IssuedTokens, AuthError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<IssuedTokens>()
                .await
                .map_err(|e| AuthError::failed(format!("unreadable token response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<TokenErrorBody>(&body)
            .ok()
            .and_then(|parsed| {
                parsed
                    .error_description
                    .or(parsed.error)
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| format!("token endpoint returned HTTP {status}"));
        debug!(%status, %detail, "token request rejected");
        Err(AuthError::failed(detail))
    }
}

#[async_trait]
impl IdentityProvider for OauthProvider {
    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<IssuedTokens, AuthError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    #[instrument(skip_all)]
    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(&self.config.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AuthError::network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "token revocation rejected");
            return Err(AuthError::failed(format!(
                "revocation endpoint returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
