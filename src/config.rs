//! Environment-driven application configuration.
//!
//! Everything the proxy needs to talk upstream comes from `DRIVEBRIDGE_*`
//! environment variables, with working defaults for the public provider
//! endpoints. The CLI may override the bind address.

use std::env;

/// Default HTTP bind address for `serve`.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/api/auth/provider/callback";

/// OAuth client credentials and endpoint URLs.
#[derive(Debug, Clone)]
pub struct OauthConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Consent page URL the user is redirected to.
    pub auth_url: String,
    /// Token exchange/refresh endpoint.
    pub token_url: String,
    /// Token revocation endpoint.
    pub revoke_url: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Requested scope.
    pub scope: String,
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP bind address.
    pub bind_addr: String,
    /// Upstream metadata/content API base URL (no trailing slash).
    pub api_base: String,
    /// Shared API key used for anonymous upstream access.
    pub api_key: Option<String>,
    /// OAuth client configuration.
    pub oauth: OauthConfig,
}

impl AppConfig {
    /// Loads configuration from `DRIVEBRIDGE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// Separated from [`from_env`](Self::from_env) so tests do not mutate
    /// process-global environment state.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str, default: &str| -> String {
            lookup(name)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            bind_addr: var("DRIVEBRIDGE_BIND_ADDR", DEFAULT_BIND_ADDR),
            api_base: var("DRIVEBRIDGE_API_BASE", DEFAULT_API_BASE),
            api_key: lookup("DRIVEBRIDGE_API_KEY").filter(|value| !value.is_empty()),
            oauth: OauthConfig {
                client_id: var("DRIVEBRIDGE_OAUTH_CLIENT_ID", ""),
                client_secret: var("DRIVEBRIDGE_OAUTH_CLIENT_SECRET", ""),
                auth_url: var("DRIVEBRIDGE_OAUTH_AUTH_URL", DEFAULT_AUTH_URL),
                token_url: var("DRIVEBRIDGE_OAUTH_TOKEN_URL", DEFAULT_TOKEN_URL),
                revoke_url: var("DRIVEBRIDGE_OAUTH_REVOKE_URL", DEFAULT_REVOKE_URL),
                redirect_uri: var("DRIVEBRIDGE_OAUTH_REDIRECT_URI", DEFAULT_REDIRECT_URI),
                scope: var("DRIVEBRIDGE_OAUTH_SCOPE", DEFAULT_SCOPE),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup_uses_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.api_key.is_none());
        assert_eq!(config.oauth.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.oauth.scope, DEFAULT_SCOPE);
    }

    #[test]
    fn test_from_lookup_prefers_set_values() {
        let config = AppConfig::from_lookup(|name| match name {
            "DRIVEBRIDGE_API_BASE" => Some("http://localhost:9999/drive".to_string()),
            "DRIVEBRIDGE_API_KEY" => Some("shared-key".to_string()),
            "DRIVEBRIDGE_OAUTH_CLIENT_ID" => Some("client-1".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base, "http://localhost:9999/drive");
        assert_eq!(config.api_key.as_deref(), Some("shared-key"));
        assert_eq!(config.oauth.client_id, "client-1");
    }

    #[test]
    fn test_from_lookup_ignores_empty_values() {
        let config = AppConfig::from_lookup(|name| match name {
            "DRIVEBRIDGE_API_KEY" => Some(String::new()),
            "DRIVEBRIDGE_BIND_ADDR" => Some(String::new()),
            _ => None,
        });
        assert!(config.api_key.is_none());
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }
}
