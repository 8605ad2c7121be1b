//! Token lifecycle management for one authenticated session.
//!
//! The state machine over [`TokenState`] is `Absent → Valid →
//! ExpiringNeedsRefresh → Refreshing → Valid | Absent`. "Refreshing" is the
//! interval during which the state mutex is held across the provider call,
//! so no caller ever observes a half-replaced token pair: a successful
//! refresh replaces all fields atomically, and any failure clears them all
//! before the error propagates.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::AuthError;
use super::provider::{IdentityProvider, IssuedTokens};

/// Refresh is attempted once `now >= expires_at - EXPIRY_BUFFER_MS`.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

/// The credential fields held for one session. All four are cleared
/// together; no partial state is ever observable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    /// Bearer access token.
    pub access_token: Option<String>,
    /// Refresh token used to obtain a replacement pair.
    pub refresh_token: Option<String>,
    /// Access-token expiry instant in epoch milliseconds. Absent means
    /// non-expiring.
    pub expires_at_ms: Option<i64>,
    /// Token type reported by the provider.
    pub token_type: Option<String>,
}

impl TokenState {
    /// Whether no credential material is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expires_at_ms.is_none()
            && self.token_type.is_none()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Installs an issued pair, replacing every field atomically. A refresh
    /// response without a new refresh token keeps the existing one.
    fn install(&mut self, issued: IssuedTokens, now_ms: i64) {
        let refresh_token = issued.refresh_token.or(self.refresh_token.take());
        *self = Self {
            access_token: Some(issued.access_token),
            refresh_token,
            expires_at_ms: issued.expires_in.map(|secs| {
                let lifetime_ms = i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000);
                now_ms.saturating_add(lifetime_ms)
            }),
            token_type: issued.token_type,
        };
    }
}

/// Returns whether the expiry-minus-buffer instant has been reached.
/// A token without an expiry never needs refresh.
#[must_use]
pub(crate) fn needs_refresh(expires_at_ms: Option<i64>, now_ms: i64) -> bool {
    match expires_at_ms {
        Some(expires_at) => now_ms >= expires_at - EXPIRY_BUFFER_MS,
        None => false,
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(i64::MAX)
}

/// Owns one session's [`TokenState`] as its single writer.
pub struct TokenManager {
    state: Mutex<TokenState>,
    provider: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager with no credential material (`Absent`).
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            state: Mutex::new(TokenState::default()),
            provider,
        }
    }

    /// Installs a freshly issued token pair (after a code exchange).
    pub async fn install(&self, issued: IssuedTokens) {
        let mut state = self.state.lock().await;
        state.install(issued, now_ms());
    }

    /// Returns a usable access token, refreshing first when the expiry
    /// buffer has been reached.
    ///
    /// On refresh failure all fields are cleared and `None` is returned —
    /// the caller falls back to anonymous shared-credential access; this
    /// path never raises.
    pub async fn current_token(&self) -> Option<String> {
        self.token_at(now_ms()).await
    }

    /// Like [`current_token`](Self::current_token), but refresh failure (or
    /// an absent session) raises [`AuthError::SessionExpired`] for call
    /// sites that must not silently degrade to anonymous access.
    pub async fn require_token(&self) -> Result<String, AuthError> {
        self.token_at(now_ms())
            .await
            .ok_or(AuthError::SessionExpired)
    }

    /// Forces a refresh attempt regardless of expiry. Failure clears the
    /// session and raises [`AuthError::SessionExpired`].
    pub async fn refresh_now(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        let Some(refresh_token) = state.refresh_token.clone() else {
            state.clear();
            return Err(AuthError::SessionExpired);
        };
        match self.provider.refresh(&refresh_token).await {
            Ok(issued) => {
                state.install(issued, now_ms());
                state
                    .access_token
                    .clone()
                    .ok_or(AuthError::SessionExpired)
            }
            Err(error) => {
                warn!(%error, "token refresh failed; clearing session");
                state.clear();
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Clears all credential material unconditionally and requests upstream
    /// revocation best-effort; a revocation failure never prevents the
    /// local clearing (which has already happened).
    pub async fn logout(&self) {
        let taken = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut *state)
        };
        let token = taken.refresh_token.or(taken.access_token);
        if let Some(token) = token
            && let Err(error) = self.provider.revoke(&token).await
        {
            debug!(%error, "best-effort token revocation failed");
        }
    }

    /// Whether the session currently holds an access token.
    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.access_token.is_some()
    }

    /// Snapshot of the current state (for status reporting; never exposes
    /// tokens past the boundary).
    pub async fn snapshot(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    pub(crate) async fn token_at(&self, now_ms_value: i64) -> Option<String> {
        let mut state = self.state.lock().await;
        let access = state.access_token.clone()?;

        if !needs_refresh(state.expires_at_ms, now_ms_value) {
            return Some(access);
        }

        let Some(refresh_token) = state.refresh_token.clone() else {
            debug!("token expiring with no refresh token; clearing session");
            state.clear();
            return None;
        };

        debug!("access token within expiry buffer; refreshing");
        match self.provider.refresh(&refresh_token).await {
            Ok(issued) => {
                state.install(issued, now_ms_value);
                state.access_token.clone()
            }
            Err(error) => {
                warn!(%error, "token refresh failed; clearing session");
                state.clear();
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Scripted provider: each refresh pops the next canned result.
    #[derive(Default)]
    struct ScriptedProvider {
        refresh_results: std::sync::Mutex<Vec<Result<IssuedTokens, AuthError>>>,
        refresh_calls: AtomicU32,
        revoke_calls: AtomicU32,
        revoke_fails: bool,
    }

    impl ScriptedProvider {
        fn with_refreshes(results: Vec<Result<IssuedTokens, AuthError>>) -> Self {
            Self {
                refresh_results: std::sync::Mutex::new(results),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn exchange_code(
            &self,
            _code: &str,
            _verifier: &str,
        ) -> Result<IssuedTokens, AuthError> {
            Err(AuthError::failed("not scripted"))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<IssuedTokens, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(AuthError::failed("script exhausted")))
        }

        async fn revoke(&self, _token: &str) -> Result<(), AuthError> {
            self.revoke_calls.fetch_add(1, Ordering::SeqCst);
            if self.revoke_fails {
                Err(AuthError::failed("revocation rejected"))
            } else {
                Ok(())
            }
        }
    }

    fn issued(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> IssuedTokens {
        IssuedTokens {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    async fn manager_with_state(
        provider: Arc<ScriptedProvider>,
        state: TokenState,
    ) -> TokenManager {
        let manager = TokenManager::new(provider);
        *manager.state.lock().await = state;
        manager
    }

    fn valid_state(expires_at_ms: Option<i64>) -> TokenState {
        TokenState {
            access_token: Some("access-0".to_string()),
            refresh_token: Some("refresh-0".to_string()),
            expires_at_ms,
            token_type: Some("Bearer".to_string()),
        }
    }

    // ==================== Expiry Buffer ====================

    #[test]
    fn test_needs_refresh_exactly_at_buffer_boundary() {
        let expires_at = 1_000_000;
        assert!(!needs_refresh(Some(expires_at), expires_at - EXPIRY_BUFFER_MS - 1));
        assert!(needs_refresh(Some(expires_at), expires_at - EXPIRY_BUFFER_MS));
        assert!(needs_refresh(Some(expires_at), expires_at + 1));
    }

    #[test]
    fn test_needs_refresh_never_without_expiry() {
        assert!(!needs_refresh(None, i64::MAX));
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_refresh() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        let token = manager.token_at(10_000_000 - EXPIRY_BUFFER_MS - 1).await;
        assert_eq!(token.as_deref(), Some("access-0"));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_triggers_refresh() {
        let provider = Arc::new(ScriptedProvider::with_refreshes(vec![Ok(issued(
            "access-1",
            Some("refresh-1"),
            Some(3600),
        ))]));
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        let token = manager.token_at(10_000_000 - EXPIRY_BUFFER_MS).await;
        assert_eq!(token.as_deref(), Some("access-1"));
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);

        let state = manager.snapshot().await;
        assert_eq!(state.refresh_token.as_deref(), Some("refresh-1"));
        assert!(state.expires_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_not_reissued() {
        let provider = Arc::new(ScriptedProvider::with_refreshes(vec![Ok(issued(
            "access-1",
            None,
            Some(3600),
        ))]));
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        let token = manager.token_at(10_000_000).await;
        assert_eq!(token.as_deref(), Some("access-1"));
        let state = manager.snapshot().await;
        assert_eq!(state.refresh_token.as_deref(), Some("refresh-0"));
    }

    // ==================== Failure Clearing ====================

    #[tokio::test]
    async fn test_failed_refresh_clears_all_fields_and_returns_none() {
        let provider = Arc::new(ScriptedProvider::with_refreshes(vec![Err(
            AuthError::failed("invalid_grant"),
        )]));
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        let token = manager.token_at(10_000_000).await;
        assert!(token.is_none());
        assert!(manager.snapshot().await.is_empty());

        // A subsequent call observes a fully absent session.
        assert!(manager.current_token().await.is_none());
    }

    #[tokio::test]
    async fn test_require_token_raises_session_expired_on_failed_refresh() {
        let provider = Arc::new(ScriptedProvider::with_refreshes(vec![Err(
            AuthError::failed("invalid_grant"),
        )]));
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(0))).await;

        let result = manager.require_token().await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
        assert!(manager.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_require_token_on_absent_session() {
        let manager = TokenManager::new(Arc::new(ScriptedProvider::default()));
        assert!(matches!(
            manager.require_token().await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_expiring_without_refresh_token_clears() {
        let provider = Arc::new(ScriptedProvider::default());
        let state = TokenState {
            refresh_token: None,
            ..valid_state(Some(1000))
        };
        let manager = manager_with_state(Arc::clone(&provider), state).await;

        assert!(manager.token_at(1000).await.is_none());
        assert!(manager.snapshot().await.is_empty());
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    // ==================== Logout ====================

    #[tokio::test]
    async fn test_logout_clears_and_revokes() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        manager.logout().await;
        assert!(manager.snapshot().await.is_empty());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_revocation_fails() {
        let provider = Arc::new(ScriptedProvider {
            revoke_fails: true,
            ..ScriptedProvider::default()
        });
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(10_000_000))).await;

        manager.logout().await;
        assert!(manager.snapshot().await.is_empty());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_on_absent_session_is_noop_upstream() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = TokenManager::new(Arc::clone(&provider) as Arc<dyn IdentityProvider>);
        manager.logout().await;
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 0);
    }

    // ==================== Install / Forced Refresh ====================

    #[tokio::test]
    async fn test_install_populates_all_fields() {
        let manager = TokenManager::new(Arc::new(ScriptedProvider::default()));
        manager
            .install(issued("access-0", Some("refresh-0"), Some(3600)))
            .await;

        let state = manager.snapshot().await;
        assert_eq!(state.access_token.as_deref(), Some("access-0"));
        assert_eq!(state.refresh_token.as_deref(), Some("refresh-0"));
        assert!(state.expires_at_ms.is_some());
        assert!(manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_now_failure_clears_session() {
        let provider = Arc::new(ScriptedProvider::with_refreshes(vec![Err(
            AuthError::failed("invalid_grant"),
        )]));
        let manager =
            manager_with_state(Arc::clone(&provider), valid_state(Some(i64::MAX))).await;

        let result = manager.refresh_now().await;
        assert!(matches!(result, Err(AuthError::SessionExpired)));
        assert!(manager.snapshot().await.is_empty());
    }
}
