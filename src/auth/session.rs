//! Session arena: one token lifecycle manager per session id.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::pkce::{PendingLogin, random_session_id};
use super::provider::IdentityProvider;
use super::token::TokenManager;

/// One authenticated (or pending) session.
pub struct Session {
    tokens: TokenManager,
    pending: Mutex<Option<PendingLogin>>,
}

impl Session {
    fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            tokens: TokenManager::new(provider),
            pending: Mutex::new(None),
        }
    }

    /// The session's token lifecycle manager (the `TokenState` single
    /// writer).
    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Stores PKCE material for an in-flight login, replacing any previous
    /// attempt.
    pub async fn begin_login(&self, pending: PendingLogin) {
        *self.pending.lock().await = Some(pending);
    }

    /// Takes the in-flight login material; a second take returns `None`, so
    /// a callback can only ever match one redirect.
    pub async fn take_pending_login(&self) -> Option<PendingLogin> {
        self.pending.lock().await.take()
    }
}

/// Arena of sessions keyed by opaque session id.
///
/// Explicit create-on-first-use and explicit removal; there is no implicit
/// garbage collection. Distinct session keys never contend.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    provider: Arc<dyn IdentityProvider>,
}

impl SessionStore {
    /// Creates an empty store; every session it creates shares `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            sessions: DashMap::new(),
            provider,
        }
    }

    /// Generates a fresh opaque session id.
    #[must_use]
    pub fn new_session_id() -> String {
        random_session_id()
    }

    /// Returns the session for `id`, creating it on first use.
    #[must_use]
    pub fn obtain(&self, id: &str) -> Arc<Session> {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session = id, "creating session");
                Arc::new(Session::new(Arc::clone(&self.provider)))
            })
            .clone()
    }

    /// Returns the session for `id` when one exists.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(&entry))
    }

    /// Deletes a session entirely.
    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
