//! Error taxonomy for the authentication domain.

use thiserror::Error;

/// Errors surfaced by the login flow and token lifecycle.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user declined consent at the provider. Retryable by starting a
    /// fresh login.
    #[error("authorization was cancelled")]
    Cancelled,

    /// The token exchange (or a state/verifier check before it) failed.
    #[error("authorization failed: {detail}")]
    Failed {
        /// What went wrong, for logs and the boundary message.
        detail: String,
    },

    /// Transport failure reaching the identity provider.
    #[error("network error during authentication: {detail}")]
    NetworkError {
        /// Human-readable transport failure description.
        detail: String,
    },

    /// Refresh failed or no session exists; a fresh login is required.
    #[error("session expired; sign in again")]
    SessionExpired,
}

impl AuthError {
    /// Creates a failed-exchange error.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed {
            detail: detail.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn network(detail: impl Into<String>) -> Self {
        Self::NetworkError {
            detail: detail.into(),
        }
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Cancelled => AuthErrorKind::AuthCancelled,
            Self::Failed { .. } => AuthErrorKind::AuthFailed,
            Self::NetworkError { .. } => AuthErrorKind::NetworkError,
            Self::SessionExpired => AuthErrorKind::SessionExpired,
        }
    }
}

/// Fieldless kind tags for the auth error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// User declined consent. Retryable by re-initiating login.
    AuthCancelled,
    /// Token exchange failed. Retryable.
    AuthFailed,
    /// Transport failure. Retryable.
    NetworkError,
    /// Refresh failed; only a fresh login recovers.
    SessionExpired,
}

impl AuthErrorKind {
    /// Every kind in the taxonomy, for enumeration tests and table coverage.
    pub const ALL: [Self; 4] = [
        Self::AuthCancelled,
        Self::AuthFailed,
        Self::NetworkError,
        Self::SessionExpired,
    ];

    /// The wire-level error code exposed at the auth boundary.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::AuthCancelled => "AUTH_CANCELLED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::SessionExpired => "SESSION_EXPIRED",
        }
    }
}
