//! Closed error taxonomy for upstream resource operations.
//!
//! Every failure the gateway can surface is classified into one of seven
//! kinds at the gateway boundary. Retry eligibility hangs off the kind, not
//! off inspection of source error types: only [`ResourceErrorKind::NetworkError`]
//! and [`ResourceErrorKind::DownloadFailed`] are retryable.

use thiserror::Error;

/// Errors surfaced by metadata and content operations against the upstream
/// storage provider.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The locator could not be parsed into a resource reference.
    #[error("invalid link: {locator}")]
    InvalidLink {
        /// The rejected locator string.
        locator: String,
    },

    /// Upstream reported the resource does not exist (404), or the resource
    /// kind does not match what the operation requires.
    #[error("resource not found: {id}")]
    FileNotFound {
        /// The resource id that failed to resolve.
        id: String,
    },

    /// Upstream denied access (401/403 without a rate-limit reason).
    #[error("access denied for {id}")]
    AccessDenied {
        /// The resource id that was denied.
        id: String,
        /// Whether the denied request carried a user bearer token. A 401
        /// on an authenticated request signals a token problem rather than
        /// a private resource and may trigger forced re-authentication.
        token_auth: bool,
    },

    /// Upstream 403 carrying a rate-limit reason. Terminal; the user must
    /// wait or authenticate to use their own quota.
    #[error("quota exceeded fetching {id}")]
    QuotaExceeded {
        /// The resource id the quota rejection was observed on.
        id: String,
    },

    /// Transport failure before any upstream response was received.
    #[error("network error: {detail}")]
    NetworkError {
        /// Human-readable transport failure description.
        detail: String,
    },

    /// Stream-level failure after the upstream response started.
    #[error("download failed for {id}: {detail}")]
    DownloadFailed {
        /// The resource id whose stream failed.
        id: String,
        /// Human-readable stream failure description.
        detail: String,
    },

    /// Any other upstream-side fault (unexpected status or body).
    #[error("upstream API error (HTTP {status}): {message}")]
    ApiError {
        /// The upstream HTTP status, or 0 when no status applies.
        status: u16,
        /// Upstream-provided or synthesized error message.
        message: String,
    },
}

impl ResourceError {
    /// Creates an invalid-link error.
    pub fn invalid_link(locator: impl Into<String>) -> Self {
        Self::InvalidLink {
            locator: locator.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::FileNotFound { id: id.into() }
    }

    /// Creates an access-denied error, flagging whether the request was
    /// authenticated with a user token.
    pub fn access_denied(id: impl Into<String>, token_auth: bool) -> Self {
        Self::AccessDenied {
            id: id.into(),
            token_auth,
        }
    }

    /// Creates a quota-exceeded error.
    pub fn quota_exceeded(id: impl Into<String>) -> Self {
        Self::QuotaExceeded { id: id.into() }
    }

    /// Creates a transport-level network error.
    pub fn network(detail: impl Into<String>) -> Self {
        Self::NetworkError {
            detail: detail.into(),
        }
    }

    /// Creates a stream-level download failure.
    pub fn download_failed(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DownloadFailed {
            id: id.into(),
            detail: detail.into(),
        }
    }

    /// Creates an upstream API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ResourceErrorKind {
        match self {
            Self::InvalidLink { .. } => ResourceErrorKind::InvalidLink,
            Self::FileNotFound { .. } => ResourceErrorKind::FileNotFound,
            Self::AccessDenied { .. } => ResourceErrorKind::AccessDenied,
            Self::QuotaExceeded { .. } => ResourceErrorKind::QuotaExceeded,
            Self::NetworkError { .. } => ResourceErrorKind::NetworkError,
            Self::DownloadFailed { .. } => ResourceErrorKind::DownloadFailed,
            Self::ApiError { .. } => ResourceErrorKind::ApiError,
        }
    }

    /// Whether this error is eligible for automatic retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Fieldless kind tags for the resource error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceErrorKind {
    /// Malformed or unparseable locator. Never retried.
    InvalidLink,
    /// Resource does not exist upstream. Terminal.
    FileNotFound,
    /// Access denied at the content layer. Terminal there; may trigger a
    /// re-authentication prompt at the orchestration layer.
    AccessDenied,
    /// Rate-limit-flavored denial. Terminal; the user must wait.
    QuotaExceeded,
    /// Transport failure. Retryable.
    NetworkError,
    /// Generic stream-level failure. Retryable.
    DownloadFailed,
    /// Upstream-side fault. Terminal.
    ApiError,
}

impl ResourceErrorKind {
    /// Every kind in the taxonomy, for enumeration tests and table coverage.
    pub const ALL: [Self; 7] = [
        Self::InvalidLink,
        Self::FileNotFound,
        Self::AccessDenied,
        Self::QuotaExceeded,
        Self::NetworkError,
        Self::DownloadFailed,
        Self::ApiError,
    ];

    /// The wire-level error code exposed at every boundary.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidLink => "INVALID_LINK",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::ApiError => "API_ERROR",
        }
    }

    /// Whether the bounded-retry policy applies to this kind.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError | Self::DownloadFailed)
    }
}
