//! Boundary response envelope and status mapping.

use axum::http::StatusCode;
use serde::Serialize;

use crate::auth::AuthErrorKind;
use crate::failure::ErrorNotice;
use crate::gateway::{FileDescriptor, ResourceError};

/// The `{success, data?, error?}` envelope every JSON endpoint responds
/// with.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Payload, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure descriptor, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorNotice>,
}

impl<T: Serialize> Envelope<T> {
    /// Builds a success envelope.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Builds a failure envelope.
    #[must_use]
    pub fn err(notice: ErrorNotice) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(notice),
        }
    }
}

/// Folder listing payload for `GET /api/folder/{id}/files`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    /// Folder id.
    pub folder_id: String,
    /// Folder display name.
    pub folder_name: String,
    /// Direct members in listing order.
    pub files: Vec<FileDescriptor>,
    /// Sum of member sizes.
    pub total_size: u64,
}

/// Payload for `POST /api/auth/provider`.
#[derive(Debug, Serialize)]
pub struct ConsentRedirect {
    /// Where the client should send the user to grant consent.
    pub url: String,
}

/// Payload for `GET /api/auth/me` and auth mutations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Whether the session holds an access token.
    pub authenticated: bool,
    /// Access-token expiry in epoch milliseconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

/// Maps a resource error to the boundary HTTP status.
///
/// A 401 is reserved for token-authenticated denials so clients can
/// distinguish "your token is bad" from "this resource is private".
#[must_use]
pub fn resource_status(error: &ResourceError) -> StatusCode {
    match error {
        ResourceError::InvalidLink { .. } => StatusCode::BAD_REQUEST,
        ResourceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        ResourceError::AccessDenied { token_auth, .. } => {
            if *token_auth {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::FORBIDDEN
            }
        }
        ResourceError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        ResourceError::NetworkError { .. }
        | ResourceError::DownloadFailed { .. }
        | ResourceError::ApiError { .. } => StatusCode::BAD_GATEWAY,
    }
}

/// Maps an auth error kind to the boundary HTTP status.
#[must_use]
pub fn auth_status(kind: AuthErrorKind) -> StatusCode {
    match kind {
        AuthErrorKind::AuthCancelled | AuthErrorKind::AuthFailed => StatusCode::BAD_REQUEST,
        AuthErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
        AuthErrorKind::SessionExpired => StatusCode::UNAUTHORIZED,
    }
}
