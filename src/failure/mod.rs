//! User-facing error descriptors for both error domains.
//!
//! Every taxonomy kind maps to a boundary code, a human message, and a
//! suggested action; the mapping is total and covered by enumeration tests.
//! Access-control-flavored failures additionally signal that a login prompt
//! should be offered.

use serde::Serialize;

use crate::auth::AuthErrorKind;
use crate::gateway::ResourceErrorKind;

/// What the user sees when an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    /// Boundary error code (`FILE_NOT_FOUND`, `SESSION_EXPIRED`, ...).
    pub code: &'static str,
    /// Human-readable description of what happened.
    pub message: &'static str,
    /// Actionable next step.
    pub suggestion: &'static str,
    /// Whether the UI should offer a sign-in prompt for this failure.
    pub offer_login: bool,
}

/// Returns the descriptor for a resource-domain error kind.
#[must_use]
pub fn resource_notice(kind: ResourceErrorKind) -> ErrorNotice {
    match kind {
        ResourceErrorKind::InvalidLink => ErrorNotice {
            code: kind.code(),
            message: "That link is not a recognized Drive file or folder link.",
            suggestion: "Paste a full share link, e.g. https://drive.google.com/file/d/.../view.",
            offer_login: false,
        },
        ResourceErrorKind::FileNotFound => ErrorNotice {
            code: kind.code(),
            message: "The file or folder could not be found.",
            suggestion: "Check that the link is correct and the item has not been deleted.",
            offer_login: false,
        },
        ResourceErrorKind::AccessDenied => ErrorNotice {
            code: kind.code(),
            message: "You do not have permission to access this item.",
            suggestion: "Ask the owner for access, or sign in with an account that has it.",
            offer_login: true,
        },
        ResourceErrorKind::QuotaExceeded => ErrorNotice {
            code: kind.code(),
            message: "The download quota for this item has been exceeded.",
            suggestion: "Wait a while and try again, or sign in to use your own quota.",
            offer_login: true,
        },
        ResourceErrorKind::NetworkError => ErrorNotice {
            code: kind.code(),
            message: "A network error interrupted the request.",
            suggestion: "Check your connection and try again.",
            offer_login: false,
        },
        ResourceErrorKind::DownloadFailed => ErrorNotice {
            code: kind.code(),
            message: "The download failed before it could finish.",
            suggestion: "Try the download again.",
            offer_login: false,
        },
        ResourceErrorKind::ApiError => ErrorNotice {
            code: kind.code(),
            message: "The storage provider returned an unexpected error.",
            suggestion: "Try again later; the problem is on the provider side.",
            offer_login: false,
        },
    }
}

/// Returns the descriptor for an auth-domain error kind.
#[must_use]
pub fn auth_notice(kind: AuthErrorKind) -> ErrorNotice {
    match kind {
        AuthErrorKind::AuthCancelled => ErrorNotice {
            code: kind.code(),
            message: "Sign-in was cancelled before it completed.",
            suggestion: "Start the sign-in again when you are ready.",
            offer_login: true,
        },
        AuthErrorKind::AuthFailed => ErrorNotice {
            code: kind.code(),
            message: "Sign-in could not be completed.",
            suggestion: "Try signing in again.",
            offer_login: true,
        },
        AuthErrorKind::NetworkError => ErrorNotice {
            code: kind.code(),
            message: "A network error interrupted sign-in.",
            suggestion: "Check your connection and try signing in again.",
            offer_login: false,
        },
        AuthErrorKind::SessionExpired => ErrorNotice {
            code: kind.code(),
            message: "Your session has expired.",
            suggestion: "Sign in again to continue.",
            offer_login: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Coverage Totality ====================

    #[test]
    fn test_every_resource_kind_has_nonempty_notice() {
        for kind in ResourceErrorKind::ALL {
            let notice = resource_notice(kind);
            assert!(!notice.code.is_empty(), "kind: {kind:?}");
            assert!(!notice.message.is_empty(), "kind: {kind:?}");
            assert!(!notice.suggestion.is_empty(), "kind: {kind:?}");
            assert_eq!(notice.code, kind.code());
        }
    }

    #[test]
    fn test_every_auth_kind_has_nonempty_notice() {
        for kind in AuthErrorKind::ALL {
            let notice = auth_notice(kind);
            assert!(!notice.code.is_empty(), "kind: {kind:?}");
            assert!(!notice.message.is_empty(), "kind: {kind:?}");
            assert!(!notice.suggestion.is_empty(), "kind: {kind:?}");
            assert_eq!(notice.code, kind.code());
        }
    }

    // ==================== Login Prompt Flag ====================

    #[test]
    fn test_access_control_kinds_offer_login() {
        assert!(resource_notice(ResourceErrorKind::AccessDenied).offer_login);
        assert!(resource_notice(ResourceErrorKind::QuotaExceeded).offer_login);
        assert!(auth_notice(AuthErrorKind::SessionExpired).offer_login);
    }

    #[test]
    fn test_transport_kinds_do_not_offer_login() {
        assert!(!resource_notice(ResourceErrorKind::NetworkError).offer_login);
        assert!(!resource_notice(ResourceErrorKind::DownloadFailed).offer_login);
        assert!(!auth_notice(AuthErrorKind::NetworkError).offer_login);
    }
}
