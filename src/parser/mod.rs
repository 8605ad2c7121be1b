//! Drive share-link parsing into canonical resource references.
//!
//! The parser is the single entry point for untrusted locator strings. It
//! accepts exactly three URL shapes (file view links, `open?id=` links, and
//! folder links), requires an exact host match, and validates the resource
//! id character class before anything downstream sees the id.
//!
//! [`ReferenceParser::reconstruct`] is the left inverse of
//! [`ReferenceParser::parse`]: re-parsing a reconstructed locator yields the
//! same kind and id regardless of which accepted shape produced the original
//! reference.

mod locator;

pub use locator::{DEFAULT_HOST, ReferenceParser, is_valid_id};

use std::fmt;

/// Whether a reference points at a single file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A single downloadable file.
    File,
    /// A folder whose direct members can be listed and fetched.
    Folder,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// Canonical `{kind, id}` reference to a remote resource.
///
/// Immutable once constructed. Two references with the same id but different
/// kinds are distinct entities until upstream metadata confirms the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    kind: ResourceKind,
    id: String,
    original_locator: String,
}

impl ResourceReference {
    /// Creates a file reference for an upstream-confirmed id.
    ///
    /// Used for folder members and boundary ids whose kind the upstream
    /// system has already established; user-supplied locators go through
    /// [`ReferenceParser::parse`] instead.
    #[must_use]
    pub fn file(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind: ResourceKind::File,
            original_locator: id.clone(),
            id,
        }
    }

    /// Creates a folder reference for an upstream-confirmed id.
    #[must_use]
    pub fn folder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind: ResourceKind::Folder,
            original_locator: id.clone(),
            id,
        }
    }

    pub(crate) fn parsed(kind: ResourceKind, id: &str, original_locator: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            original_locator: original_locator.to_string(),
        }
    }

    /// The resource kind this reference was parsed or constructed as.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The opaque upstream resource id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The locator string this reference was parsed from.
    #[must_use]
    pub fn original_locator(&self) -> &str {
        &self.original_locator
    }
}
