//! Locator shape matching and id validation.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use super::{ResourceKind, ResourceReference};

/// Host accepted by the default parser. Exact match only, never a subdomain.
pub const DEFAULT_HOST: &str = "drive.google.com";

/// Upstream resource ids: URL-safe base64-ish identifier characters.
#[allow(clippy::expect_used)]
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{10,44}$").expect("resource id regex is valid") // Static pattern, safe to panic
});

/// Returns true when `id` matches the accepted identifier character class
/// (`[A-Za-z0-9_-]`) with length between 10 and 44.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// Parser for share links against one provider host.
///
/// Accepted shapes (exact host, explicit `http`/`https` scheme):
///
/// - `/file/d/{id}/view` → file
/// - `/open?id={id}` → file
/// - `.../folders/{id}` → folder
///
/// Anything else is rejected outright; there are no partial matches.
#[derive(Debug, Clone)]
pub struct ReferenceParser {
    host: String,
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceParser {
    /// Creates a parser for the default provider host.
    #[must_use]
    pub fn new() -> Self {
        Self::with_host(DEFAULT_HOST)
    }

    /// Creates a parser for a specific provider host.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// The host this parser accepts and reconstructs against.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Parses a locator string into a [`ResourceReference`].
    ///
    /// Input is trimmed first. Returns `None` for anything that is not
    /// exactly one of the accepted shapes: wrong host, wrong scheme,
    /// malformed path, missing or invalid id segment.
    #[must_use]
    pub fn parse(&self, locator: &str) -> Option<ResourceReference> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return None;
        }

        let url = Url::parse(trimmed).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            trace!(scheme = url.scheme(), "rejected locator scheme");
            return None;
        }
        if url.host_str() != Some(self.host.as_str()) {
            trace!(host = ?url.host_str(), "rejected locator host");
            return None;
        }

        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        // /file/d/{id}/view
        if let ["file", "d", id, "view"] = segments.as_slice()
            && is_valid_id(id)
        {
            return Some(ResourceReference::parsed(ResourceKind::File, id, trimmed));
        }

        // /open?id={id}
        if segments.as_slice() == ["open"]
            && let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "id")
            && is_valid_id(&id)
        {
            return Some(ResourceReference::parsed(ResourceKind::File, &id, trimmed));
        }

        // .../folders/{id} (the prefix varies: /drive/folders/, /drive/u/0/folders/)
        if segments.len() >= 2
            && segments[segments.len() - 2] == "folders"
            && let Some(id) = segments.last()
            && is_valid_id(id)
        {
            return Some(ResourceReference::parsed(ResourceKind::Folder, id, trimmed));
        }

        None
    }

    /// Returns whether a locator parses. Exactly `parse(locator).is_some()`;
    /// there is no separate validation path.
    #[must_use]
    pub fn is_valid(&self, locator: &str) -> bool {
        self.parse(locator).is_some()
    }

    /// Emits the canonical locator for a reference.
    ///
    /// Always the canonical form (`file/d/{id}/view` or `drive/folders/{id}`)
    /// regardless of which accepted shape produced the reference.
    #[must_use]
    pub fn reconstruct(&self, reference: &ResourceReference) -> String {
        match reference.kind() {
            ResourceKind::File => {
                format!("https://{}/file/d/{}/view", self.host, reference.id())
            }
            ResourceKind::Folder => {
                format!("https://{}/drive/folders/{}", self.host, reference.id())
            }
        }
    }
}
