//! Descriptor types and upstream payload shapes.

use serde::{Deserialize, Serialize};

/// Mime type upstream uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Prefix shared by all provider-native document formats. These cannot be
/// fetched as raw media and must go through the export path.
pub const NATIVE_DOC_PREFIX: &str = "application/vnd.google-apps.";

/// Export target for a provider-native document format: the concrete binary
/// mime type requested from the conversion endpoint.
#[must_use]
pub fn export_target(mime_type: &str) -> &'static str {
    match mime_type {
        "application/vnd.google-apps.document" => "application/pdf",
        "application/vnd.google-apps.spreadsheet" => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        "application/vnd.google-apps.presentation" => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        "application/vnd.google-apps.drawing" => "image/png",
        _ => "application/pdf",
    }
}

/// Metadata record for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Upstream resource id.
    pub id: String,
    /// Display name, as reported by upstream.
    pub name: String,
    /// Content type reported by upstream.
    pub mime_type: String,
    /// Size in bytes. Zero for native documents, which have no fixed size
    /// until exported.
    pub size_bytes: u64,
    /// Last-modified instant (RFC 3339), when upstream supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    /// Icon URL, when upstream supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Metadata record for a folder and its direct members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    /// Upstream resource id.
    pub id: String,
    /// Display name, as reported by upstream.
    pub name: String,
    /// Direct members in upstream listing order (paginated aggregation;
    /// not contractually sorted).
    pub members: Vec<FileDescriptor>,
    /// Sum of member sizes.
    pub total_size_bytes: u64,
}

impl FolderDescriptor {
    /// Builds a folder descriptor, aggregating `total_size_bytes` from the
    /// member sizes.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, members: Vec<FileDescriptor>) -> Self {
        let total_size_bytes = members.iter().map(|m| m.size_bytes).sum();
        Self {
            id: id.into(),
            name: name.into(),
            members,
            total_size_bytes,
        }
    }
}

/// Either kind of metadata record, as confirmed by upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Descriptor {
    /// A single file.
    File(FileDescriptor),
    /// A folder with its member listing.
    Folder(FolderDescriptor),
}

/// Caller-supplied metadata that lets the gateway skip a redundant metadata
/// round-trip before opening a content stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownMetadata {
    /// Expected file name.
    pub name: String,
    /// Expected content type.
    pub mime_type: String,
    /// Expected size, when known.
    pub size_bytes: Option<u64>,
}

impl From<&FileDescriptor> for KnownMetadata {
    fn from(descriptor: &FileDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            mime_type: descriptor.mime_type.clone(),
            size_bytes: (descriptor.size_bytes > 0).then_some(descriptor.size_bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream wire shapes
// ---------------------------------------------------------------------------

/// Raw file resource as returned by the upstream metadata API. `size` comes
/// over the wire as a decimal string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub icon_link: Option<String>,
}

impl RawFile {
    pub(crate) fn into_descriptor(self) -> FileDescriptor {
        let size_bytes = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        FileDescriptor {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            size_bytes,
            modified_at: self.modified_time,
            icon_url: self.icon_link,
        }
    }
}

/// One page of a folder listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFileList {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub files: Vec<RawFile>,
}

/// Upstream error envelope: `{"error": {"code", "message", "errors": [...]}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawErrorBody {
    pub error: RawErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<RawErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawErrorItem {
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_file_parses_string_size() {
        let raw: RawFile = serde_json::from_str(
            r#"{"id":"abc","name":"report.pdf","mimeType":"application/pdf","size":"2048"}"#,
        )
        .unwrap();
        let descriptor = raw.into_descriptor();
        assert_eq!(descriptor.size_bytes, 2048);
        assert_eq!(descriptor.name, "report.pdf");
    }

    #[test]
    fn test_raw_file_missing_size_defaults_to_zero() {
        let raw: RawFile = serde_json::from_str(
            r#"{"id":"abc","name":"Doc","mimeType":"application/vnd.google-apps.document"}"#,
        )
        .unwrap();
        assert_eq!(raw.into_descriptor().size_bytes, 0);
    }

    #[test]
    fn test_folder_descriptor_aggregates_member_sizes() {
        let members = vec![
            FileDescriptor {
                id: "a".into(),
                name: "a.txt".into(),
                mime_type: "text/plain".into(),
                size_bytes: 10,
                modified_at: None,
                icon_url: None,
            },
            FileDescriptor {
                id: "b".into(),
                name: "b.txt".into(),
                mime_type: "text/plain".into(),
                size_bytes: 32,
                modified_at: None,
                icon_url: None,
            },
        ];
        let folder = FolderDescriptor::new("f", "stuff", members);
        assert_eq!(folder.total_size_bytes, 42);
    }

    #[test]
    fn test_export_targets() {
        assert_eq!(
            export_target("application/vnd.google-apps.document"),
            "application/pdf"
        );
        assert_eq!(
            export_target("application/vnd.google-apps.spreadsheet"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(export_target("application/vnd.google-apps.unknown"), "application/pdf");
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let descriptor = FileDescriptor {
            id: "abc".into(),
            name: "x".into(),
            mime_type: "text/plain".into(),
            size_bytes: 1,
            modified_at: Some("2026-01-01T00:00:00Z".into()),
            icon_url: None,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["mimeType"], "text/plain");
        assert_eq!(json["sizeBytes"], 1);
        assert_eq!(json["modifiedAt"], "2026-01-01T00:00:00Z");
        assert!(json.get("iconUrl").is_none());
    }
}
