//! Final file-name resolution for completed downloads.
//!
//! An upstream-supplied name (Content-Disposition or an upstream metadata
//! fetch) takes precedence over the caller-expected name; either way the
//! resolved name must carry an extension consistent with the resolved
//! content type, appended from the type→extension table when missing.

use std::path::{Path, PathBuf};

/// Maps a content type to its canonical file extension.
///
/// Covers the flat binary types the proxy commonly serves plus the concrete
/// formats provider-native documents are exported to.
#[must_use]
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "application/pdf" => Some(".pdf"),
        "text/plain" => Some(".txt"),
        "text/html" => Some(".html"),
        "text/csv" => Some(".csv"),
        "application/json" => Some(".json"),
        "application/xml" | "text/xml" => Some(".xml"),
        "application/zip" => Some(".zip"),
        "application/gzip" => Some(".gz"),
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/svg+xml" => Some(".svg"),
        "video/mp4" => Some(".mp4"),
        "audio/mpeg" => Some(".mp3"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(".docx")
        }
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some(".xlsx"),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(".pptx")
        }
        _ => None,
    }
}

/// Whether `name` already ends in something that looks like a file
/// extension (1-5 alphanumeric characters after a dot).
#[must_use]
pub fn has_extension(name: &str) -> bool {
    let Some(dot) = name.rfind('.') else {
        return false;
    };
    let after = &name[dot + 1..];
    (1..=5).contains(&after.len()) && after.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Ensures `name` carries an extension consistent with `content_type`.
///
/// A name that already has an extension is left alone; otherwise the table
/// extension for the content type is appended when one is known.
#[must_use]
pub fn ensure_extension(name: &str, content_type: &str) -> String {
    if has_extension(name) {
        return name.to_string();
    }
    match extension_for_mime(content_type) {
        Some(ext) => format!("{name}{ext}"),
        None => name.to_string(),
    }
}

/// Resolves the final file name for a completed download.
///
/// Precedence: an upstream-supplied name wins over the caller-expected name
/// only when upstream explicitly supplied one; the result always goes
/// through [`ensure_extension`].
#[must_use]
pub fn resolve_file_name(
    upstream_name: Option<&str>,
    expected_name: Option<&str>,
    content_type: &str,
) -> String {
    let base = upstream_name
        .filter(|name| !name.trim().is_empty())
        .or(expected_name.filter(|name| !name.trim().is_empty()))
        .unwrap_or("download");
    ensure_extension(base.trim(), content_type)
}

/// Parses a Content-Disposition header value into a filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example%20name.pdf` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // filename*= takes precedence (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim();
            if let Ok(decoded) = urlencoding::decode(encoded_name)
                && !decoded.is_empty()
            {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                let name = &stripped[..end];
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let name = value[..end].trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    None
}

/// Builds a Content-Disposition header value carrying both the plain and
/// RFC 5987 encoded forms of `name`.
#[must_use]
pub fn content_disposition_value(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && c != '"' && c != '\\' && !c.is_control() {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = urlencoding::encode(name);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

/// Replaces characters that are invalid on common filesystems.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim_matches(['.', ' ']);
    if trimmed.is_empty() {
        "download.bin".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolves a unique path under `dir`, adding a numeric suffix when the
/// plain name already exists.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = sanitize_filename(filename);
    let base_path = dir.join(&filename);
    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Give up on uniqueness past 1000 collisions.
    base_path
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Extension Table ====================

    #[test]
    fn test_extension_for_common_mimes() {
        assert_eq!(extension_for_mime("application/pdf"), Some(".pdf"));
        assert_eq!(extension_for_mime("image/png"), Some(".png"));
        assert_eq!(extension_for_mime("text/plain; charset=utf-8"), Some(".txt"));
        assert_eq!(
            extension_for_mime(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            ),
            Some(".xlsx")
        );
    }

    #[test]
    fn test_extension_for_unknown_mime_is_none() {
        assert_eq!(extension_for_mime("application/x-obscure"), None);
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("report.pdf"));
        assert!(has_extension("archive.gz"));
        assert!(has_extension("page.xhtml"));
        assert!(!has_extension("report"));
        assert!(!has_extension("report."));
        assert!(!has_extension("weird.longext"));
        assert!(!has_extension("trailing.dots..."));
    }

    // ==================== Name Resolution ====================

    #[test]
    fn test_ensure_extension_appends_when_missing() {
        assert_eq!(ensure_extension("report", "application/pdf"), "report.pdf");
    }

    #[test]
    fn test_ensure_extension_keeps_existing() {
        assert_eq!(
            ensure_extension("report.docx", "application/pdf"),
            "report.docx"
        );
    }

    #[test]
    fn test_ensure_extension_unknown_mime_leaves_name() {
        assert_eq!(ensure_extension("report", "application/x-obscure"), "report");
    }

    #[test]
    fn test_resolve_prefers_upstream_name() {
        let name = resolve_file_name(Some("from-upstream.pdf"), Some("expected.pdf"), "application/pdf");
        assert_eq!(name, "from-upstream.pdf");
    }

    #[test]
    fn test_resolve_falls_back_to_expected_name() {
        let name = resolve_file_name(None, Some("expected"), "application/pdf");
        assert_eq!(name, "expected.pdf");
    }

    #[test]
    fn test_resolve_ignores_blank_upstream_name() {
        let name = resolve_file_name(Some("   "), Some("expected.txt"), "text/plain");
        assert_eq!(name, "expected.txt");
    }

    #[test]
    fn test_resolve_defaults_when_no_names() {
        let name = resolve_file_name(None, None, "application/pdf");
        assert_eq!(name, "download.pdf");
    }

    // ==================== Content-Disposition ====================

    #[test]
    fn test_parse_content_disposition_quoted() {
        let name = parse_content_disposition(r#"attachment; filename="report.pdf""#);
        assert_eq!(name.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let name = parse_content_disposition("attachment; filename=report.pdf");
        assert_eq!(name.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let name =
            parse_content_disposition("attachment; filename*=UTF-8''caf%C3%A9%20notes.txt");
        assert_eq!(name.as_deref(), Some("café notes.txt"));
    }

    #[test]
    fn test_parse_content_disposition_prefers_extended_form() {
        let header = r#"attachment; filename="fallback.txt"; filename*=UTF-8''real%20name.txt"#;
        assert_eq!(
            parse_content_disposition(header).as_deref(),
            Some("real name.txt")
        );
    }

    #[test]
    fn test_parse_content_disposition_none_for_inline() {
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_content_disposition_value_round_trips() {
        let value = content_disposition_value("café notes.txt");
        assert!(value.starts_with("attachment; filename=\""));
        assert!(value.contains("filename*=UTF-8''caf%C3%A9%20notes.txt"));
        assert_eq!(
            parse_content_disposition(&value).as_deref(),
            Some("café notes.txt")
        );
    }

    // ==================== Sanitization & Paths ====================

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e.txt"), "a_b_c_d_e.txt");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_filename(""), "download.bin");
        assert_eq!(sanitize_filename("..."), "download.bin");
    }

    #[test]
    fn test_resolve_unique_path_suffixes_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        let path = resolve_unique_path(dir.path(), "file.txt");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "file_1.txt");
    }

    #[test]
    fn test_resolve_unique_path_plain_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve_unique_path(dir.path(), "fresh.txt");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "fresh.txt");
    }
}
