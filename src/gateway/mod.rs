//! Upstream storage-provider gateway.
//!
//! [`DriveGateway`] fetches metadata and binary content for a resource
//! reference, authorizing each request with a user bearer token when one is
//! supplied and falling back to the shared API key otherwise. Upstream
//! failures are classified into the closed [`ResourceError`] taxonomy at
//! this boundary; nothing downstream inspects transport error types.

pub mod error;
mod types;

pub use error::{ResourceError, ResourceErrorKind};
pub use types::{
    Descriptor, FOLDER_MIME, FileDescriptor, FolderDescriptor, KnownMetadata, NATIVE_DOC_PREFIX,
    export_target,
};

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument, trace};

use crate::download::filename::parse_content_disposition;
use crate::parser::ResourceReference;
use types::{RawErrorBody, RawFile, RawFileList};

/// Connection establishment timeout.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Idle read timeout; generous because content streams can be large.
const READ_TIMEOUT_SECS: u64 = 300;

/// Folder listing page size.
const LIST_PAGE_SIZE: u32 = 100;

/// Upstream 403 reasons that mean quota exhaustion rather than a private
/// resource.
const QUOTA_REASONS: [&str; 4] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
];

/// A live content stream plus what is known about the bytes it carries.
pub struct ContentStream {
    /// Resolved stream metadata.
    pub descriptor: StreamDescriptor,
    /// The response byte stream. Dropping it before exhaustion abandons the
    /// transfer without error; that is the expected cancellation path.
    pub stream: ByteStream,
}

/// Boxed byte stream with gateway-classified errors.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ResourceError>> + Send>>;

/// What the gateway knows about an opened stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Upstream resource id.
    pub id: String,
    /// Name upstream explicitly supplied (Content-Disposition, or the
    /// gateway's own metadata fetch). `None` when the only name available
    /// came from the caller.
    pub upstream_name: Option<String>,
    /// Content type of the bytes actually streamed (the export target for
    /// native documents).
    pub mime_type: String,
    /// Total size when known from headers or metadata.
    pub size_bytes: Option<u64>,
}

/// Gateway to the upstream file-storage provider.
///
/// One instance per process, explicitly constructed and injected; tests
/// build fresh instances pointed at a mock server.
#[derive(Debug, Clone)]
pub struct DriveGateway {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DriveGateway {
    /// Creates a gateway against `base_url` (no trailing slash), using
    /// `api_key` as the shared credential for anonymous requests.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Fetches the metadata record for a reference.
    ///
    /// The upstream-confirmed kind wins: when the resource turns out to be a
    /// folder, all direct members are listed (following page tokens until
    /// exhausted) and aggregated into a [`FolderDescriptor`]; otherwise a
    /// [`FileDescriptor`] is returned.
    #[instrument(skip(self, token), fields(id = %reference.id(), kind = %reference.kind()))]
    pub async fn fetch_metadata(
        &self,
        reference: &ResourceReference,
        token: Option<&str>,
    ) -> Result<Descriptor, ResourceError> {
        let file = self.fetch_file_metadata(reference.id(), token).await?;
        if file.mime_type == FOLDER_MIME {
            let members = self.list_folder_members(reference.id(), token).await?;
            debug!(members = members.len(), "folder listing aggregated");
            return Ok(Descriptor::Folder(FolderDescriptor::new(
                file.id, file.name, members,
            )));
        }
        Ok(Descriptor::File(file))
    }

    /// Fetches the flat metadata record for a single id.
    pub async fn fetch_file_metadata(
        &self,
        id: &str,
        token: Option<&str>,
    ) -> Result<FileDescriptor, ResourceError> {
        let url = format!("{}/files/{id}", self.base_url);
        let request = self.authorized(self.http.get(&url), token).query(&[
            ("fields", "id,name,mimeType,size,modifiedTime,iconLink"),
            ("supportsAllDrives", "true"),
        ]);
        let response = self.execute(request, id, token.is_some()).await?;
        let raw: RawFile = response
            .json()
            .await
            .map_err(|e| ResourceError::network(format!("reading metadata response: {e}")))?;
        Ok(raw.into_descriptor())
    }

    /// Lists all direct members of a folder, following page tokens until the
    /// listing is exhausted. Members come back in upstream listing order.
    pub async fn list_folder_members(
        &self,
        folder_id: &str,
        token: Option<&str>,
    ) -> Result<Vec<FileDescriptor>, ResourceError> {
        let url = format!("{}/files", self.base_url);
        let query = format!("'{folder_id}' in parents and trashed=false");
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut members = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.authorized(self.http.get(&url), token).query(&[
                ("q", query.as_str()),
                (
                    "fields",
                    "nextPageToken,files(id,name,mimeType,size,modifiedTime,iconLink)",
                ),
                ("pageSize", page_size.as_str()),
                ("supportsAllDrives", "true"),
            ]);
            if let Some(ref cursor) = page_token {
                request = request.query(&[("pageToken", cursor.as_str())]);
            }

            let response = self.execute(request, folder_id, token.is_some()).await?;
            let page: RawFileList = response
                .json()
                .await
                .map_err(|e| ResourceError::network(format!("reading listing response: {e}")))?;

            trace!(page_len = page.files.len(), "folder listing page");
            members.extend(page.files.into_iter().map(RawFile::into_descriptor));

            match page.next_page_token {
                Some(cursor) => page_token = Some(cursor),
                None => break,
            }
        }

        Ok(members)
    }

    /// Opens the content byte stream for a file reference.
    ///
    /// Supplying `known` metadata skips the redundant metadata round-trip.
    /// Provider-native document formats are requested through the export
    /// path to a concrete binary format instead of the raw media endpoint.
    #[instrument(skip(self, known, token), fields(id = %reference.id()))]
    pub async fn open_content_stream(
        &self,
        reference: &ResourceReference,
        known: Option<&KnownMetadata>,
        token: Option<&str>,
    ) -> Result<ContentStream, ResourceError> {
        let id = reference.id();

        let (mime_type, size_hint, upstream_name) = match known {
            Some(meta) => (meta.mime_type.clone(), meta.size_bytes, None),
            None => {
                let meta = self.fetch_file_metadata(id, token).await?;
                let size = (meta.size_bytes > 0).then_some(meta.size_bytes);
                (meta.mime_type, size, Some(meta.name))
            }
        };

        if mime_type == FOLDER_MIME {
            return Err(ResourceError::not_found(id));
        }

        let (response, streamed_mime, size_hint) = if mime_type.starts_with(NATIVE_DOC_PREFIX) {
            // Export/conversion path; exported size is unknown up front.
            let target = export_target(&mime_type);
            let url = format!("{}/files/{id}/export", self.base_url);
            let request = self
                .authorized(self.http.get(&url), token)
                .query(&[("mimeType", target)]);
            let response = self.execute(request, id, token.is_some()).await?;
            (response, target.to_string(), None)
        } else {
            let url = format!("{}/files/{id}", self.base_url);
            let request = self
                .authorized(self.http.get(&url), token)
                .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
            let response = self.execute(request, id, token.is_some()).await?;
            (response, mime_type, size_hint)
        };

        let disposition_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_disposition);
        let size_bytes = response.content_length().or(size_hint);

        let descriptor = StreamDescriptor {
            id: id.to_string(),
            upstream_name: disposition_name.or(upstream_name),
            mime_type: streamed_mime,
            size_bytes,
        };

        let owned_id = id.to_string();
        let stream = response
            .bytes_stream()
            .map_err(move |e| ResourceError::download_failed(&owned_id, e.to_string()));

        Ok(ContentStream {
            descriptor,
            stream: Box::pin(stream),
        })
    }

    fn authorized(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match (token, &self.api_key) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(key)) => request.query(&[("key", key.as_str())]),
            (None, None) => request,
        }
    }

    /// Sends a request, mapping transport failures to [`ResourceError::NetworkError`]
    /// and non-success statuses through [`classify_response`].
    async fn execute(
        &self,
        request: RequestBuilder,
        id: &str,
        token_auth: bool,
    ) -> Result<Response, ResourceError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResourceError::network(format!("request timed out: {e}"))
            } else {
                ResourceError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_response(id, token_auth, status, &body))
    }
}

/// Classifies a non-success upstream response into the error taxonomy.
///
/// 404 → `FileNotFound`; 401 and non-rate-limit 403 → `AccessDenied`
/// (flagging whether the request was token-authenticated); rate-limit 403 →
/// `QuotaExceeded`; anything else → `ApiError`.
fn classify_response(id: &str, token_auth: bool, status: StatusCode, body: &str) -> ResourceError {
    match status.as_u16() {
        404 => ResourceError::not_found(id),
        401 => ResourceError::access_denied(id, token_auth),
        403 => {
            if is_rate_limit_body(body) {
                ResourceError::quota_exceeded(id)
            } else {
                ResourceError::access_denied(id, token_auth)
            }
        }
        code => {
            let message = upstream_message(body)
                .unwrap_or_else(|| "unexpected upstream response".to_string());
            ResourceError::api(code, message)
        }
    }
}

fn is_rate_limit_body(body: &str) -> bool {
    if let Ok(parsed) = serde_json::from_str::<RawErrorBody>(body) {
        if parsed.error.errors.iter().any(|item| {
            item.reason
                .as_deref()
                .is_some_and(|reason| QUOTA_REASONS.contains(&reason))
        }) {
            return true;
        }
        if let Some(message) = parsed.error.message {
            let lower = message.to_lowercase();
            return lower.contains("rate limit") || lower.contains("quota");
        }
    }
    false
}

fn upstream_message(body: &str) -> Option<String> {
    serde_json::from_str::<RawErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Status Classification ====================

    #[test]
    fn test_classify_404_not_found() {
        let error = classify_response("abc", false, StatusCode::NOT_FOUND, "");
        assert_eq!(error.kind(), ResourceErrorKind::FileNotFound);
    }

    #[test]
    fn test_classify_401_access_denied_tracks_token_auth() {
        let anon = classify_response("abc", false, StatusCode::UNAUTHORIZED, "");
        assert!(matches!(
            anon,
            ResourceError::AccessDenied {
                token_auth: false,
                ..
            }
        ));

        let authed = classify_response("abc", true, StatusCode::UNAUTHORIZED, "");
        assert!(matches!(
            authed,
            ResourceError::AccessDenied {
                token_auth: true,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_plain_403_access_denied() {
        let body = r#"{"error":{"code":403,"message":"The user does not have permission","errors":[{"reason":"insufficientFilePermissions"}]}}"#;
        let error = classify_response("abc", false, StatusCode::FORBIDDEN, body);
        assert_eq!(error.kind(), ResourceErrorKind::AccessDenied);
    }

    #[test]
    fn test_classify_rate_limit_403_quota_exceeded() {
        let body = r#"{"error":{"code":403,"message":"User rate limit exceeded","errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        let error = classify_response("abc", false, StatusCode::FORBIDDEN, body);
        assert_eq!(error.kind(), ResourceErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_quota_by_message_without_reason() {
        let body = r#"{"error":{"code":403,"message":"Download quota exceeded for this file"}}"#;
        let error = classify_response("abc", false, StatusCode::FORBIDDEN, body);
        assert_eq!(error.kind(), ResourceErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_other_status_api_error_with_message() {
        let body = r#"{"error":{"code":500,"message":"Backend Error"}}"#;
        let error = classify_response("abc", false, StatusCode::INTERNAL_SERVER_ERROR, body);
        match error {
            ResourceError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Backend Error");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_unparseable_body_api_error_default_message() {
        let error = classify_response("abc", false, StatusCode::BAD_GATEWAY, "<html>oops</html>");
        match error {
            ResourceError::ApiError { status, message } => {
                assert_eq!(status, 502);
                assert!(!message.is_empty());
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
