//! HTTP boundary for the proxy.
//!
//! Thin axum handlers over the gateway, retry controller, and session
//! arena. Every JSON endpoint answers with the `{success, data?, error?}`
//! envelope; the download endpoint streams raw bytes with
//! Content-Disposition/Content-Type headers and reserves HTTP 401 for
//! token-authenticated upstream denials.

pub mod dto;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::auth::{
    AuthError, AuthErrorKind, IdentityProvider, OauthProvider, PendingLogin, SessionStore,
};
use crate::config::{AppConfig, OauthConfig};
use crate::download::filename::{content_disposition_value, resolve_file_name};
use crate::download::{RetryController, RetryPolicy};
use crate::failure::{ErrorNotice, auth_notice, resource_notice};
use crate::gateway::{
    Descriptor, DriveGateway, KnownMetadata, ResourceError, ResourceErrorKind,
};
use crate::parser::{ResourceReference, is_valid_id};
use dto::{
    ConsentRedirect, Envelope, FolderListing, SessionInfo, auth_status, resource_status,
};

/// Session cookie name.
const SESSION_COOKIE: &str = "drivebridge_session";

/// Shared state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upstream gateway.
    pub gateway: Arc<DriveGateway>,
    /// Retry controller wrapping download opens.
    pub retries: Arc<RetryController>,
    /// Session arena (token-state owner).
    pub sessions: Arc<SessionStore>,
    /// Identity provider client for code exchange.
    pub provider: Arc<dyn IdentityProvider>,
    /// Application configuration.
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wires up the production collaborators from configuration.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(OauthProvider::new(config.oauth.clone()));
        Self {
            gateway: Arc::new(DriveGateway::new(
                config.api_base.clone(),
                config.api_key.clone(),
            )),
            retries: Arc::new(RetryController::new(RetryPolicy::default())),
            sessions: Arc::new(SessionStore::new(Arc::clone(&provider))),
            provider,
            config: Arc::new(config),
        }
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/metadata/{id}", get(metadata))
        .route("/api/folder/{id}/files", get(folder_files))
        .route("/api/download/{id}", get(download))
        .route("/api/auth/provider", post(auth_provider))
        .route("/api/auth/provider/callback", get(auth_callback))
        .route("/api/auth/refresh", post(auth_refresh))
        .route("/api/auth/logout", post(auth_logout))
        .route("/api/auth/me", get(auth_me))
        .with_state(state)
}

/// Binds and serves the API until the process is stopped.
pub async fn run(state: AppState, bind_addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).await
}

// ---------------------------------------------------------------------------
// Resource handlers
// ---------------------------------------------------------------------------

async fn metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_valid_id(&id) {
        return invalid_link_response();
    }
    let token = session_token(&state, &headers).await;
    let reference = ResourceReference::file(&id);
    match state
        .gateway
        .fetch_metadata(&reference, token.as_deref())
        .await
    {
        Ok(descriptor) => Json(Envelope::ok(descriptor)).into_response(),
        Err(error) => resource_error_response(&error),
    }
}

async fn folder_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_valid_id(&id) {
        return invalid_link_response();
    }
    let token = session_token(&state, &headers).await;
    let reference = ResourceReference::folder(&id);
    match state
        .gateway
        .fetch_metadata(&reference, token.as_deref())
        .await
    {
        Ok(Descriptor::Folder(folder)) => Json(Envelope::ok(FolderListing {
            folder_id: folder.id,
            folder_name: folder.name,
            files: folder.members,
            total_size: folder.total_size_bytes,
        }))
        .into_response(),
        Ok(Descriptor::File(_)) => {
            resource_error_response(&ResourceError::not_found(&id))
        }
        Err(error) => resource_error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    name: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    size: Option<u64>,
}

async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Response {
    if !is_valid_id(&id) {
        return invalid_link_response();
    }

    let known = match (query.name.clone(), query.mime_type.clone()) {
        (Some(name), Some(mime_type)) => Some(KnownMetadata {
            name,
            mime_type,
            size_bytes: query.size,
        }),
        _ => None,
    };
    let token = session_token(&state, &headers).await;
    let reference = ResourceReference::file(&id);

    let operation_id = format!("download-{id}");
    let outcome = state
        .retries
        .execute_with_retry(&operation_id, || {
            state
                .gateway
                .open_content_stream(&reference, known.as_ref(), token.as_deref())
        })
        .await;

    match outcome.result {
        Ok(content) => {
            state.retries.remove(&operation_id);
            let file_name = resolve_file_name(
                content.descriptor.upstream_name.as_deref(),
                query.name.as_deref(),
                &content.descriptor.mime_type,
            );

            let mut response_headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&content.descriptor.mime_type) {
                response_headers.insert(header::CONTENT_TYPE, value);
            }
            if let Ok(value) = HeaderValue::from_str(&content_disposition_value(&file_name)) {
                response_headers.insert(header::CONTENT_DISPOSITION, value);
            }
            if let Some(size) = content.descriptor.size_bytes {
                response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            }

            // The client disconnecting mid-stream drops the body, which
            // abandons the upstream transfer without error.
            (
                StatusCode::OK,
                response_headers,
                Body::from_stream(content.stream),
            )
                .into_response()
        }
        Err(error) => resource_error_response(&error),
    }
}

// ---------------------------------------------------------------------------
// Auth handlers
// ---------------------------------------------------------------------------

async fn auth_provider(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, is_new) = match session_id_from_headers(&headers) {
        Some(id) => (id, false),
        None => (SessionStore::new_session_id(), true),
    };
    let session = state.sessions.obtain(&session_id);

    let pending = PendingLogin::generate();
    let url = match consent_url(&state.config.oauth, &pending) {
        Ok(url) => url,
        Err(error) => {
            warn!(%error, "consent URL construction failed");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                auth_notice(AuthErrorKind::AuthFailed),
            );
        }
    };
    session.begin_login(pending).await;

    let mut response = Json(Envelope::ok(ConsentRedirect { url })).into_response();
    if is_new && let Ok(value) = HeaderValue::from_str(&session_cookie_value(&session_id)) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(session) =
        session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id))
    else {
        return auth_error_response(&AuthError::failed("callback without a session"));
    };

    if let Some(error) = query.error {
        let auth_error = if error == "access_denied" {
            AuthError::Cancelled
        } else {
            AuthError::failed(error)
        };
        return auth_error_response(&auth_error);
    }

    // The stored state must match and the stored verifier must exist before
    // any token exchange is attempted.
    let Some(pending) = session.take_pending_login().await else {
        return auth_error_response(&AuthError::failed("no login in flight"));
    };
    if query.state.as_deref() != Some(pending.state.as_str()) {
        return auth_error_response(&AuthError::failed("state mismatch"));
    }
    let Some(code) = query.code else {
        return auth_error_response(&AuthError::failed("missing authorization code"));
    };

    match state
        .provider
        .exchange_code(&code, &pending.code_verifier)
        .await
    {
        Ok(issued) => {
            session.tokens().install(issued).await;
            let snapshot = session.tokens().snapshot().await;
            Json(Envelope::ok(SessionInfo {
                authenticated: true,
                expires_at_ms: snapshot.expires_at_ms,
            }))
            .into_response()
        }
        Err(error) => auth_error_response(&error),
    }
}

async fn auth_refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) =
        session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id))
    else {
        return auth_error_response(&AuthError::SessionExpired);
    };

    match session.tokens().refresh_now().await {
        Ok(_) => {
            let snapshot = session.tokens().snapshot().await;
            Json(Envelope::ok(SessionInfo {
                authenticated: true,
                expires_at_ms: snapshot.expires_at_ms,
            }))
            .into_response()
        }
        Err(error) => auth_error_response(&error),
    }
}

async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = session_id_from_headers(&headers) {
        if let Some(session) = state.sessions.get(&session_id) {
            session.tokens().logout().await;
        }
        state.sessions.remove(&session_id);
    }
    Json(Envelope::ok(SessionInfo {
        authenticated: false,
        expires_at_ms: None,
    }))
    .into_response()
}

async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id));
    let info = match session {
        Some(session) => {
            let snapshot = session.tokens().snapshot().await;
            SessionInfo {
                authenticated: snapshot.access_token.is_some(),
                expires_at_ms: snapshot.expires_at_ms,
            }
        }
        None => SessionInfo {
            authenticated: false,
            expires_at_ms: None,
        },
    };
    Json(Envelope::ok(info)).into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolves the session's access token, refreshing when needed. Absent or
/// unrecoverable sessions fall back to anonymous access; this never fails.
async fn session_token(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let session_id = session_id_from_headers(headers)?;
    let session = state.sessions.get(&session_id)?;
    session.tokens().current_token().await
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

fn session_cookie_value(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

fn consent_url(oauth: &OauthConfig, pending: &PendingLogin) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&oauth.auth_url)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &oauth.client_id)
        .append_pair("redirect_uri", &oauth.redirect_uri)
        .append_pair("scope", &oauth.scope)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", &pending.state)
        .append_pair("code_challenge", &pending.code_challenge())
        .append_pair("code_challenge_method", "S256");
    Ok(url.to_string())
}

fn json_error(status: StatusCode, notice: ErrorNotice) -> Response {
    (status, Json(Envelope::<()>::err(notice))).into_response()
}

fn invalid_link_response() -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        resource_notice(ResourceErrorKind::InvalidLink),
    )
}

fn resource_error_response(error: &ResourceError) -> Response {
    warn!(%error, "resource boundary failure");
    json_error(resource_status(error), resource_notice(error.kind()))
}

fn auth_error_response(error: &AuthError) -> Response {
    warn!(%error, "auth boundary failure");
    json_error(auth_status(error.kind()), auth_notice(error.kind()))
}
