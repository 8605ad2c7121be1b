//! Drivebridge Core Library
//!
//! Backend proxy for previewing and downloading Google Drive files and
//! folders: a user submits a share link, previews its metadata, and
//! downloads the content through the server — working around browser CORS
//! restrictions and per-account API quotas by falling back from a user
//! OAuth token to a shared API key.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`parser`] - Share-link parsing into canonical resource references
//! - [`gateway`] - Upstream metadata/content API with error classification
//! - [`download`] - Retry control, task tracking, and the download engine
//! - [`auth`] - Token lifecycle, identity-provider client, session arena
//! - [`failure`] - User-facing error descriptors for both error domains
//! - [`server`] - The HTTP boundary (axum)
//! - [`config`] - Environment-driven configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod download;
pub mod failure;
pub mod gateway;
pub mod parser;
pub mod server;

// Re-export commonly used types
pub use auth::{AuthError, AuthErrorKind, SessionStore, TokenManager, TokenState};
pub use config::AppConfig;
pub use download::{
    DEFAULT_MAX_RETRIES, DownloadEngine, DownloadOutcome, DownloadTask, RetryController,
    RetryPolicy, TaskStatus, TaskTracker,
};
pub use failure::{ErrorNotice, auth_notice, resource_notice};
pub use gateway::{
    Descriptor, DriveGateway, FileDescriptor, FolderDescriptor, ResourceError, ResourceErrorKind,
};
pub use parser::{ReferenceParser, ResourceKind, ResourceReference};
pub use server::AppState;
