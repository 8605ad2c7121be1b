//! Download orchestration: drives one task from `Pending` to a terminal
//! status, measuring throughput and reporting progress.
//!
//! Every full attempt (opening the content stream and consuming it to
//! exhaustion) runs through the retry controller under the operation id
//! `download-{resourceId}`, so a transport error mid-stream counts as a
//! failed attempt and re-attempts restart the stream. Cancellation races
//! the whole retry sequence and is excluded from retry accounting.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::filename::resolve_file_name;
use super::retry::RetryController;
use super::task::{SpeedMeter, TaskTracker};
use crate::failure::resource_notice;
use crate::gateway::{
    Descriptor, DriveGateway, FileDescriptor, FolderDescriptor, KnownMetadata, ResourceError,
};
use crate::parser::ResourceReference;

/// A fully assembled download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Final resolved file name (extension consistent with the content
    /// type).
    pub file_name: String,
    /// Content type of the bytes.
    pub mime_type: String,
    /// The complete byte sequence.
    pub bytes: Vec<u8>,
}

/// How a download ended when it did not fail.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Stream consumed to exhaustion; task is `Completed`.
    Completed(DownloadedFile),
    /// Explicitly cancelled; task is `Cancelled`, not `Failed`.
    Cancelled,
}

/// Per-member result of a folder download.
#[derive(Debug)]
pub struct MemberDownload {
    /// The member's metadata record, in listing order.
    pub member: FileDescriptor,
    /// The member's individual outcome; one member failing does not abort
    /// the others.
    pub outcome: Result<DownloadOutcome, ResourceError>,
}

/// Result of a best-effort sequential folder download.
#[derive(Debug)]
pub struct FolderDownload {
    /// Folder id.
    pub id: String,
    /// Folder display name.
    pub name: String,
    /// Per-member outcomes in upstream listing order.
    pub members: Vec<MemberDownload>,
}

/// Orchestrates downloads through the gateway and retry controller.
///
/// Explicitly constructed with its collaborators injected; tests build
/// fresh instances per case.
pub struct DownloadEngine {
    gateway: Arc<DriveGateway>,
    retries: Arc<RetryController>,
    tracker: Arc<TaskTracker>,
}

impl DownloadEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<DriveGateway>,
        retries: Arc<RetryController>,
        tracker: Arc<TaskTracker>,
    ) -> Self {
        Self {
            gateway,
            retries,
            tracker,
        }
    }

    /// The task tracker backing this engine.
    #[must_use]
    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    /// The retry controller backing this engine.
    #[must_use]
    pub fn retries(&self) -> &Arc<RetryController> {
        &self.retries
    }

    /// Downloads a single file to completion.
    ///
    /// The task moves `Pending → InProgress`, then to `Completed`,
    /// `Failed` (with a user-facing notice recorded and progress left in
    /// place), or `Cancelled`. Retryable failures are re-attempted with
    /// backoff inside the retry controller.
    #[instrument(skip(self, known, token), fields(id = %reference.id()))]
    pub async fn download_file(
        &self,
        reference: &ResourceReference,
        known: Option<&KnownMetadata>,
        token: Option<&str>,
    ) -> Result<DownloadOutcome, ResourceError> {
        let id = reference.id().to_string();
        let initial_name = known.map_or(id.as_str(), |k| k.name.as_str());
        self.tracker.create(&id, initial_name);
        let cancel = self.tracker.cancellation(&id);
        self.tracker.start(&id);

        let operation_id = format!("download-{id}");
        let attempts = self
            .retries
            .execute_with_retry(&operation_id, || self.attempt(reference, known, token));

        tokio::select! {
            () = cancel.cancelled() => {
                // Dropping the attempt future abandons the in-flight stream;
                // cancellation never counts against the retry budget.
                info!("download cancelled");
                self.tracker.mark_cancelled(&id);
                self.retries.remove(&operation_id);
                Ok(DownloadOutcome::Cancelled)
            }
            outcome = attempts => {
                let retries = outcome.retries();
                let attempts = outcome.attempts;
                match outcome.result {
                    Ok(file) => {
                        info!(
                            file_name = %file.file_name,
                            bytes = file.bytes.len(),
                            retries = retries,
                            "download completed"
                        );
                        self.tracker.set_file_name(&id, &file.file_name);
                        self.tracker.complete(&id);
                        self.retries.remove(&operation_id);
                        Ok(DownloadOutcome::Completed(file))
                    }
                    Err(error) => {
                        warn!(%error, attempts = attempts, "download failed");
                        self.tracker.fail(&id, resource_notice(error.kind()));
                        Err(error)
                    }
                }
            }
        }
    }

    /// Downloads every direct member of a folder sequentially, in listing
    /// order. A member's terminal failure does not abort the rest; the
    /// caller observes per-member outcomes individually.
    #[instrument(skip(self, token), fields(id = %reference.id()))]
    pub async fn download_folder(
        &self,
        reference: &ResourceReference,
        token: Option<&str>,
    ) -> Result<FolderDownload, ResourceError> {
        let descriptor = self.gateway.fetch_metadata(reference, token).await?;
        let Descriptor::Folder(folder) = descriptor else {
            return Err(ResourceError::not_found(reference.id()));
        };

        info!(members = folder.members.len(), "starting folder download");
        let mut members = Vec::with_capacity(folder.members.len());
        for member in &folder.members {
            let member_reference = ResourceReference::file(&member.id);
            let known = KnownMetadata::from(member);
            let outcome = self
                .download_file(&member_reference, Some(&known), token)
                .await;
            members.push(MemberDownload {
                member: member.clone(),
                outcome,
            });
        }

        Ok(FolderDownload {
            id: folder.id,
            name: folder.name,
            members,
        })
    }

    /// Aggregate progress of a folder's member tasks: the arithmetic mean
    /// of the individual percentages, untracked members contributing 0.
    #[must_use]
    pub fn folder_progress(&self, folder: &FolderDescriptor) -> f64 {
        let ids: Vec<String> = folder.members.iter().map(|m| m.id.clone()).collect();
        self.tracker.aggregate_progress(&ids)
    }

    /// One full attempt: open the stream and consume it to exhaustion.
    async fn attempt(
        &self,
        reference: &ResourceReference,
        known: Option<&KnownMetadata>,
        token: Option<&str>,
    ) -> Result<DownloadedFile, ResourceError> {
        let id = reference.id();
        let content = self
            .gateway
            .open_content_stream(reference, known, token)
            .await?;
        let descriptor = content.descriptor;
        let mut stream = content.stream;

        let total = descriptor.size_bytes;
        let mut received: u64 = 0;
        let mut bytes = Vec::with_capacity(
            total.and_then(|t| usize::try_from(t).ok()).unwrap_or(0),
        );
        let mut meter = SpeedMeter::new(Instant::now());

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            received = received.saturating_add(chunk.len() as u64);
            bytes.extend_from_slice(&chunk);

            if let Some(rate) = meter.record(chunk.len() as u64, Instant::now()) {
                // With unknown total length progress stays at 0 until
                // completion; only the rate is reported.
                let percent = total.map_or(0.0, |t| {
                    if t == 0 {
                        100.0
                    } else {
                        received as f64 / t as f64 * 100.0
                    }
                });
                self.tracker.record_progress(id, percent, rate, received, total);
            }
        }

        debug!(received, "stream exhausted");
        let expected_name = known.map(|k| k.name.as_str());
        let file_name = resolve_file_name(
            descriptor.upstream_name.as_deref(),
            expected_name,
            &descriptor.mime_type,
        );

        Ok(DownloadedFile {
            file_name,
            mime_type: descriptor.mime_type,
            bytes,
        })
    }
}
