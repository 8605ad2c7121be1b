//! Download task tracking: status, monotonic progress, speed, cancellation.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::failure::ErrorNotice;

/// Minimum wall-clock interval between speed-window flushes.
const SPEED_WINDOW: Duration = Duration::from_millis(100);

/// Lifecycle status of one tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// Stream consumption underway.
    InProgress,
    /// Finished successfully; progress is exactly 100.
    Completed,
    /// Terminally failed; `last_error` is set.
    Failed,
    /// Aborted by explicit cancellation (not a failure).
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Snapshot of one tracked download.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Upstream resource id this task downloads.
    pub resource_id: String,
    /// File name being downloaded (refined once upstream supplies one).
    pub file_name: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Percent complete; non-decreasing while `InProgress`, exactly 100
    /// when `Completed`.
    pub progress_percent: f64,
    /// Most recent measured byte rate.
    pub speed_bytes_per_sec: f64,
    /// User-facing failure descriptor when `Failed`.
    pub last_error: Option<ErrorNotice>,
}

/// One progress update pushed over the event channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Resource id of the task that progressed.
    pub resource_id: String,
    /// Percent complete after this update.
    pub progress_percent: f64,
    /// Byte rate measured over the last window.
    pub speed_bytes_per_sec: f64,
    /// Bytes received so far.
    pub received_bytes: u64,
    /// Total bytes when known.
    pub total_bytes: Option<u64>,
}

/// Arena of download tasks keyed by resource id.
///
/// The tracker is the single mutation point for task state: progress updates
/// are clamped so `progress_percent` never regresses while a task is in
/// progress, even across retry attempts that restart the stream.
#[derive(Default)]
pub struct TaskTracker {
    tasks: DashMap<String, DownloadTask>,
    cancellations: DashMap<String, CancellationToken>,
    events: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl TaskTracker {
    /// Creates a tracker without an event channel (poll-only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker that also pushes [`ProgressEvent`]s, returning the
    /// receiving end.
    #[must_use]
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Some(tx),
                ..Self::default()
            },
            rx,
        )
    }

    /// Creates (or re-arms) a task in `Pending`. An existing terminal task
    /// for the same resource is replaced; its cancellation token is re-armed.
    pub fn create(&self, resource_id: &str, file_name: &str) {
        self.tasks.insert(
            resource_id.to_string(),
            DownloadTask {
                resource_id: resource_id.to_string(),
                file_name: file_name.to_string(),
                status: TaskStatus::Pending,
                progress_percent: 0.0,
                speed_bytes_per_sec: 0.0,
                last_error: None,
            },
        );
        self.cancellations
            .insert(resource_id.to_string(), CancellationToken::new());
    }

    /// Snapshot of a tracked task.
    #[must_use]
    pub fn get(&self, resource_id: &str) -> Option<DownloadTask> {
        self.tasks.get(resource_id).map(|task| task.clone())
    }

    /// Marks a task in progress.
    pub fn start(&self, resource_id: &str) {
        if let Some(mut task) = self.tasks.get_mut(resource_id) {
            task.status = TaskStatus::InProgress;
        }
    }

    /// Records a progress measurement, clamping the percent so it never
    /// decreases, and pushes an event when a channel is attached.
    pub fn record_progress(
        &self,
        resource_id: &str,
        percent: f64,
        speed_bytes_per_sec: f64,
        received_bytes: u64,
        total_bytes: Option<u64>,
    ) {
        let clamped = {
            let Some(mut task) = self.tasks.get_mut(resource_id) else {
                return;
            };
            if task.status != TaskStatus::InProgress {
                return;
            }
            let clamped = percent.clamp(task.progress_percent, 100.0);
            task.progress_percent = clamped;
            task.speed_bytes_per_sec = speed_bytes_per_sec;
            clamped
        };

        if let Some(events) = &self.events {
            let _ = events.send(ProgressEvent {
                resource_id: resource_id.to_string(),
                progress_percent: clamped,
                speed_bytes_per_sec,
                received_bytes,
                total_bytes,
            });
        }
    }

    /// Updates the task's file name once the final name is resolved.
    pub fn set_file_name(&self, resource_id: &str, file_name: &str) {
        if let Some(mut task) = self.tasks.get_mut(resource_id) {
            task.file_name = file_name.to_string();
        }
    }

    /// Marks a task completed with progress exactly 100.
    pub fn complete(&self, resource_id: &str) {
        let done = {
            let Some(mut task) = self.tasks.get_mut(resource_id) else {
                return;
            };
            task.status = TaskStatus::Completed;
            task.progress_percent = 100.0;
            (task.speed_bytes_per_sec, task.file_name.clone())
        };
        debug!(resource_id, file_name = %done.1, "task completed");

        if let Some(events) = &self.events {
            let _ = events.send(ProgressEvent {
                resource_id: resource_id.to_string(),
                progress_percent: 100.0,
                speed_bytes_per_sec: done.0,
                received_bytes: 0,
                total_bytes: None,
            });
        }
    }

    /// Marks a task failed, recording the user-facing notice. Progress is
    /// left where it was, not reset.
    pub fn fail(&self, resource_id: &str, notice: ErrorNotice) {
        if let Some(mut task) = self.tasks.get_mut(resource_id) {
            task.status = TaskStatus::Failed;
            task.last_error = Some(notice);
        }
    }

    /// Marks a task cancelled (distinct from failed).
    pub fn mark_cancelled(&self, resource_id: &str) {
        if let Some(mut task) = self.tasks.get_mut(resource_id) {
            task.status = TaskStatus::Cancelled;
        }
    }

    /// The cancellation token for a task, creating one on first use.
    #[must_use]
    pub fn cancellation(&self, resource_id: &str) -> CancellationToken {
        self.cancellations
            .entry(resource_id.to_string())
            .or_default()
            .clone()
    }

    /// Requests cancellation of a task's in-flight stream. Affects only
    /// that task.
    pub fn cancel(&self, resource_id: &str) {
        if let Some(token) = self.cancellations.get(resource_id) {
            token.cancel();
        }
    }

    /// Removes a single task and its cancellation token.
    pub fn remove(&self, resource_id: &str) {
        self.tasks.remove(resource_id);
        self.cancellations.remove(resource_id);
    }

    /// Removes every task in a terminal status (the "clear completed"
    /// action).
    pub fn clear_terminal(&self) {
        let done: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| entry.status.is_terminal())
            .map(|entry| entry.key().clone())
            .collect();
        for id in done {
            self.remove(&id);
        }
    }

    /// Aggregate progress over `resource_ids`: the arithmetic mean of the
    /// tracked tasks' percentages, where an untracked id contributes 0 and
    /// an empty set aggregates to 0.
    #[must_use]
    pub fn aggregate_progress(&self, resource_ids: &[String]) -> f64 {
        if resource_ids.is_empty() {
            return 0.0;
        }
        let sum: f64 = resource_ids
            .iter()
            .map(|id| self.get(id).map_or(0.0, |task| task.progress_percent))
            .sum();
        sum / resource_ids.len() as f64
    }
}

/// Rolling byte-rate meter flushed at ≥100 ms wall-clock intervals.
#[derive(Debug)]
pub(crate) struct SpeedMeter {
    window_start: Instant,
    window_bytes: u64,
    rate: f64,
}

impl SpeedMeter {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_bytes: 0,
            rate: 0.0,
        }
    }

    /// Records received bytes; returns the refreshed rate when the window
    /// has elapsed, `None` when still accumulating.
    pub(crate) fn record(&mut self, bytes: u64, now: Instant) -> Option<f64> {
        self.window_bytes = self.window_bytes.saturating_add(bytes);
        let elapsed = now.duration_since(self.window_start);
        if elapsed < SPEED_WINDOW {
            return None;
        }
        self.rate = self.window_bytes as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.window_bytes = 0;
        Some(self.rate)
    }

    /// Most recently measured rate.
    pub(crate) fn rate(&self) -> f64 {
        self.rate
    }
}
