//! Download orchestration: retry control, task tracking, file naming, and
//! the engine that drives a task to completion.

pub mod engine;
pub mod filename;
pub mod retry;
pub mod task;

pub use engine::{
    DownloadEngine, DownloadOutcome, DownloadedFile, FolderDownload, MemberDownload,
};
pub use retry::{DEFAULT_MAX_RETRIES, RetryController, RetryOutcome, RetryPolicy, RetryState};
pub use task::{DownloadTask, ProgressEvent, TaskStatus, TaskTracker};
