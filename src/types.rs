//! Core types for piu-queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single queued download request
///
/// `source` is the identity key: two items with the same string are the same
/// item for dedup purposes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// URL or resource locator
    pub source: String,
    /// Number of failed attempts so far
    pub retry_count: u32,
    /// When the item entered the queue
    pub added_at: DateTime<Utc>,
    /// Error message of the most recent failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WorkItem {
    /// Create a fresh (never attempted) item
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            retry_count: 0,
            added_at: Utc::now(),
            last_error: None,
        }
    }

    /// Never attempted yet
    pub fn is_fresh(&self) -> bool {
        self.retry_count == 0
    }

    /// Reached the retry bound and is no longer selected
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Failed before but still eligible for another attempt
    pub fn is_retryable(&self, max_retries: u32) -> bool {
        self.retry_count > 0 && self.retry_count < max_retries
    }
}

/// Display status of a queued item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Never attempted
    Fresh,
    /// Failed at least once, will be retried
    Retrying,
    /// Reached max retries, kept for inspection until removed
    Exhausted,
    /// Currently being downloaded
    InFlight,
}

/// One row of a [`QueueSnapshot`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    /// URL or resource locator
    pub source: String,
    /// Failed attempts so far
    pub retry_count: u32,
    /// Derived display status
    pub status: ItemStatus,
    /// Most recent error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Read-only copy of the queue for rendering
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Items in queue order
    pub items: Vec<SnapshotItem>,
    /// Source currently being attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// Number of sources in the completion ledger
    pub completed: usize,
}

impl QueueSnapshot {
    /// Sources in queue order
    pub fn sources(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.source.as_str()).collect()
    }

    /// Look up a row by source
    pub fn get(&self, source: &str) -> Option<&SnapshotItem> {
        self.items.iter().find(|i| i.source == source)
    }
}

/// Orchestrator lifecycle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// No batch running
    #[default]
    Idle,
    /// Selecting and downloading items
    Running,
    /// Stop requested, finishing the in-flight attempt
    Draining,
    /// Nothing actionable in the queue, deciding whether to poll
    Starving,
    /// Batch finished
    Terminated,
}

/// Outcome of [`RetryScheduler::on_failure`](crate::orchestrator::RetryScheduler::on_failure)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// Move to the back and try again later
    Requeue,
    /// Retry bound reached; keep visible but never select again
    Abandon,
}

/// Downloader options, snapshotted before every attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Directory output files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// yt-dlp output template relative to `output_dir`
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// yt-dlp format selector (None = tool default)
    #[serde(default)]
    pub format: Option<String>,

    /// Only download the single video of playlist URLs
    #[serde(default = "default_true")]
    pub no_playlist: bool,

    /// Netscape cookie file passed to the tool
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// Additional raw arguments appended to the command line
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_template: default_output_template(),
            format: None,
            no_playlist: true,
            cookies_file: None,
            extra_args: Vec::new(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_output_template() -> String {
    "%(title)s [%(id)s].%(ext)s".to_string()
}

fn default_true() -> bool {
    true
}

/// A successful download handed to downstream pipelines
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDownload {
    /// The source that was downloaded
    pub source: String,
    /// File produced by the downloader
    pub output_path: PathBuf,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// Result of merging one poll into the queue
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Number of sources returned by the provider
    pub fetched: usize,
    /// Sources actually enqueued, in order
    pub added: Vec<String>,
    /// Discarded because they already completed this session
    pub already_completed: usize,
    /// Discarded because they are already queued (or repeated within the poll)
    pub already_queued: usize,
}

/// Why a batch ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// No actionable work left and no poll pending
    QueueDrained,
    /// The user cancelled the batch
    StoppedByUser,
    /// `stop_on_error` ended the batch after a failure
    StoppedOnError {
        /// The item whose failure stopped the batch
        source: String,
        /// Its error message
        error: String,
    },
}

impl StopReason {
    /// Short human-readable description for status bars
    pub fn message(&self) -> &'static str {
        match self {
            StopReason::QueueDrained => "completed, queue empty",
            StopReason::StoppedByUser => "stopped by user",
            StopReason::StoppedOnError { .. } => "stopped due to error",
        }
    }
}

/// Terminal report of one batch run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Why the batch ended
    pub reason: StopReason,
    /// Items downloaded successfully
    pub succeeded: usize,
    /// Failed attempts (an item can fail more than once)
    pub failed_attempts: usize,
    /// Items that reached the retry bound during this batch
    pub abandoned: usize,
    /// Items still in the queue when the batch ended
    pub remaining: usize,
    /// Successful downloads in completion order
    pub completed: Vec<CompletedDownload>,
    /// Batch start time
    pub started_at: DateTime<Utc>,
    /// Batch end time
    pub finished_at: DateTime<Utc>,
}

/// Event emitted to the [`DisplaySink`](crate::display::DisplaySink)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Orchestrator moved to a new lifecycle state
    StateChanged {
        /// New state
        state: OrchestratorState,
    },

    /// Queue contents changed
    QueueChanged {
        /// Current queue contents
        snapshot: QueueSnapshot,
    },

    /// An item was selected for download
    ItemSelected {
        /// Source being attempted
        source: String,
        /// Failed attempts before this one
        retry_count: u32,
    },

    /// Download progress for the in-flight item
    Progress {
        /// Source being downloaded
        source: String,
        /// Percentage (0.0 to 100.0)
        percent: f32,
    },

    /// An item completed successfully
    ItemCompleted {
        /// Source that completed
        source: String,
        /// File produced
        output_path: PathBuf,
    },

    /// An attempt failed
    ItemFailed {
        /// Source that failed
        source: String,
        /// Error message
        error: String,
        /// Failed attempts including this one
        retry_count: u32,
        /// What happens to the item next
        decision: RetryDecision,
    },

    /// An item reached the retry bound
    ItemExhausted {
        /// Source that is no longer selected
        source: String,
        /// Final retry count
        retry_count: u32,
    },

    /// A poll of the external source finished
    PollCompleted {
        /// What was merged
        report: PollReport,
    },

    /// A poll of the external source failed (non-fatal)
    PollFailed {
        /// Error message
        error: String,
    },

    /// Downstream handoff failed for a completed item
    HandoffFailed {
        /// Source whose handoff failed
        source: String,
        /// Error message
        error: String,
    },

    /// The batch finished
    BatchFinished {
        /// Terminal report
        summary: BatchSummary,
    },
}
