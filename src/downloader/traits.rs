//! Traits and types for download backends

use crate::display::DisplaySink;
use crate::types::{DownloadOptions, QueueEvent};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio_util::sync::CancellationToken;

/// What a successful attempt produced
///
/// An attempt that returns `Ok` with `output_path: None` violates the
/// downloader contract; the orchestrator treats it as a failure.
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutput {
    /// The file written by the downloader
    pub output_path: Option<PathBuf>,
}

impl DownloadOutput {
    /// Output for a completed download
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: Some(path.into()),
        }
    }
}

/// Emits [`QueueEvent::Progress`] for the in-flight item
///
/// Only whole-percent changes are forwarded so a chatty tool cannot flood the
/// display sink.
pub struct ProgressReporter {
    source: String,
    sink: Arc<dyn DisplaySink>,
    last_whole_percent: AtomicI32,
}

impl ProgressReporter {
    /// Create a reporter for `source`
    pub fn new(source: impl Into<String>, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            source: source.into(),
            sink,
            last_whole_percent: AtomicI32::new(-1),
        }
    }

    /// Report progress in percent; values are clamped to 0..=100
    pub fn report(&self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        let whole = percent.floor() as i32;
        if self.last_whole_percent.swap(whole, Ordering::Relaxed) == whole {
            return;
        }
        self.sink.notify(QueueEvent::Progress {
            source: self.source.clone(),
            percent,
        });
    }
}

/// Per-attempt context handed to a [`Downloader`]
///
/// Carries the batch cancellation token and a progress reporter. Downloaders
/// must check [`AttemptContext::is_cancelled`] (or await
/// [`CancellationToken::cancelled`]) around every blocking step and return
/// `Err(Error::Cancelled)` promptly once it fires.
pub struct AttemptContext {
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl AttemptContext {
    /// Build a context from a cancellation token and a progress reporter
    pub fn new(cancel: CancellationToken, progress: ProgressReporter) -> Self {
        Self { cancel, progress }
    }

    /// The batch cancellation token
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the batch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report progress for the current item
    pub fn report_progress(&self, percent: f32) {
        self.progress.report(percent);
    }
}

/// A download backend
///
/// The orchestrator calls [`attempt`](Downloader::attempt) for one source at a
/// time. Implementations must honor the cancellation token in `ctx` and bound
/// their own run time.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use piu_queue::downloader::{AttemptContext, DownloadOutput, Downloader};
/// use piu_queue::types::DownloadOptions;
///
/// struct Touch;
///
/// #[async_trait]
/// impl Downloader for Touch {
///     async fn attempt(
///         &self,
///         source: &str,
///         options: &DownloadOptions,
///         ctx: &AttemptContext,
///     ) -> piu_queue::Result<DownloadOutput> {
///         if ctx.is_cancelled() {
///             return Err(piu_queue::Error::Cancelled);
///         }
///         let name = source.rsplit('/').next().unwrap_or("download");
///         let path = options.output_dir.join(name);
///         tokio::fs::write(&path, b"").await?;
///         ctx.report_progress(100.0);
///         Ok(DownloadOutput::file(path))
///     }
///
///     fn name(&self) -> &'static str {
///         "touch"
///     }
/// }
/// ```
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `source` using `options`
    ///
    /// # Errors
    ///
    /// Any error marks the attempt as failed. `Error::Cancelled` should be
    /// returned when the attempt was interrupted by `ctx`'s token.
    async fn attempt(
        &self,
        source: &str,
        options: &DownloadOptions,
        ctx: &AttemptContext,
    ) -> crate::Result<DownloadOutput>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_reporter() -> (ProgressReporter, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink: Arc<dyn DisplaySink> = Arc::new(move |event: QueueEvent| {
            if let QueueEvent::Progress { percent, .. } = event {
                seen_clone.lock().unwrap().push(percent);
            }
        });
        (ProgressReporter::new("http://a", sink), seen)
    }

    #[test]
    fn progress_is_forwarded_on_whole_percent_changes_only() {
        let (reporter, seen) = recording_reporter();

        reporter.report(1.1);
        reporter.report(1.7);
        reporter.report(2.0);
        reporter.report(2.4);
        reporter.report(55.5);

        assert_eq!(*seen.lock().unwrap(), vec![1.1, 2.0, 55.5]);
    }

    #[test]
    fn progress_is_clamped_and_non_finite_ignored() {
        let (reporter, seen) = recording_reporter();

        reporter.report(f32::NAN);
        reporter.report(-5.0);
        reporter.report(250.0);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 100.0]);
    }

    #[test]
    fn context_exposes_cancellation() {
        let cancel = CancellationToken::new();
        let (reporter, _) = recording_reporter();
        let ctx = AttemptContext::new(cancel.clone(), reporter);

        assert!(!ctx.is_cancelled());
        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.cancel_token().is_cancelled());
    }
}
