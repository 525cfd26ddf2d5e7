//! GUI-facing entry points
//!
//! Every mutation goes through the shared queue lock, so a GUI thread and the
//! worker never touch the queue at the same time. Mutations emit a
//! `QueueChanged` event once the lock has been released.

use super::Shared;
use super::queue::{EnqueueOutcome, QueueState};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{DownloadOptions, OrchestratorState, QueueEvent, QueueSnapshot, WorkItem};
use std::sync::Arc;

/// Cloneable handle to a [`QueueOrchestrator`](super::QueueOrchestrator)
///
/// All methods are synchronous and safe to call from any thread, including
/// while a batch is running.
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<Shared>,
}

impl QueueHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Apply `op` under the queue lock and emit `QueueChanged` if it reports a change
    fn mutate<T>(&self, op: impl FnOnce(&mut QueueState) -> (T, bool)) -> T {
        let (value, snapshot) = {
            let mut state = self.shared.state();
            let (value, changed) = op(&mut *state);
            (value, changed.then(|| state.snapshot()))
        };
        if let Some(snapshot) = snapshot {
            self.shared.emit(QueueEvent::QueueChanged { snapshot });
        }
        value
    }

    /// Append a source to the queue
    ///
    /// Rejected if it is already queued, in flight or completed this session.
    ///
    /// # Examples
    ///
    /// ```
    /// # use piu_queue::{Config, QueueOrchestrator, EnqueueOutcome};
    /// # use piu_queue::downloader::YtDlpDownloader;
    /// # use std::{path::PathBuf, sync::Arc, time::Duration};
    /// # let downloader = Arc::new(YtDlpDownloader::new(PathBuf::from("yt-dlp"), Duration::from_secs(60)));
    /// # let orchestrator = QueueOrchestrator::new(Config::default(), downloader).unwrap();
    /// let handle = orchestrator.handle();
    /// assert_eq!(handle.enqueue("https://youtu.be/abc"), EnqueueOutcome::Added);
    /// assert_eq!(handle.enqueue("https://youtu.be/abc"), EnqueueOutcome::AlreadyQueued);
    /// ```
    pub fn enqueue(&self, source: &str) -> EnqueueOutcome {
        let outcome = self.mutate(|state| {
            let outcome = state.enqueue(source);
            (outcome, outcome == EnqueueOutcome::Added)
        });
        if outcome != EnqueueOutcome::Added {
            tracing::debug!(source, outcome = ?outcome, "Enqueue skipped");
        }
        outcome
    }

    /// Append several sources, emitting a single `QueueChanged`
    pub fn enqueue_many<I, S>(&self, sources: I) -> Vec<EnqueueOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mutate(|state| {
            let outcomes: Vec<EnqueueOutcome> = sources
                .into_iter()
                .map(|s| state.enqueue(s.as_ref()))
                .collect();
            let changed = outcomes.contains(&EnqueueOutcome::Added);
            (outcomes, changed)
        })
    }

    /// Remove an item, discarding its retry state
    ///
    /// Removing the in-flight item does not interrupt its attempt; if the
    /// attempt fails, the item is not put back.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn remove(&self, source: &str) -> Result<WorkItem> {
        self.mutate(|state| match state.queue.remove(source) {
            Some(item) => (Ok(item), true),
            None => (Err(Error::NotFound(source.to_string())), false),
        })
    }

    fn reorder(&self, source: &str, op: impl FnOnce(&mut QueueState) -> bool) -> Result<()> {
        self.mutate(|state| {
            if !state.queue.contains(source) {
                return (Err(Error::NotFound(source.to_string())), false);
            }
            let changed = op(state);
            (Ok(()), changed)
        })
    }

    /// Move an item to the tail
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn move_to_back(&self, source: &str) -> Result<()> {
        self.reorder(source, |state| state.queue.move_to_back(source))
    }

    /// Move an item to the head
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn promote_to_front(&self, source: &str) -> Result<()> {
        self.reorder(source, |state| state.queue.promote_to_front(source))
    }

    /// Move an item one position towards the head
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn move_up(&self, source: &str) -> Result<()> {
        self.reorder(source, |state| state.queue.move_up(source))
    }

    /// Move an item one position towards the tail
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn move_down(&self, source: &str) -> Result<()> {
        self.reorder(source, |state| state.queue.move_down(source))
    }

    /// Remove every exhausted item, returning their sources
    pub fn clear_exhausted(&self) -> Vec<String> {
        let removed = self.mutate(|state| {
            let max_retries = state.max_retries;
            let removed = state.queue.clear_exhausted(max_retries);
            let changed = !removed.is_empty();
            (removed, changed)
        });
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Cleared exhausted items");
        }
        removed
    }

    /// Make an item fresh again so it is selected on the next pass
    ///
    /// # Errors
    /// Returns `Error::NotFound` if the source is not queued
    pub fn reset_retries(&self, source: &str) -> Result<()> {
        self.mutate(|state| match state.queue.get_mut(source) {
            Some(item) => {
                let changed = item.retry_count != 0 || item.last_error.is_some();
                item.retry_count = 0;
                item.last_error = None;
                (Ok(()), changed)
            }
            None => (Err(Error::NotFound(source.to_string())), false),
        })
    }

    /// Copy of the queue for rendering
    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.state().snapshot()
    }

    /// Whether `source` completed during this session
    pub fn is_completed(&self, source: &str) -> bool {
        self.shared.state().ledger.contains(source.trim())
    }

    /// Toggle polling of the external source; takes effect immediately
    pub fn set_auto_poll(&self, enabled: bool) {
        tracing::debug!(enabled, "Auto-poll toggled");
        self.shared.set_auto_poll(enabled);
    }

    /// Current auto-poll setting
    pub fn auto_poll(&self) -> bool {
        self.shared.auto_poll()
    }

    /// Options used from the next attempt on
    pub fn set_download_options(&self, options: DownloadOptions) {
        self.shared.set_download_options(options);
    }

    /// Options the next attempt will use
    pub fn download_options(&self) -> DownloadOptions {
        self.shared.download_options()
    }

    /// Replace the configuration used by the next batch
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid
    pub fn update_config(&self, config: Config) -> Result<()> {
        config.validate()?;
        if !self.is_running() {
            self.mutate(|state| {
                let changed = state.max_retries != config.queue.max_retries;
                state.max_retries = config.queue.max_retries;
                ((), changed)
            });
        }
        self.shared.set_config(config);
        Ok(())
    }

    /// Configuration the next batch will use
    pub fn config(&self) -> Config {
        self.shared.config()
    }

    /// Cancel the running batch
    ///
    /// The in-flight attempt is interrupted cooperatively and the batch ends
    /// with `StopReason::StoppedByUser`. Returns false if no batch is running.
    pub fn cancel(&self) -> bool {
        let Some(token) = self.shared.active().clone() else {
            return false;
        };
        tracing::info!("Batch cancellation requested");
        token.cancel();
        self.shared.begin_draining();
        true
    }

    /// Whether a batch is in progress
    pub fn is_running(&self) -> bool {
        self.shared.active().is_some()
    }

    /// Current lifecycle state
    pub fn state(&self) -> OrchestratorState {
        self.shared.lifecycle()
    }
}
