//! Queue orchestration split into focused submodules.
//!
//! [`QueueOrchestrator`] owns the queue, the completion ledger and the
//! collaborators for the whole session; each call to
//! [`start`](QueueOrchestrator::start) runs one batch. The GUI talks to it
//! through a cloneable [`QueueHandle`].
//! - [`queue`] - ordered work queue
//! - [`ledger`] - completion ledger
//! - [`retry_scheduler`] - per-item retry policy
//! - [`poller`] - source polling while starving
//! - `run_loop` - the batch state machine
//! - `control` - GUI-facing entry points

mod control;
pub mod ledger;
pub mod poller;
pub mod queue;
pub mod retry_scheduler;
mod run_loop;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use control::QueueHandle;
pub use ledger::CompletionLedger;
pub use poller::SourcePoller;
pub use queue::{EnqueueOutcome, WorkQueue};
pub use retry_scheduler::{FailureVerdict, RetryScheduler};

use crate::config::Config;
use crate::display::{DisplaySink, NullSink};
use crate::downloader::{Downloader, YtDlpDownloader};
use crate::error::{Error, Result};
use crate::handoff::{Handoff, NoOpHandoff, ScriptHandoff};
use crate::sources::{SheetSource, SourceProvider};
use crate::types::{BatchSummary, DownloadOptions, OrchestratorState, QueueEvent};
use queue::QueueState;
use run_loop::BatchWorker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// State shared between the worker and every [`QueueHandle`]
///
/// All locks are synchronous and held only for short, non-async sections.
/// Events are emitted after the guard is released.
pub(crate) struct Shared {
    /// Queue, ledger and in-flight marker
    state: Mutex<QueueState>,
    /// Options snapshotted before every attempt
    options: RwLock<DownloadOptions>,
    /// Live auto-poll toggle
    auto_poll: AtomicBool,
    /// Cancellation token of the running batch (None when idle)
    active: Mutex<Option<CancellationToken>>,
    /// Current lifecycle state
    lifecycle: Mutex<OrchestratorState>,
    /// Configuration for the next batch
    config: RwLock<Config>,
    /// Observer for events
    sink: RwLock<Arc<dyn DisplaySink>>,
}

impl Shared {
    fn new(config: Config, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            state: Mutex::new(QueueState::new(config.queue.max_retries)),
            options: RwLock::new(DownloadOptions::default()),
            auto_poll: AtomicBool::new(config.polling.auto_poll_enabled),
            active: Mutex::new(None),
            lifecycle: Mutex::new(OrchestratorState::Idle),
            config: RwLock::new(config),
            sink: RwLock::new(sink),
        }
    }

    // A panicking sink must not leave the queue unusable, so poisoned locks are recovered.
    pub(crate) fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn sink(&self) -> Arc<dyn DisplaySink> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_sink(&self, sink: Arc<dyn DisplaySink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        self.sink().notify(event);
    }

    pub(crate) fn download_options(&self) -> DownloadOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_download_options(&self, options: DownloadOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub(crate) fn auto_poll(&self) -> bool {
        self.auto_poll.load(Ordering::SeqCst)
    }

    pub(crate) fn set_auto_poll(&self, enabled: bool) {
        self.auto_poll.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub(crate) fn lifecycle(&self) -> OrchestratorState {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`, emitting `StateChanged` if it differs
    ///
    /// A draining batch only leaves `Draining` for `Terminated`.
    pub(crate) fn set_lifecycle(&self, next: OrchestratorState) {
        self.transition(
            |current| current != OrchestratorState::Draining || next == OrchestratorState::Terminated,
            next,
        );
    }

    /// Move a running batch to `Draining`; any other state is left alone
    pub(crate) fn begin_draining(&self) -> bool {
        self.transition(
            |current| current == OrchestratorState::Running,
            OrchestratorState::Draining,
        )
    }

    /// Check and update under one lock, emitting after it is released
    fn transition(
        &self,
        allowed: impl FnOnce(OrchestratorState) -> bool,
        next: OrchestratorState,
    ) -> bool {
        let changed = {
            let mut current = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *current != next && allowed(*current);
            if changed {
                *current = next;
            }
            changed
        };
        if changed {
            tracing::debug!(state = ?next, "Orchestrator state changed");
            self.emit(QueueEvent::StateChanged { state: next });
        }
        changed
    }

    /// Claim the batch slot with a fresh cancellation token
    fn begin_run(&self) -> Result<CancellationToken> {
        let mut active = self.active();
        if active.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }
}

/// Releases the batch slot when the worker finishes or unwinds
pub(crate) struct RunGuard {
    shared: Arc<Shared>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.active().take();
    }
}

/// The download queue and retry orchestrator
///
/// # Examples
///
/// ```no_run
/// use piu_queue::{BroadcastSink, Config, QueueOrchestrator};
/// use std::sync::Arc;
///
/// # async fn example() -> piu_queue::Result<()> {
/// let sink = Arc::new(BroadcastSink::default());
/// let mut events = sink.subscribe();
/// let orchestrator = QueueOrchestrator::from_config(Config::default(), sink)?;
///
/// let handle = orchestrator.handle();
/// handle.enqueue("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
///
/// let run = orchestrator.start()?;
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
/// let summary = run.wait().await?;
/// println!("{}: {} downloaded", summary.reason.message(), summary.succeeded);
/// # Ok(())
/// # }
/// ```
pub struct QueueOrchestrator {
    shared: Arc<Shared>,
    downloader: Arc<dyn Downloader>,
    source: Option<Arc<dyn SourceProvider>>,
    handoff: Arc<dyn Handoff>,
}

impl QueueOrchestrator {
    /// Create an orchestrator around a downloader
    ///
    /// Starts without a source provider, without handoff and with a
    /// [`NullSink`]; use the `with_*` builders to add them.
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid
    pub fn new(config: Config, downloader: Arc<dyn Downloader>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config, Arc::new(NullSink))),
            downloader,
            source: None,
            handoff: Arc::new(NoOpHandoff),
        })
    }

    /// Build every collaborator from configuration
    ///
    /// - yt-dlp from `downloader.ytdlp_path` or PATH
    /// - a [`SheetSource`] if `sheet` is set
    /// - a [`ScriptHandoff`] if `handoff` is set
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, yt-dlp cannot be found
    /// or the HTTP client cannot be created
    pub fn from_config(config: Config, sink: Arc<dyn DisplaySink>) -> Result<Self> {
        config.validate()?;

        let downloader = YtDlpDownloader::from_config(&config.downloader)?;
        tracing::info!(
            downloader = downloader.name(),
            path = %downloader.binary_path().display(),
            "Downloader initialized"
        );

        let source = match &config.sheet {
            Some(sheet) => {
                let source = SheetSource::new(sheet.clone())?;
                tracing::info!(url = %source.url(), "Sheet source configured");
                Some(Arc::new(source) as Arc<dyn SourceProvider>)
            }
            None => None,
        };

        let handoff: Arc<dyn Handoff> = match &config.handoff {
            Some(script) => Arc::new(ScriptHandoff::new(script.clone())),
            None => Arc::new(NoOpHandoff),
        };

        let mut orchestrator = Self::new(config, Arc::new(downloader))?
            .with_handoff(handoff)
            .with_sink(sink);
        orchestrator.source = source;
        Ok(orchestrator)
    }

    /// Poll `source` when the queue starves
    pub fn with_source(mut self, source: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(source);
        self
    }

    /// Pass completed downloads to `handoff`
    pub fn with_handoff(mut self, handoff: Arc<dyn Handoff>) -> Self {
        self.handoff = handoff;
        self
    }

    /// Send events to `sink`
    pub fn with_sink(self, sink: Arc<dyn DisplaySink>) -> Self {
        self.shared.set_sink(sink);
        self
    }

    /// Handle for GUI interaction; cheap to clone and usable from any thread
    pub fn handle(&self) -> QueueHandle {
        QueueHandle::new(self.shared.clone())
    }

    /// Claim the batch slot and snapshot the configuration
    fn prepare_worker(&self) -> Result<BatchWorker> {
        let cancel = self.shared.begin_run()?;
        let guard = RunGuard {
            shared: self.shared.clone(),
        };
        let config = self.shared.config();
        self.shared.state().max_retries = config.queue.max_retries;

        Ok(BatchWorker::new(
            self.shared.clone(),
            self.downloader.clone(),
            self.source.clone(),
            self.handoff.clone(),
            &config,
            cancel,
            guard,
        ))
    }

    /// Start a batch on the current tokio runtime
    ///
    /// # Errors
    /// Returns `Error::AlreadyRunning` if a batch is in progress
    pub fn start(&self) -> Result<BatchRun> {
        let worker = self.prepare_worker()?;
        let cancel = worker.cancel_token();
        let join = tokio::spawn(worker.run());
        Ok(BatchRun { cancel, join })
    }

    /// Start a batch on a dedicated OS thread with its own runtime
    ///
    /// For embedding in GUIs that do not run a tokio runtime themselves.
    ///
    /// # Errors
    /// Returns `Error::AlreadyRunning` if a batch is in progress, or an I/O
    /// error if the thread cannot be spawned
    pub fn spawn_dedicated_thread(&self) -> Result<DedicatedRun> {
        let worker = self.prepare_worker()?;
        let cancel = worker.cancel_token();
        let thread = std::thread::Builder::new()
            .name("piu-queue-worker".to_string())
            .spawn(move || -> Result<BatchSummary> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                Ok(runtime.block_on(worker.run()))
            })?;
        Ok(DedicatedRun { cancel, thread })
    }

    /// Run a batch and wait for it to finish
    ///
    /// # Errors
    /// Returns `Error::AlreadyRunning` if a batch is in progress
    pub async fn run_to_completion(&self) -> Result<BatchSummary> {
        self.start()?.wait().await
    }
}

/// A batch running on a tokio task
pub struct BatchRun {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<BatchSummary>,
}

impl BatchRun {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the batch to finish
    ///
    /// # Errors
    /// Returns `Error::Other` if the worker task panicked or was aborted
    pub async fn wait(self) -> Result<BatchSummary> {
        self.join
            .await
            .map_err(|e| Error::Other(format!("batch task failed: {}", e)))
    }
}

/// A batch running on its own OS thread
pub struct DedicatedRun {
    cancel: CancellationToken,
    thread: std::thread::JoinHandle<Result<BatchSummary>>,
}

impl DedicatedRun {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the batch finishes
    ///
    /// # Errors
    /// Returns error if the runtime could not be built or the thread panicked
    pub fn join(self) -> Result<BatchSummary> {
        self.thread
            .join()
            .map_err(|_| Error::Other("batch worker thread panicked".into()))?
    }
}
