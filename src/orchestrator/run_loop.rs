//! The batch state machine
//!
//! One worker processes items strictly one at a time:
//! 1. Stop if the batch token is cancelled
//! 2. Select the first fresh item, else the first retryable one
//! 3. With nothing selectable, starve: poll, wait for the next poll or terminate
//! 4. Delegate the selected item to the downloader and apply the outcome
//!
//! Every exit path ends with a `BatchFinished` event.

use super::poller::SourcePoller;
use super::retry_scheduler::RetryScheduler;
use super::{RunGuard, Shared};
use crate::config::{Config, PollingConfig};
use crate::downloader::{AttemptContext, DownloadOutput, Downloader, ProgressReporter};
use crate::error::{DownloadError, Error};
use crate::handoff::Handoff;
use crate::sources::SourceProvider;
use crate::types::{
    BatchSummary, CompletedDownload, OrchestratorState, QueueEvent, RetryDecision, StopReason,
};
use crate::utils::sleep_or_cancelled;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Counters accumulated over one batch
#[derive(Default)]
struct Tally {
    succeeded: usize,
    failed_attempts: usize,
    abandoned: usize,
    completed: Vec<CompletedDownload>,
    stopped_on_error: Option<StopReason>,
}

enum StarveStep {
    Continue,
    Terminate,
}

/// Owns everything one batch needs; consumed by [`BatchWorker::run`]
pub(crate) struct BatchWorker {
    shared: Arc<Shared>,
    downloader: Arc<dyn Downloader>,
    handoff: Arc<dyn Handoff>,
    scheduler: RetryScheduler,
    poller: SourcePoller,
    polling: PollingConfig,
    cancel: CancellationToken,
    guard: Option<RunGuard>,
}

impl BatchWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        downloader: Arc<dyn Downloader>,
        source: Option<Arc<dyn SourceProvider>>,
        handoff: Arc<dyn Handoff>,
        config: &Config,
        cancel: CancellationToken,
        guard: RunGuard,
    ) -> Self {
        Self {
            shared,
            downloader,
            handoff,
            scheduler: RetryScheduler::from_config(&config.queue),
            poller: SourcePoller::new(source, &config.polling),
            polling: config.polling.clone(),
            cancel,
            guard: Some(guard),
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) async fn run(mut self) -> BatchSummary {
        let started_at = Utc::now();
        let mut tally = Tally::default();
        let mut starving = false;

        let snapshot = self.shared.state().snapshot();
        tracing::info!(
            queued = snapshot.items.len(),
            max_retries = self.scheduler.max_retries(),
            stop_on_error = self.scheduler.stop_on_error(),
            downloader = self.downloader.name(),
            "Batch started"
        );
        self.shared.set_lifecycle(OrchestratorState::Running);
        self.shared.emit(QueueEvent::QueueChanged { snapshot });

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let next = {
                let state = self.shared.state();
                state
                    .queue
                    .select_next(self.scheduler.max_retries())
                    .map(|item| item.source.clone())
            };

            match next {
                Some(source) => {
                    if starving {
                        starving = false;
                        self.shared.set_lifecycle(OrchestratorState::Running);
                    }
                    self.process_item(&source, &mut tally).await;
                }
                None => {
                    if !starving {
                        starving = true;
                        self.poller.begin_episode();
                        self.shared.set_lifecycle(OrchestratorState::Starving);
                    }
                    match self.starve_step().await {
                        StarveStep::Continue => {}
                        StarveStep::Terminate => break,
                    }
                }
            }
        }

        self.finish(started_at, tally)
    }

    /// One pass of the starving state
    async fn starve_step(&mut self) -> StarveStep {
        let now = Instant::now();
        let auto_poll = self.shared.auto_poll();
        let should_poll = {
            let state = self.shared.state();
            self.poller
                .should_poll(&state.queue, self.scheduler.max_retries(), auto_poll, now)
        };

        if should_poll {
            let refilled = match self.poller.poll(&self.cancel).await {
                Ok(fetched) => {
                    let (report, snapshot) = {
                        let mut state = self.shared.state();
                        let report = state.merge_polled(fetched);
                        (report, state.snapshot())
                    };
                    self.poller.record_merge(report.added.len());
                    tracing::info!(
                        fetched = report.fetched,
                        added = report.added.len(),
                        already_completed = report.already_completed,
                        already_queued = report.already_queued,
                        "Poll completed"
                    );
                    let added_any = !report.added.is_empty();
                    self.shared.emit(QueueEvent::PollCompleted { report });
                    if added_any {
                        self.shared.emit(QueueEvent::QueueChanged { snapshot });
                    }
                    added_any
                }
                Err(Error::Cancelled) => return StarveStep::Continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Poll failed, will retry after the poll interval");
                    self.shared.emit(QueueEvent::PollFailed {
                        error: e.to_string(),
                    });
                    false
                }
            };
            // An empty poll without waiting ends on the next pass, after one more look at the queue
            if refilled || (!self.polling.wait_for_new_work && self.poller.came_up_empty()) {
                return StarveStep::Continue;
            }
            // A poll that brought nothing always costs one backoff, whatever the interval
            sleep_or_cancelled(&self.cancel, self.polling.starve_backoff).await;
            return StarveStep::Continue;
        }

        if !auto_poll || !self.poller.has_provider() {
            tracing::debug!(auto_poll, "Nothing left to do and polling is off");
            return StarveStep::Terminate;
        }

        if !self.polling.wait_for_new_work && self.poller.came_up_empty() {
            tracing::debug!("Poll brought no new work, terminating");
            return StarveStep::Terminate;
        }

        let wait = self
            .polling
            .starve_backoff
            .min(self.poller.time_until_due(now));
        tracing::debug!(wait_ms = wait.as_millis(), "Starving, waiting for next poll");
        sleep_or_cancelled(&self.cancel, wait).await;
        StarveStep::Continue
    }

    async fn process_item(&mut self, source: &str, tally: &mut Tally) {
        let (retry_count, snapshot) = {
            let mut state = self.shared.state();
            state.queue.promote_to_front(source);
            state.current = Some(source.to_string());
            let retry_count = state.queue.get(source).map_or(0, |item| item.retry_count);
            (retry_count, state.snapshot())
        };

        tracing::debug!(source, retry_count, "Selected item");
        self.shared.emit(QueueEvent::ItemSelected {
            source: source.to_string(),
            retry_count,
        });
        self.shared.emit(QueueEvent::QueueChanged { snapshot });

        let options = self.shared.download_options();
        let ctx = AttemptContext::new(
            self.cancel.clone(),
            ProgressReporter::new(source, self.shared.sink()),
        );

        let outcome = AssertUnwindSafe(self.downloader.attempt(source, &options, &ctx))
            .catch_unwind()
            .await;

        let result: crate::Result<PathBuf> = match outcome {
            Ok(Ok(DownloadOutput {
                output_path: Some(path),
            })) => Ok(path),
            Ok(Ok(DownloadOutput { output_path: None })) => {
                tracing::error!(
                    source,
                    downloader = self.downloader.name(),
                    "Downloader reported success without an output path, treating as failure"
                );
                Err(DownloadError::MissingOutput {
                    url: source.to_string(),
                }
                .into())
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(source, panic = %message, "Downloader panicked");
                Err(DownloadError::Panicked(message).into())
            }
        };

        match result {
            Ok(path) => self.on_success(source, path, tally).await,
            Err(e) => self.on_failure(source, e, tally),
        }
    }

    async fn on_success(&mut self, source: &str, output_path: PathBuf, tally: &mut Tally) {
        let completed = CompletedDownload {
            source: source.to_string(),
            output_path,
            completed_at: Utc::now(),
        };

        let snapshot = {
            let mut state = self.shared.state();
            state.queue.remove(source);
            state.ledger.insert(source);
            state.current = None;
            state.snapshot()
        };

        tracing::info!(
            source,
            path = %completed.output_path.display(),
            "Download completed"
        );
        tally.succeeded += 1;
        tally.completed.push(completed.clone());

        self.shared.emit(QueueEvent::ItemCompleted {
            source: completed.source.clone(),
            output_path: completed.output_path.clone(),
        });
        self.shared.emit(QueueEvent::QueueChanged { snapshot });

        if let Err(e) = self.handoff.hand_off(&completed, &self.cancel).await {
            if e.is_cancelled() {
                tracing::info!(source, handoff = self.handoff.name(), "Handoff cancelled");
            } else {
                tracing::warn!(
                    source,
                    handoff = self.handoff.name(),
                    error = %e,
                    "Handoff failed"
                );
            }
            self.shared.emit(QueueEvent::HandoffFailed {
                source: completed.source,
                error: e.to_string(),
            });
        }
    }

    fn on_failure(&mut self, source: &str, error: Error, tally: &mut Tally) {
        // Decided before the stop-on-error cancel below so a user stop keeps priority
        let user_stopped = self.cancel.is_cancelled();
        let message = error.to_string();

        let (verdict, snapshot) = {
            let mut state = self.shared.state();
            state.current = None;
            let verdict = state.queue.get_mut(source).map(|item| {
                let verdict = self.scheduler.on_failure(item, message.as_str());
                (verdict, item.retry_count)
            });
            if verdict.is_some() {
                state.queue.move_to_back(source);
            }
            (verdict, state.snapshot())
        };
        tally.failed_attempts += 1;
        // An item removed mid-attempt has no verdict; the batch policy still applies
        let stop_batch = verdict
            .as_ref()
            .map_or(self.scheduler.stop_on_error(), |(verdict, _)| verdict.stop_batch);

        match verdict {
            Some((verdict, retry_count)) => {
                match verdict.decision {
                    RetryDecision::Abandon => {
                        tally.abandoned += 1;
                        tracing::error!(
                            source,
                            retry_count,
                            error = %message,
                            "Item exhausted its retries"
                        );
                    }
                    RetryDecision::Requeue if error.is_cancelled() => {
                        tracing::info!(source, retry_count, "Attempt cancelled");
                    }
                    RetryDecision::Requeue => {
                        tracing::warn!(
                            source,
                            retry_count,
                            error = %message,
                            "Download failed, moved to back of queue"
                        );
                    }
                }
                self.shared.emit(QueueEvent::ItemFailed {
                    source: source.to_string(),
                    error: message.clone(),
                    retry_count,
                    decision: verdict.decision,
                });
                if verdict.decision == RetryDecision::Abandon {
                    self.shared.emit(QueueEvent::ItemExhausted {
                        source: source.to_string(),
                        retry_count,
                    });
                }
            }
            None => {
                tracing::debug!(
                    source,
                    error = %message,
                    "Failed item was removed during its attempt, not requeued"
                );
            }
        }
        self.shared.emit(QueueEvent::QueueChanged { snapshot });

        if stop_batch && !user_stopped {
            tracing::warn!(source, "Stopping batch after failure (stop_on_error)");
            tally.stopped_on_error = Some(StopReason::StoppedOnError {
                source: source.to_string(),
                error: message,
            });
            self.cancel.cancel();
        }
    }

    fn finish(mut self, started_at: chrono::DateTime<Utc>, mut tally: Tally) -> BatchSummary {
        let reason = match tally.stopped_on_error.take() {
            Some(reason) => reason,
            None if self.cancel.is_cancelled() => StopReason::StoppedByUser,
            None => StopReason::QueueDrained,
        };

        let remaining = {
            let mut state = self.shared.state();
            state.current = None;
            state.queue.len()
        };

        let summary = BatchSummary {
            reason,
            succeeded: tally.succeeded,
            failed_attempts: tally.failed_attempts,
            abandoned: tally.abandoned,
            remaining,
            completed: tally.completed,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            reason = summary.reason.message(),
            succeeded = summary.succeeded,
            failed_attempts = summary.failed_attempts,
            abandoned = summary.abandoned,
            remaining = summary.remaining,
            "Batch finished"
        );

        self.shared.set_lifecycle(OrchestratorState::Terminated);
        // Free the slot before announcing so a listener can start the next batch
        drop(self.guard.take());
        self.shared.emit(QueueEvent::BatchFinished {
            summary: summary.clone(),
        });
        summary
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
