//! Shared fakes for orchestrator tests.

use crate::config::Config;
use crate::display::DisplaySink;
use crate::downloader::{AttemptContext, DownloadOutput, Downloader};
use crate::error::{DownloadError, Error, Result};
use crate::handoff::Handoff;
use crate::orchestrator::QueueOrchestrator;
use crate::sources::SourceProvider;
use crate::types::{BatchSummary, CompletedDownload, DownloadOptions, QueueEvent};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a scripted attempt does
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Succeed,
    Fail(&'static str),
    /// Fail after a pause, leaving time to edit the queue mid-attempt
    FailAfter(Duration, &'static str),
    /// Report success without an output path
    NoOutput,
    Panic,
    /// Block until the batch token is cancelled, then return `Cancelled`
    WaitForCancel,
}

/// Downloader following a per-source script; unscripted attempts succeed
#[derive(Default)]
pub(crate) struct ScriptedDownloader {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    attempts: Mutex<Vec<String>>,
    options_seen: Mutex<Vec<DownloadOptions>>,
}

impl ScriptedDownloader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, source: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.to_string(), steps.into_iter().collect());
        self
    }

    /// Sources in attempt order
    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn options_seen(&self) -> Vec<DownloadOptions> {
        self.options_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn attempt(
        &self,
        source: &str,
        options: &DownloadOptions,
        ctx: &AttemptContext,
    ) -> Result<DownloadOutput> {
        self.attempts.lock().unwrap().push(source.to_string());
        self.options_seen.lock().unwrap().push(options.clone());

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(source)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => {
                ctx.report_progress(50.0);
                ctx.report_progress(100.0);
                let name = source.rsplit('/').next().unwrap_or("file");
                Ok(DownloadOutput::file(
                    options.output_dir.join(format!("{}.mp4", name)),
                ))
            }
            Step::Fail(message) => Err(DownloadError::ToolFailed {
                exit_code: Some(1),
                stderr: message.to_string(),
            }
            .into()),
            Step::FailAfter(pause, message) => {
                tokio::time::sleep(pause).await;
                Err(DownloadError::ToolFailed {
                    exit_code: Some(1),
                    stderr: message.to_string(),
                }
                .into())
            }
            Step::NoOutput => Ok(DownloadOutput::default()),
            Step::Panic => panic!("scripted downloader panic for {}", source),
            Step::WaitForCancel => {
                ctx.cancel_token().cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Source returning queued responses, then empty lists
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: Mutex<VecDeque<std::result::Result<Vec<String>, String>>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then_ok(self, sources: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(sources.iter().map(|s| s.to_string()).collect()));
        self
    }

    /// A permanent (non-retryable) failure
    pub(crate) fn then_err(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(sources)) => Ok(sources),
            Some(Err(message)) => Err(Error::Source(message)),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink collecting every event
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<QueueEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&QueueEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl DisplaySink for RecordingSink {
    fn notify(&self, event: QueueEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Handoff recording what it receives, optionally slow or failing
#[derive(Default)]
pub(crate) struct RecordingHandoff {
    pub(crate) received: Mutex<Vec<CompletedDownload>>,
    pub(crate) fail: bool,
    pub(crate) delay: Option<Duration>,
}

#[async_trait]
impl Handoff for RecordingHandoff {
    async fn hand_off(
        &self,
        completed: &CompletedDownload,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.received.lock().unwrap().push(completed.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if self.fail {
            Err(Error::ExternalTool("upload rejected".into()))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Config with millisecond timings so starvation paths finish quickly
pub(crate) fn fast_config(max_retries: u32) -> Config {
    let mut config = Config::default();
    config.queue.max_retries = max_retries;
    config.polling.poll_interval = Duration::from_millis(200);
    config.polling.starve_backoff = Duration::from_millis(20);
    config.polling.wait_for_new_work = false;
    config.polling.fetch_retry.max_attempts = 0;
    config.downloader.ytdlp_path = Some(PathBuf::from("/nonexistent/yt-dlp"));
    config
}

/// Orchestrator wired to a scripted downloader and a recording sink
pub(crate) fn orchestrator(
    config: Config,
    downloader: Arc<ScriptedDownloader>,
) -> (QueueOrchestrator, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = QueueOrchestrator::new(config, downloader)
        .unwrap()
        .with_sink(sink.clone());
    (orchestrator, sink)
}

/// Run a batch with a generous upper bound so a hung loop fails the test
pub(crate) async fn run_batch(orchestrator: &QueueOrchestrator) -> BatchSummary {
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run_to_completion())
        .await
        .expect("batch did not finish in time")
        .unwrap()
}
