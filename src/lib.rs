//! # piu-queue
//!
//! Download queue and retry orchestrator for media downloading applications.
//!
//! ## Design Philosophy
//!
//! piu-queue is designed to be:
//! - **Library-first** - No CLI or UI; a GUI embeds it and renders its events
//! - **One item at a time** - Strictly sequential attempts with fresh work before retries
//! - **Cooperatively cancellable** - One token per batch, honored by every blocking step
//! - **Never silent** - Failed items stay visible; every batch ends with a summary event
//!
//! ## Quick Start
//!
//! ```no_run
//! use piu_queue::{BroadcastSink, Config, QueueEvent, QueueOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = Arc::new(BroadcastSink::default());
//!     let mut events = sink.subscribe();
//!     let orchestrator = QueueOrchestrator::from_config(Config::default(), sink)?;
//!
//!     let handle = orchestrator.handle();
//!     handle.enqueue("https://www.youtube.com/watch?v=aqz-KE-bpKQ");
//!     tokio::spawn(piu_queue::cancel_on_signal(handle));
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let QueueEvent::Progress { source, percent } = event {
//!                 println!("{source}: {percent:.0}%");
//!             }
//!         }
//!     });
//!
//!     let summary = orchestrator.run_to_completion().await?;
//!     println!("{}", summary.reason.message());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Observer interface for UIs
pub mod display;
/// Download backends
pub mod downloader;
/// Error types
pub mod error;
/// Downstream pipelines for completed downloads
pub mod handoff;
/// Queue, ledger, retry policy, polling and the batch loop
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// External work sources
pub mod sources;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use display::{BroadcastSink, DisplaySink, NullSink};
pub use downloader::{AttemptContext, DownloadOutput, Downloader, YtDlpDownloader};
pub use error::{DownloadError, Error, Result};
pub use handoff::{Handoff, NoOpHandoff, ScriptHandoff};
pub use orchestrator::{
    BatchRun, CompletionLedger, DedicatedRun, EnqueueOutcome, QueueHandle, QueueOrchestrator,
    RetryScheduler, SourcePoller,
};
pub use sources::{SheetSource, SourceProvider, StaticSource};
pub use types::{
    BatchSummary, CompletedDownload, DownloadOptions, ItemStatus, OrchestratorState, PollReport,
    QueueEvent, QueueSnapshot, RetryDecision, StopReason, WorkItem,
};
pub use tokio_util::sync::CancellationToken;

/// Cancel the running batch when the process receives a termination signal
///
/// - **Unix:** SIGTERM or SIGINT
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`
///
/// Returns whether a batch was running when the signal arrived.
///
/// # Example
///
/// ```no_run
/// # async fn example(orchestrator: piu_queue::QueueOrchestrator) -> piu_queue::Result<()> {
/// tokio::spawn(piu_queue::cancel_on_signal(orchestrator.handle()));
/// let summary = orchestrator.run_to_completion().await?;
/// # Ok(())
/// # }
/// ```
pub async fn cancel_on_signal(handle: QueueHandle) -> bool {
    wait_for_signal().await;
    let was_running = handle.cancel();
    if !was_running {
        tracing::debug!("Signal received with no batch running");
    }
    was_running
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    } else {
        tracing::info!("Received Ctrl+C signal");
    }
}
