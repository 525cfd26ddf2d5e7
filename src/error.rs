//! Error types for piu-queue
//!
//! This module provides the error taxonomy used throughout the library:
//! - A top-level [`Error`] covering configuration, I/O, network and collaborator failures
//! - [`DownloadError`] for per-item failures reported by a [`Downloader`](crate::downloader::Downloader)
//!
//! Per-item failures never escape the orchestrator loop; they are turned into
//! retry decisions. Only the public entry points (config validation, starting a
//! batch, fetching a source) return these errors to callers.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for piu-queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for piu-queue
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "queue.max_retries")
        key: Option<String>,
    },

    /// A single download attempt failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The external work source could not be read or parsed
    #[error("source error: {0}")]
    Source(String),

    /// The external work source answered with a non-success HTTP status
    #[error("source error: sheet export returned HTTP {status}: {url}")]
    SourceStatus {
        /// HTTP status code of the response
        status: u16,
        /// The URL that was fetched
        url: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp, handoff script, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, no source configured, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Work was interrupted by the batch cancellation token
    #[error("cancelled")]
    Cancelled,

    /// A batch run is already in progress for this orchestrator
    #[error("a batch run is already in progress")]
    AlreadyRunning,

    /// Item not present in the queue
    #[error("not found in queue: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures of a single download attempt
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The download tool exited unsuccessfully
    #[error("tool exited with code {exit_code:?}: {stderr}")]
    ToolFailed {
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Tail of the tool's stderr output
        stderr: String,
    },

    /// The attempt exceeded the configured downloader timeout
    #[error("timed out after {after:?}")]
    TimedOut {
        /// The timeout that elapsed
        after: Duration,
    },

    /// The downloader reported success without producing an output path
    #[error("downloader reported success for {url} but produced no output path")]
    MissingOutput {
        /// The source that was being downloaded
        url: String,
    },

    /// The downloader panicked while handling the attempt
    #[error("downloader panicked: {0}")]
    Panicked(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error is the result of cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key() {
        let err = Error::config("queue.max_retries", "must be at least 1");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("queue.max_retries"));
                assert_eq!(message, "must be at least 1");
            }
            other => panic!("expected Config error, got {:?}", other),
        }
        assert_eq!(err.to_string(), "configuration error: must be at least 1");
    }

    #[test]
    fn download_error_converts_into_error() {
        let err: Error = DownloadError::ToolFailed {
            exit_code: Some(1),
            stderr: "ERROR: Unsupported URL".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Download(DownloadError::ToolFailed { .. })));
        assert!(err.to_string().contains("Unsupported URL"));
    }

    #[test]
    fn missing_output_message_names_source() {
        let err = DownloadError::MissingOutput {
            url: "http://a".to_string(),
        };
        assert!(err.to_string().contains("http://a"));
    }

    #[test]
    fn only_cancelled_reports_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::AlreadyRunning.is_cancelled());
        assert!(!Error::Other("x".into()).is_cancelled());
    }
}
