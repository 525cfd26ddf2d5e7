//! Download backends
//!
//! The orchestrator treats downloading as a black box behind the
//! [`Downloader`] trait. This module provides:
//! - [`Downloader`] - the trait an attempt is delegated to
//! - [`AttemptContext`] - cancellation token and progress reporter for one attempt
//! - [`YtDlpDownloader`] - implementation driving the `yt-dlp` binary
//! - [`parser`] - classification of yt-dlp stdout lines

pub mod parser;
mod traits;
mod ytdlp;

pub use traits::{AttemptContext, DownloadOutput, Downloader, ProgressReporter};
pub use ytdlp::YtDlpDownloader;
