//! yt-dlp backed downloader using the external binary

use super::parser::{OUTPUT_MARKER, OutputLine, PROGRESS_MARKER, parse_line};
use super::traits::{AttemptContext, DownloadOutput, Downloader};
use crate::config::DownloaderConfig;
use crate::error::{DownloadError, Error};
use crate::types::DownloadOptions;
use crate::utils::tail_lines;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Number of stderr lines kept in failure messages
const STDERR_TAIL_LINES: usize = 5;

/// Downloader that shells out to `yt-dlp`
///
/// # Examples
///
/// ```no_run
/// use piu_queue::downloader::YtDlpDownloader;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Explicit binary
/// let dl = YtDlpDownloader::new(PathBuf::from("/usr/local/bin/yt-dlp"), Duration::from_secs(1800));
///
/// // Or auto-discover from PATH
/// let dl = YtDlpDownloader::from_path(Duration::from_secs(1800))
///     .expect("yt-dlp not found in PATH");
///
/// // Or run the Python module
/// let dl = YtDlpDownloader::new(PathBuf::from("python3"), Duration::from_secs(1800))
///     .with_base_args(["-m", "yt_dlp"]);
/// ```
pub struct YtDlpDownloader {
    binary_path: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

enum Interrupt {
    Cancelled,
    TimedOut,
    Finished(std::io::Result<()>),
}

impl YtDlpDownloader {
    /// Create a downloader with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            base_args: Vec::new(),
            timeout,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|path| Self::new(path, timeout))
    }

    /// Build from configuration, searching PATH if allowed
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` when no binary is configured and none is
    /// found on PATH.
    pub fn from_config(config: &DownloaderConfig) -> crate::Result<Self> {
        if let Some(path) = &config.ytdlp_path {
            return Ok(Self::new(path.clone(), config.timeout));
        }
        if config.search_path
            && let Some(found) = Self::from_path(config.timeout)
        {
            return Ok(found);
        }
        Err(Error::NotSupported(
            "yt-dlp binary not found. Configure downloader.ytdlp_path or ensure yt-dlp is in PATH."
                .into(),
        ))
    }

    /// Arguments placed before the generated ones (e.g. `-m yt_dlp`)
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Path of the executable this downloader runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command-line arguments for one attempt
    pub fn build_args(&self, source: &str, options: &DownloadOptions) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!("download:{}%(progress._percent_str)s", PROGRESS_MARKER),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", OUTPUT_MARKER),
            "-P".to_string(),
            options.output_dir.display().to_string(),
            "-o".to_string(),
            options.output_template.clone(),
        ]);
        if options.no_playlist {
            args.push("--no-playlist".to_string());
        }
        if let Some(format) = &options.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        if let Some(cookies) = &options.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        args.extend(options.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(source.to_string());
        args
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn attempt(
        &self,
        source: &str,
        options: &DownloadOptions,
        ctx: &AttemptContext,
    ) -> crate::Result<DownloadOutput> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::fs::create_dir_all(&options.output_dir).await?;

        let mut child = Command::new(&self.binary_path)
            .args(self.build_args(source, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr was not captured".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            BufReader::new(stderr).read_to_string(&mut buf).await.ok();
            buf
        });

        let mut output_path: Option<PathBuf> = None;
        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_line(&line) {
                    OutputLine::Progress(percent) => ctx.report_progress(percent),
                    OutputLine::OutputPath(path) => output_path = Some(path),
                    OutputLine::Other => tracing::trace!(source, line = %line, "yt-dlp"),
                }
            }
            Ok::<(), std::io::Error>(())
        };

        let interrupt = tokio::select! {
            _ = ctx.cancel_token().cancelled() => Interrupt::Cancelled,
            _ = tokio::time::sleep(self.timeout) => Interrupt::TimedOut,
            res = read_stdout => Interrupt::Finished(res),
        };

        match interrupt {
            Interrupt::Cancelled => {
                tracing::info!(source, "Cancellation requested, killing yt-dlp");
                child.kill().await.ok();
                stderr_task.abort();
                Err(Error::Cancelled)
            }
            Interrupt::TimedOut => {
                tracing::warn!(source, timeout = ?self.timeout, "yt-dlp timed out, killing");
                child.kill().await.ok();
                stderr_task.abort();
                Err(DownloadError::TimedOut {
                    after: self.timeout,
                }
                .into())
            }
            Interrupt::Finished(read_result) => {
                read_result?;
                let status = child.wait().await?;
                let stderr_text = stderr_task.await.unwrap_or_default();

                if !status.success() {
                    return Err(DownloadError::ToolFailed {
                        exit_code: status.code(),
                        stderr: tail_lines(&stderr_text, STDERR_TAIL_LINES),
                    }
                    .into());
                }

                ctx.report_progress(100.0);
                Ok(DownloadOutput { output_path })
            }
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
