//! Configuration types for piu-queue
//!
//! All structs are serde-derived with per-field defaults so a partial JSON
//! document (or none at all) yields a working configuration. Durations are
//! serialized as integer seconds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Queue retry policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Failed attempts after which an item is considered exhausted (default: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Stop the whole batch after the first failed attempt (default: false)
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stop_on_error: false,
        }
    }
}

/// Source polling behaviour when the queue runs dry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Poll the external source when the queue is starving (default: true)
    ///
    /// This is only the initial value; the GUI can toggle it live through
    /// [`QueueHandle::set_auto_poll`](crate::orchestrator::QueueHandle::set_auto_poll).
    #[serde(default = "default_true")]
    pub auto_poll_enabled: bool,

    /// Minimum time between two polls (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Sleep slice while waiting for the next poll to become due (default: 5 seconds)
    #[serde(default = "default_starve_backoff", with = "duration_serde")]
    pub starve_backoff: Duration,

    /// Keep waiting for new work after a poll comes back empty (default: true)
    ///
    /// When false, the batch terminates as soon as a starvation episode's
    /// poll yields no new sources.
    #[serde(default = "default_true")]
    pub wait_for_new_work: bool,

    /// In-place retries for transient fetch failures
    #[serde(default)]
    pub fetch_retry: RetryConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            auto_poll_enabled: true,
            poll_interval: default_poll_interval(),
            starve_backoff: default_starve_backoff(),
            wait_for_new_work: true,
            fetch_retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_fetch_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// yt-dlp downloader settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Upper bound for a single attempt (default: 30 minutes)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            timeout: default_download_timeout(),
        }
    }
}

/// Spreadsheet CSV export used as the external work source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SheetConfig {
    /// URL of the CSV export (e.g. a published Google Sheet with `output=csv`)
    pub csv_url: String,

    /// Header name of the column holding URLs (None = scan every cell)
    #[serde(default)]
    pub column: Option<String>,

    /// HTTP timeout for one fetch (default: 30 seconds)
    #[serde(default = "default_sheet_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// External command run after each completed download
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Path to script/executable
    pub path: PathBuf,

    /// Extra arguments passed before the environment is applied
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for script execution (default: 5 minutes)
    #[serde(default = "default_script_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Main configuration for the queue orchestrator
///
/// Snapshotted when a batch starts; changes take effect on the next batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Retry policy
    #[serde(default)]
    pub queue: QueueConfig,

    /// Polling behaviour
    #[serde(default)]
    pub polling: PollingConfig,

    /// Downloader settings
    #[serde(default)]
    pub downloader: DownloaderConfig,

    /// Spreadsheet source (None = manual queue only)
    #[serde(default)]
    pub sheet: Option<SheetConfig>,

    /// Post-download handoff script
    #[serde(default)]
    pub handoff: Option<ScriptConfig>,
}

impl Config {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_retries == 0 {
            return Err(Error::config("queue.max_retries", "must be at least 1"));
        }
        if self.polling.starve_backoff.is_zero() {
            return Err(Error::config(
                "polling.starve_backoff",
                "must be greater than zero",
            ));
        }
        if self.polling.poll_interval < self.polling.starve_backoff {
            return Err(Error::config(
                "polling.poll_interval",
                "must be at least polling.starve_backoff",
            ));
        }
        if self.polling.fetch_retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "polling.fetch_retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if self.downloader.timeout.is_zero() {
            return Err(Error::config(
                "downloader.timeout",
                "must be greater than zero",
            ));
        }
        if let Some(sheet) = &self.sheet {
            match url::Url::parse(&sheet.csv_url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    return Err(Error::config(
                        "sheet.csv_url",
                        format!("unsupported scheme '{}'", parsed.scheme()),
                    ));
                }
                Err(e) => {
                    return Err(Error::config(
                        "sheet.csv_url",
                        format!("invalid URL: {}", e),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_starve_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_sheet_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_script_timeout() -> Duration {
    Duration::from_secs(300)
}

// Duration serialization helper (as whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
