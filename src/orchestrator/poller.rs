//! Refilling a starving queue from the external source

use super::queue::WorkQueue;
use crate::config::{PollingConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::sources::SourceProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Decides when to poll the [`SourceProvider`] and performs the poll
///
/// A starvation episode starts when the queue runs out of actionable work.
/// The first check of an episode polls immediately; after that, polls are
/// spaced by the poll interval. Failed polls are gated the same way so a
/// broken connection cannot cause a tight loop.
pub struct SourcePoller {
    provider: Option<Arc<dyn SourceProvider>>,
    interval: Duration,
    fetch_retry: RetryConfig,
    last_poll: Option<Instant>,
    episode_fresh: bool,
    came_up_empty: bool,
}

impl SourcePoller {
    /// Create a poller; without a provider it never polls
    pub fn new(provider: Option<Arc<dyn SourceProvider>>, config: &PollingConfig) -> Self {
        Self {
            provider,
            interval: config.poll_interval,
            fetch_retry: config.fetch_retry.clone(),
            last_poll: None,
            episode_fresh: false,
            came_up_empty: false,
        }
    }

    /// Whether a provider is configured
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Start a new starvation episode
    pub fn begin_episode(&mut self) {
        self.episode_fresh = true;
        self.came_up_empty = false;
    }

    /// Whether the current episode's last successful poll added nothing
    pub fn came_up_empty(&self) -> bool {
        self.came_up_empty
    }

    /// Whether to poll now
    pub fn should_poll(
        &self,
        queue: &WorkQueue,
        max_retries: u32,
        auto_poll: bool,
        now: Instant,
    ) -> bool {
        if !auto_poll || self.provider.is_none() || !queue.is_starved(max_retries) {
            return false;
        }
        self.episode_fresh || self.time_until_due(now).is_zero()
    }

    /// Time left until the poll interval has elapsed
    pub fn time_until_due(&self, now: Instant) -> Duration {
        match self.last_poll {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Fetch from the provider, retrying transient errors in place
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` if `cancel` fires first, `Error::NotSupported`
    /// without a provider, otherwise the provider's last error.
    pub async fn poll(&mut self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| Error::NotSupported("no source provider configured".into()))?;

        self.last_poll = Some(Instant::now());
        self.episode_fresh = false;

        tracing::debug!(provider = provider.name(), "Polling source");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = fetch_with_retry(&self.fetch_retry, cancel, || provider.fetch()) => res,
        }
    }

    /// Record how many new sources the last poll contributed
    pub fn record_merge(&mut self, added: usize) {
        self.came_up_empty = added == 0;
    }
}
