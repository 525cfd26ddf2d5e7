//! Per-item retry policy

use crate::config::QueueConfig;
use crate::types::{RetryDecision, WorkItem};

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureVerdict {
    /// Requeue or abandon the item
    pub decision: RetryDecision,
    /// `stop_on_error` asks for the batch to end
    pub stop_batch: bool,
}

/// Decides the fate of failed items
///
/// Each failure increments `retry_count` (never past `max_retries`). Once the
/// bound is reached the item is abandoned: it stays visible in the queue but
/// selection skips it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryScheduler {
    max_retries: u32,
    stop_on_error: bool,
}

impl RetryScheduler {
    /// Create a scheduler; `max_retries` below 1 is treated as 1
    pub fn new(max_retries: u32, stop_on_error: bool) -> Self {
        Self {
            max_retries: max_retries.max(1),
            stop_on_error,
        }
    }

    /// Scheduler for a batch's queue policy
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.max_retries, config.stop_on_error)
    }

    /// Retry bound
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether any failure ends the batch
    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    /// Record a failure on `item` and decide what happens next
    pub fn on_failure(&self, item: &mut WorkItem, error: impl Into<String>) -> FailureVerdict {
        item.retry_count = item.retry_count.saturating_add(1).min(self.max_retries);
        item.last_error = Some(error.into());

        let decision = if item.retry_count >= self.max_retries {
            RetryDecision::Abandon
        } else {
            RetryDecision::Requeue
        };

        FailureVerdict {
            decision,
            stop_batch: self.stop_on_error,
        }
    }
}
