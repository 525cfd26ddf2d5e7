//! Ordered work queue and the state shared with the GUI handle

use super::ledger::CompletionLedger;
use crate::types::{ItemStatus, PollReport, QueueSnapshot, SnapshotItem, WorkItem};
use crate::utils::normalize_source;

/// Ordered list of [`WorkItem`]s, unique by source
///
/// Fresh items keep their relative insertion order. Reordering operations are
/// no-ops for unknown sources and report whether they changed anything.
#[derive(Debug, Default, Clone)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
}

impl WorkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items, exhausted ones included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items at all
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in queue order
    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    /// Whether an item with this source is queued
    pub fn contains(&self, source: &str) -> bool {
        self.position(source).is_some()
    }

    /// Look up an item by source
    pub fn get(&self, source: &str) -> Option<&WorkItem> {
        self.items.iter().find(|i| i.source == source)
    }

    /// Look up an item by source for mutation
    pub fn get_mut(&mut self, source: &str) -> Option<&mut WorkItem> {
        self.items.iter_mut().find(|i| i.source == source)
    }

    fn position(&self, source: &str) -> Option<usize> {
        self.items.iter().position(|i| i.source == source)
    }

    /// Append an item; returns false if its source is already queued
    pub fn push_back(&mut self, item: WorkItem) -> bool {
        if self.contains(&item.source) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove and return the item with this source
    pub fn remove(&mut self, source: &str) -> Option<WorkItem> {
        self.position(source).map(|idx| self.items.remove(idx))
    }

    /// Move the item to the tail
    pub fn move_to_back(&mut self, source: &str) -> bool {
        match self.remove(source) {
            Some(item) => {
                self.items.push(item);
                true
            }
            None => false,
        }
    }

    /// Move the item to the head
    pub fn promote_to_front(&mut self, source: &str) -> bool {
        match self.remove(source) {
            Some(item) => {
                self.items.insert(0, item);
                true
            }
            None => false,
        }
    }

    /// Swap the item with its predecessor
    pub fn move_up(&mut self, source: &str) -> bool {
        match self.position(source) {
            Some(idx) if idx > 0 => {
                self.items.swap(idx - 1, idx);
                true
            }
            _ => false,
        }
    }

    /// Swap the item with its successor
    pub fn move_down(&mut self, source: &str) -> bool {
        match self.position(source) {
            Some(idx) if idx + 1 < self.items.len() => {
                self.items.swap(idx, idx + 1);
                true
            }
            _ => false,
        }
    }

    /// Next item to attempt
    ///
    /// The first fresh item wins; otherwise the first item that failed before
    /// but is still below `max_retries`. Exhausted items are never selected.
    pub fn select_next(&self, max_retries: u32) -> Option<&WorkItem> {
        self.items
            .iter()
            .find(|i| i.is_fresh())
            .or_else(|| self.items.iter().find(|i| i.is_retryable(max_retries)))
    }

    /// Whether any never-attempted item is queued
    pub fn has_fresh(&self) -> bool {
        self.items.iter().any(WorkItem::is_fresh)
    }

    /// No fresh item, and the queue is empty or holds only exhausted items
    pub fn is_starved(&self, max_retries: u32) -> bool {
        !self.has_fresh() && self.items.iter().all(|i| i.is_exhausted(max_retries))
    }

    /// Drop every exhausted item, returning their sources in queue order
    pub fn clear_exhausted(&mut self, max_retries: u32) -> Vec<String> {
        let (exhausted, kept): (Vec<WorkItem>, Vec<WorkItem>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| i.is_exhausted(max_retries));
        self.items = kept;
        exhausted.into_iter().map(|i| i.source).collect()
    }
}

/// Result of a manual enqueue request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the tail
    Added,
    /// Already queued or currently in flight
    AlreadyQueued,
    /// Already downloaded this session
    AlreadyCompleted,
    /// Empty after trimming
    Invalid,
}

/// Queue, ledger and in-flight marker, guarded by a single lock
#[derive(Debug)]
pub(crate) struct QueueState {
    pub(crate) queue: WorkQueue,
    pub(crate) ledger: CompletionLedger,
    pub(crate) current: Option<String>,
    pub(crate) max_retries: u32,
}

impl QueueState {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            queue: WorkQueue::new(),
            ledger: CompletionLedger::new(),
            current: None,
            max_retries,
        }
    }

    /// Append `raw` unless it is queued, in flight or completed
    pub(crate) fn enqueue(&mut self, raw: &str) -> EnqueueOutcome {
        let Some(source) = normalize_source(raw) else {
            return EnqueueOutcome::Invalid;
        };
        if self.ledger.contains(&source) {
            return EnqueueOutcome::AlreadyCompleted;
        }
        if self.current.as_deref() == Some(source.as_str()) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if self.queue.push_back(WorkItem::new(source)) {
            EnqueueOutcome::Added
        } else {
            EnqueueOutcome::AlreadyQueued
        }
    }

    /// Merge a poll result, keeping only genuinely new sources
    pub(crate) fn merge_polled(&mut self, fetched: Vec<String>) -> PollReport {
        let mut report = PollReport {
            fetched: fetched.len(),
            ..Default::default()
        };
        for raw in fetched {
            match self.enqueue(&raw) {
                EnqueueOutcome::Added => {
                    if let Some(source) = normalize_source(&raw) {
                        report.added.push(source);
                    }
                }
                EnqueueOutcome::AlreadyQueued => report.already_queued += 1,
                EnqueueOutcome::AlreadyCompleted => report.already_completed += 1,
                EnqueueOutcome::Invalid => {}
            }
        }
        report
    }

    pub(crate) fn status_of(&self, item: &WorkItem) -> ItemStatus {
        if self.current.as_deref() == Some(item.source.as_str()) {
            ItemStatus::InFlight
        } else if item.is_exhausted(self.max_retries) {
            ItemStatus::Exhausted
        } else if item.is_fresh() {
            ItemStatus::Fresh
        } else {
            ItemStatus::Retrying
        }
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self
                .queue
                .iter()
                .map(|item| SnapshotItem {
                    source: item.source.clone(),
                    retry_count: item.retry_count,
                    status: self.status_of(item),
                    last_error: item.last_error.clone(),
                })
                .collect(),
            current: self.current.clone(),
            completed: self.ledger.len(),
        }
    }
}
