//! Completion ledger

use std::collections::HashSet;

/// Sources that completed successfully during this session
///
/// Append-only: a source that enters the ledger is never selected, enqueued or
/// accepted from a poll again until the orchestrator is dropped.
#[derive(Debug, Default, Clone)]
pub struct CompletionLedger {
    sources: HashSet<String>,
}

impl CompletionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed source; returns false if it was already present
    pub fn insert(&mut self, source: impl Into<String>) -> bool {
        self.sources.insert(source.into())
    }

    /// Whether `source` has completed
    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    /// Number of completed sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing has completed yet
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Completed sources in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }
}
