//! Traits and types for external work sources

use async_trait::async_trait;

/// An external list of sources to download
///
/// Each call returns the provider's full current list; the orchestrator
/// discards entries that are already queued or completed.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the current list of sources
    ///
    /// # Errors
    ///
    /// Network and parse failures. Errors classified as retryable by
    /// [`IsRetryable`](crate::retry::IsRetryable) are retried in place before
    /// the poll is reported as failed.
    async fn fetch(&self) -> crate::Result<Vec<String>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Provider returning the same fixed list on every fetch
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    sources: Vec<String>,
}

impl StaticSource {
    /// Create a provider from a list of sources
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SourceProvider for StaticSource {
    async fn fetch(&self) -> crate::Result<Vec<String>> {
        Ok(self.sources.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_its_list_every_time() {
        let source = StaticSource::new(["http://a", "http://b"]);
        assert_eq!(source.fetch().await.unwrap(), vec!["http://a", "http://b"]);
        assert_eq!(source.fetch().await.unwrap(), vec!["http://a", "http://b"]);
        assert_eq!(source.name(), "static");
    }
}
