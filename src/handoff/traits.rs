//! Traits for downstream pipelines

use crate::types::CompletedDownload;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Receiver of completed downloads
#[async_trait]
pub trait Handoff: Send + Sync {
    /// Pass one completed download downstream
    ///
    /// `cancel` is the batch token; a stopped batch must not wait on the
    /// downstream pipeline, so implementations return `Error::Cancelled`
    /// promptly once it fires.
    ///
    /// # Errors
    ///
    /// Any error is logged and emitted as
    /// [`QueueEvent::HandoffFailed`](crate::types::QueueEvent::HandoffFailed).
    async fn hand_off(
        &self,
        completed: &CompletedDownload,
        cancel: &CancellationToken,
    ) -> crate::Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Handoff that does nothing
///
/// Used when no downstream pipeline is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandoff;

#[async_trait]
impl Handoff for NoOpHandoff {
    async fn hand_off(
        &self,
        _completed: &CompletedDownload,
        _cancel: &CancellationToken,
    ) -> crate::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
