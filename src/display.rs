//! Display sink: the single observer interface between the orchestrator and a UI.
//!
//! The orchestrator calls [`DisplaySink::notify`] synchronously on its own
//! worker thread after every state change. Implementations must return quickly
//! and are responsible for hopping onto their UI thread themselves.

use crate::types::QueueEvent;

/// Observer for orchestrator events
pub trait DisplaySink: Send + Sync {
    /// Receive one event. Must not block for long.
    fn notify(&self, event: QueueEvent);
}

/// Any `Fn(QueueEvent)` closure is a sink
impl<F> DisplaySink for F
where
    F: Fn(QueueEvent) + Send + Sync,
{
    fn notify(&self, event: QueueEvent) {
        self(event)
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn notify(&self, _event: QueueEvent) {}
}

/// Fan-out sink backed by a tokio broadcast channel
///
/// Multiple subscribers receive all events independently. A subscriber that
/// falls more than `capacity` events behind receives `RecvError::Lagged`.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: tokio::sync::broadcast::Sender<QueueEvent>,
}

impl BroadcastSink {
    /// Create a sink with the given buffer capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl DisplaySink for BroadcastSink {
    fn notify(&self, event: QueueEvent) {
        // send() returns Err if there are no receivers, which is fine
        self.tx.send(event).ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrchestratorState;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = move |event: QueueEvent| seen_clone.lock().unwrap().push(event);

        sink.notify(QueueEvent::StateChanged {
            state: OrchestratorState::Running,
        });

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_sink_reaches_every_subscriber() {
        let sink = BroadcastSink::new(16);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.notify(QueueEvent::PollFailed {
            error: "timeout".into(),
        });

        assert!(matches!(a.recv().await.unwrap(), QueueEvent::PollFailed { .. }));
        assert!(matches!(b.recv().await.unwrap(), QueueEvent::PollFailed { .. }));
    }

    #[tokio::test]
    async fn zero_capacity_broadcast_sink_still_delivers() {
        let sink = BroadcastSink::new(0);
        let mut rx = sink.subscribe();

        sink.notify(QueueEvent::StateChanged {
            state: OrchestratorState::Running,
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            QueueEvent::StateChanged {
                state: OrchestratorState::Running
            }
        ));
    }

    #[test]
    fn broadcast_sink_without_subscribers_does_not_panic() {
        BroadcastSink::default().notify(QueueEvent::StateChanged {
            state: OrchestratorState::Idle,
        });
    }
}
