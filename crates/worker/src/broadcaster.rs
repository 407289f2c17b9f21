//! Live event fan-out to viewer subscribers.

use tokio::sync::broadcast;
use toolscribe_core::LiveEvent;

/// Capability for emitting live events, injected into the orchestrator and
/// metrics engine instead of a back-reference to the serving layer.
pub trait ObservationEvents: Send + Sync {
    /// Publish one event to all current subscribers.
    fn emit(&self, event: LiveEvent);
}

/// Publish/subscribe fan-out over typed events.
///
/// Each subscriber owns a bounded buffer; a slow subscriber lags and loses
/// the oldest queued events (at-most-once, newest wins). Publishing never
/// blocks.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<LiveEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers each buffer up to `capacity`
    /// events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _initial_rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Join the live stream. The caller is responsible for sending its own
    /// initial snapshot before relaying received events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ObservationEvents for EventBroadcaster {
    fn emit(&self, event: LiveEvent) {
        // send only fails with zero subscribers, which is fine
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("no live subscribers for {}", e.0.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolscribe_core::TokenSummary;

    fn status_event(depth: u64) -> LiveEvent {
        LiveEvent::ProcessingStatus { is_processing: depth > 0, queue_depth: depth }
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let broadcaster = EventBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        broadcaster.emit(status_event(1));
        broadcaster.emit(status_event(2));

        match rx.recv().await.unwrap() {
            LiveEvent::ProcessingStatus { queue_depth, .. } => assert_eq!(queue_depth, 1),
            other => panic!("unexpected event {}", other.kind()),
        }
        match rx.recv().await.unwrap() {
            LiveEvent::ProcessingStatus { queue_depth, .. } => assert_eq!(queue_depth, 2),
            other => panic!("unexpected event {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();

        for depth in 1..=5 {
            broadcaster.emit(status_event(depth));
        }

        // first recv reports the lag, then the two newest events remain
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert_eq!(missed, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            LiveEvent::ProcessingStatus { queue_depth, .. } => assert_eq!(queue_depth, 4),
            other => panic!("unexpected event {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new(4);
        broadcaster.emit(LiveEvent::TokenUpdate {
            tokens: TokenSummary::default(),
            timestamp: 0,
        });
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
