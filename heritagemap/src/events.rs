//! Core event bus.
//!
//! The position tracker and the proximity coordinator publish state changes
//! here; the session (and any other host-side consumer) subscribes instead of
//! polling. Backed by a `tokio::sync::broadcast` channel, so a slow subscriber
//! may observe [`RecvError::Lagged`](tokio::sync::broadcast::error::RecvError)
//! and is expected to resynchronise from the publishers' `latest()` getters.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::geo::Position;
use crate::location::PermissionState;
use crate::proximity::{NearbySnapshot, QueryError, RequestEpoch};

/// Default bus capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A state change published by a core component.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The tracker accepted a new position sample.
    PositionChanged(Position),

    /// The permission state changed after a request.
    PermissionChanged(PermissionState),

    /// The coordinator accepted a result set (replaces the previous one).
    DatasetChanged(Arc<NearbySnapshot>),

    /// Loading flipped. `true` while any issued query is unsettled.
    LoadingChanged(bool),

    /// A query failed or was rejected before the network call.
    QueryFailed {
        epoch: Option<RequestEpoch>,
        error: QueryError,
    },
}

/// Cloneable publish handle for [`CoreEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: CoreEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("core event published with no subscribers");
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(CoreEvent::LoadingChanged(true));

        match rx.recv().await.unwrap() {
            CoreEvent::LoadingChanged(loading) => assert!(loading),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(CoreEvent::PositionChanged(Position::new(0.0, 0.0)));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
