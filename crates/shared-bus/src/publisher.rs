//! # Event Publisher
//!
//! The publishing side of the bus. Publishing is synchronous and never
//! blocks: it hands the event to a broadcast channel and returns the
//! number of subscribers that will see it.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::{ChainEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Trait for publishing events to the bus.
///
/// Components hold `Arc<dyn EventSink>` so tests can capture events
/// without a full bus.
pub trait EventSink: Send + Sync {
    /// Publish an event. Returns the number of active subscribers.
    fn publish(&self, event: ChainEvent) -> usize;
}

/// In-memory event bus over `tokio::sync::broadcast`.
pub struct EventBus {
    sender: broadcast::Sender<ChainEvent>,
    events_published: AtomicU64,
    capacity: usize,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "new bus subscription");
        Subscription::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events published since construction.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ChainEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // No receivers; the event is dropped.
                trace!("event dropped, no subscribers");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventTopic, MempoolRemoveReason};
    use shared_types::Hash;

    fn sample_event() -> ChainEvent {
        ChainEvent::MempoolTxRemoved {
            hash: Hash([7; 32]),
            reason: MempoolRemoveReason::Mined,
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(sample_event()), 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        assert_eq!(bus.publish(sample_event()), 1);
        let received = sub.recv().await.unwrap();
        assert!(matches!(received, ChainEvent::MempoolTxRemoved { .. }));
    }

    #[tokio::test]
    async fn test_filtered_subscriber_skips_other_topics() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Chain]));

        bus.publish(sample_event());
        bus.publish(ChainEvent::Reorg {
            old_tip: Hash([1; 32]),
            old_height: 1,
            new_tip: Hash([2; 32]),
            new_height: 2,
        });

        // The mempool event is filtered out; the reorg arrives first.
        let received = sub.recv().await.unwrap();
        assert!(matches!(received, ChainEvent::Reorg { .. }));
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::with_capacity(16);
        assert_eq!(bus.capacity(), 16);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub = bus.subscribe(EventFilter::all());
        assert_eq!(bus.subscriber_count(), 1);
    }
}
