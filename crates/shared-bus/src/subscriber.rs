//! # Event Subscriber
//!
//! Receiving side of the bus: a filtered view over a broadcast receiver.

use tokio::sync::broadcast;
use tracing::warn;

use crate::events::{ChainEvent, EventFilter};

/// A live subscription. Dropping it detaches from the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<ChainEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ChainEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Await the next matching event.
    ///
    /// Returns `None` once the bus is gone. A lagged subscriber skips the
    /// events it missed and keeps receiving; the miss count is logged.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "bus subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant; `None` when no matching event is queued.
    pub fn try_recv(&mut self) -> Option<ChainEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "bus subscriber lagged, events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MempoolRemoveReason;
    use crate::publisher::{EventBus, EventSink};
    use shared_types::Hash;

    #[tokio::test]
    async fn test_recv_none_after_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(sub.try_recv().is_none());

        bus.publish(ChainEvent::MempoolTxRemoved {
            hash: Hash::ZERO,
            reason: MempoolRemoveReason::Expired,
        });
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }
}
