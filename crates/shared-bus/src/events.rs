//! # Chain Events
//!
//! Everything that can be announced on the bus. Blocks and diffs travel
//! behind `Arc` so a publish is a pointer copy per subscriber.

use std::sync::Arc;

use shared_types::{
    BlockStateDiffs, ConnectedSource, Hash, SealedTransaction, StoredBlock,
};

/// Why a transaction entered the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MempoolAddReason {
    /// Fresh submission from a client or peer gossip.
    New,
    /// Re-inserted from a disconnected block during a reorg.
    Reorg,
}

/// Why a transaction left the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MempoolRemoveReason {
    /// Included in a connected block.
    Mined,
    /// Replaced by a higher-fee transaction with the same sender and nonce.
    Rbf,
    /// The connected tip moved the sender's nonce past this transaction.
    StaleNonce,
    /// Sat in the pool longer than the configured time to live.
    Expired,
    /// Failed re-validation or was evicted under capacity pressure.
    Invalid,
}

/// All events that can be published to the bus.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A block was validated, applied, and committed as the new tip.
    BlockConnected {
        block: Arc<StoredBlock>,
        diffs: Arc<BlockStateDiffs>,
        source: ConnectedSource,
        /// Wall time spent validating and applying, in milliseconds.
        timing_ms: u64,
    },

    /// A block was disconnected during a reorg. Disconnect events for a
    /// swap are published oldest-buffer-first, before any connect event
    /// of the replacement chain.
    BlockDisconnected { block: Arc<StoredBlock> },

    /// A reorg swapped at least one block off the active chain.
    Reorg {
        old_tip: Hash,
        old_height: u64,
        new_tip: Hash,
        new_height: u64,
    },

    /// A transaction was admitted to the mempool.
    MempoolTxAdded {
        tx: Arc<SealedTransaction>,
        reason: MempoolAddReason,
    },

    /// A transaction was dropped from the mempool.
    MempoolTxRemoved {
        hash: Hash,
        reason: MempoolRemoveReason,
    },
}

impl ChainEvent {
    /// Get the topic for this event (for subscription filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            ChainEvent::BlockConnected { .. }
            | ChainEvent::BlockDisconnected { .. }
            | ChainEvent::Reorg { .. } => EventTopic::Chain,
            ChainEvent::MempoolTxAdded { .. } | ChainEvent::MempoolTxRemoved { .. } => {
                EventTopic::Mempool
            }
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// Tip movement: connect, disconnect, reorg.
    Chain,
    /// Mempool membership changes.
    Mempool,
    /// No filtering.
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Accept every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept only the given topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
