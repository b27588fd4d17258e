//! # Shared Bus - Event Bus for Inter-Component Communication
//!
//! The chain engine, mempool, transport, and miner are cyclic
//! collaborators. None of them holds a reference to another; every
//! cross-component notification goes through this bus as a tagged event,
//! and shared reads go through world-state snapshots.
//!
//! ## Ordering guarantees
//!
//! - Events are published only after the owning storage batch committed;
//!   subscribers never observe a rolled-back transition.
//! - Delivery order to a single subscriber matches publication order.
//! - A slow subscriber that overflows its buffer loses the oldest events
//!   and is told how many it missed; it never blocks the publisher.

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventTopic, MempoolAddReason, MempoolRemoveReason};
pub use publisher::{EventBus, EventSink};
pub use subscriber::Subscription;

/// Maximum events buffered per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
