//! # Ember Storage Crate
//!
//! Durable chain storage behind a column-family key/value port.
//!
//! ## Atomicity contract
//!
//! Every mutation belonging to one connect or disconnect is issued inside
//! a single [`AtomicBatch`], committed by [`BlockStore::execute_atomic_batch`].
//! A closure failure discards the batch; no consumer ever observes a
//! partial write. The state trie, the block indices, and the undo log all
//! route through the same batch handle.

pub mod batch;
pub mod block_store;
pub mod error;
pub mod memory;
pub mod ports;
pub mod undo;

pub use batch::AtomicBatch;
pub use block_store::{BlockStore, StateTrieBackend};
pub use error::StoreError;
pub use memory::MemoryKeyValueStore;
pub use ports::{BatchOp, Family, KeyValueStore};
pub use undo::{UndoLog, UndoOp};
