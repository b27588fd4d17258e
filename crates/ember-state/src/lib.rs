//! # Ember State Crate
//!
//! The versioned world state and its Merkle trie.
//!
//! ## Layers
//!
//! - [`nibbles`] / [`node`]: half-byte paths and the four trie node kinds.
//! - [`store`]: the content-addressed node store. Shared cache plus
//!   durable backend, with per-state staged writes that only become
//!   visible through an atomic batch commit.
//! - [`trie`]: persistent insert, get, and remove over the node store.
//!   Old roots stay valid forever, which is what makes reorgs cheap.
//! - [`world`]: the [`WorldState`] view: balances, nonces, tokens,
//!   authorities, validators, aliases, proposals, and the params cell,
//!   with per-block dirty buffers and state diffs.

pub mod error;
pub mod keys;
pub mod nibbles;
pub mod node;
pub mod store;
pub mod trie;
pub mod world;

pub use error::StateError;
pub use store::{MemoryTrieBackend, NodeSink, StagedNodeStore, TrieBackend, TrieNodeStore};
pub use trie::{MerkleTrie, EMPTY_ROOT};
pub use world::{DiffTracking, WorldState};
