//! # Trie Node Store
//!
//! Content-addressed persistence for trie nodes in three layers:
//!
//! 1. the staged map of the current block (per world state, uncommitted),
//! 2. a shared bounded cache,
//! 3. the durable backend.
//!
//! Staged writes become durable only through [`StagedNodeStore::commit_to_batch`],
//! which drains them into the caller's atomic batch; the shared cache is
//! promoted only after the owning batch actually committed. A failed
//! batch therefore leaves both the cache and the durable store untouched.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use shared_types::Hash;

use crate::error::StateError;

/// Default shared-cache capacity in nodes.
pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 64 * 1024;

/// Durable read side of the node store. Implemented by the block store's
/// state-trie column family and by [`MemoryTrieBackend`] in tests.
pub trait TrieBackend: Send + Sync {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError>;
}

/// Write sink for a batch commit. Implemented by the block store's atomic
/// batch handle.
pub trait NodeSink {
    fn put_node(&mut self, hash: Hash, bytes: Vec<u8>);
}

/// The shared layer: bounded cache over the durable backend.
pub struct TrieNodeStore {
    backend: Arc<dyn TrieBackend>,
    cache: Mutex<LruCache<Hash, Vec<u8>>>,
}

impl TrieNodeStore {
    #[must_use]
    pub fn new(backend: Arc<dyn TrieBackend>) -> Self {
        Self::with_cache_capacity(backend, DEFAULT_NODE_CACHE_CAPACITY)
    }

    #[must_use]
    pub fn with_cache_capacity(backend: Arc<dyn TrieBackend>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity forced nonzero");
        Self {
            backend,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Committed node lookup: cache, then backend.
    pub fn get_committed(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError> {
        if let Some(bytes) = self.cache.lock().get(hash) {
            return Ok(Some(bytes.clone()));
        }
        let fetched = self.backend.get_node(hash)?;
        if let Some(bytes) = &fetched {
            self.cache.lock().put(*hash, bytes.clone());
        }
        Ok(fetched)
    }

    /// Promote nodes of a successfully committed batch into the cache.
    pub fn promote(&self, nodes: impl IntoIterator<Item = (Hash, Vec<u8>)>) {
        let mut cache = self.cache.lock();
        for (hash, bytes) in nodes {
            cache.put(hash, bytes);
        }
    }
}

/// Per-world-state staging layer over the shared store.
pub struct StagedNodeStore {
    shared: Arc<TrieNodeStore>,
    pending: HashMap<Hash, Vec<u8>>,
}

impl StagedNodeStore {
    #[must_use]
    pub fn new(shared: Arc<TrieNodeStore>) -> Self {
        Self {
            shared,
            pending: HashMap::new(),
        }
    }

    /// Resolution order: staged writes, shared cache, durable store.
    pub fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError> {
        if let Some(bytes) = self.pending.get(hash) {
            return Ok(Some(bytes.clone()));
        }
        self.shared.get_committed(hash)
    }

    /// Stage a write. Invisible outside the owning world state.
    pub fn put(&mut self, hash: Hash, bytes: Vec<u8>) {
        self.pending.insert(hash, bytes);
    }

    /// Drain every staged node into the batch. Durability and cache
    /// promotion are the batch owner's responsibility.
    pub fn commit_to_batch(&mut self, batch: &mut dyn NodeSink) {
        for (hash, bytes) in self.pending.drain() {
            batch.put_node(hash, bytes);
        }
    }

    /// Discard staged writes with no side effects.
    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<TrieNodeStore> {
        &self.shared
    }
}

/// In-memory backend for tests and dev tooling.
#[derive(Default)]
pub struct MemoryTrieBackend {
    nodes: Mutex<HashMap<Hash, Vec<u8>>>,
}

impl MemoryTrieBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: Hash, bytes: Vec<u8>) {
        self.nodes.lock().insert(hash, bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl TrieBackend for MemoryTrieBackend {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.nodes.lock().get(hash).cloned())
    }
}
