//! # Storage Ports
//!
//! The column-family key/value port the block store is written against.
//! Production uses the RocksDB adapter in `node-runtime`; tests use
//! [`crate::MemoryKeyValueStore`].

use crate::error::StoreError;

/// Logical column families of the node database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Trie node hash to node bytes.
    StateTrie,
    /// Block hash to stored-block bytes, side chains included.
    Blocks,
    /// Block hash to header bytes, the light query fast path.
    Headers,
    /// Big-endian height to the hash of the best-chain block there.
    MainChain,
    /// Block hash to cumulative difficulty.
    CumDiff,
    /// Transaction hash to (block hash, index).
    TxIndex,
    /// (address, counter) to transaction hash, append-only per address.
    AddrTxIndex,
    /// Block hash to the serialized undo log.
    EntityUndo,
    /// Token enumeration mirror of the trie.
    Tokens,
    /// Authority enumeration mirror of the trie.
    Authorities,
    /// Peer identity to reputation record.
    PeerReputation,
    /// Tip pointer, per-address counters, bookkeeping.
    Metadata,
}

impl Family {
    /// Stable on-disk name, used for RocksDB column families.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Family::StateTrie => "state_trie",
            Family::Blocks => "blocks",
            Family::Headers => "headers",
            Family::MainChain => "main_chain",
            Family::CumDiff => "cum_diff",
            Family::TxIndex => "tx_index",
            Family::AddrTxIndex => "addr_tx_index",
            Family::EntityUndo => "entity_undo",
            Family::Tokens => "tokens",
            Family::Authorities => "authorities",
            Family::PeerReputation => "peer_reputation",
            Family::Metadata => "metadata",
        }
    }

    /// Every family, in creation order.
    #[must_use]
    pub fn all() -> &'static [Family] {
        &[
            Family::StateTrie,
            Family::Blocks,
            Family::Headers,
            Family::MainChain,
            Family::CumDiff,
            Family::TxIndex,
            Family::AddrTxIndex,
            Family::EntityUndo,
            Family::Tokens,
            Family::Authorities,
            Family::PeerReputation,
            Family::Metadata,
        ]
    }
}

/// One operation of an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        family: Family,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        family: Family,
        key: Vec<u8>,
    },
}

/// Column-family key/value store with atomic multi-family batches.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, family: Family, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every operation or none of them.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        family: Family,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}
