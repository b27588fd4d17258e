//! # Atomic Batch Handle
//!
//! The single write surface of the store. The chain engine, the world
//! state, and the block-store helpers all stage into the same batch, and
//! the batch either lands whole or not at all.

use std::collections::HashMap;

use ember_state::NodeSink;
use shared_types::{Address, Hash, SealedHeader, StoredBlock, U256};

use crate::ports::{BatchOp, Family};
use crate::undo::UndoLog;

/// Metadata key of the tip pointer.
pub(crate) const META_TIP: &[u8] = b"tip";

/// Metadata key prefix of the per-address transaction counters.
pub(crate) const META_ADDR_COUNTER: &[u8] = b"atc:";

pub(crate) fn addr_counter_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(META_ADDR_COUNTER.len() + 20);
    key.extend_from_slice(META_ADDR_COUNTER);
    key.extend_from_slice(address.as_bytes());
    key
}

pub(crate) fn addr_tx_key(address: &Address, counter: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(28);
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(&counter.to_be_bytes());
    key
}

/// A buffered multi-family write set.
#[derive(Default)]
pub struct AtomicBatch {
    ops: Vec<BatchOp>,
    /// Trie nodes staged through [`NodeSink`], kept separately so the
    /// shared node cache can be promoted after a successful commit.
    trie_nodes: Vec<(Hash, Vec<u8>)>,
    /// Address counters staged in this batch. A reorg connects several
    /// blocks into one batch; later blocks must see the counters earlier
    /// blocks staged, not the committed ones.
    addr_counters: HashMap<Address, u64>,
}

impl AtomicBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, family: Family, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { family, key, value });
    }

    pub fn delete(&mut self, family: Family, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { family, key });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<BatchOp>, Vec<(Hash, Vec<u8>)>) {
        (self.ops, self.trie_nodes)
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    pub fn put_stored_block(&mut self, block: &StoredBlock) {
        self.put(
            Family::Blocks,
            block.hash().as_bytes().to_vec(),
            ember_codec::encode(block),
        );
    }

    pub fn put_header(&mut self, header: &SealedHeader) {
        self.put(
            Family::Headers,
            header.hash.as_bytes().to_vec(),
            ember_codec::encode(&header.header),
        );
    }

    pub fn put_cumulative_difficulty(&mut self, hash: &Hash, difficulty: &U256) {
        self.put(
            Family::CumDiff,
            hash.as_bytes().to_vec(),
            ember_codec::Value::u256(difficulty).encode(),
        );
    }

    pub fn set_main_chain(&mut self, height: u64, hash: &Hash) {
        self.put(
            Family::MainChain,
            height.to_be_bytes().to_vec(),
            hash.as_bytes().to_vec(),
        );
    }

    pub fn remove_main_chain(&mut self, height: u64) {
        self.delete(Family::MainChain, height.to_be_bytes().to_vec());
    }

    pub fn set_tip(&mut self, hash: &Hash) {
        self.put(Family::Metadata, META_TIP.to_vec(), hash.as_bytes().to_vec());
    }

    pub fn put_tx_location(&mut self, tx_hash: &Hash, block_hash: &Hash, index: u32) {
        let mut value = Vec::with_capacity(36);
        value.extend_from_slice(block_hash.as_bytes());
        value.extend_from_slice(&index.to_be_bytes());
        self.put(Family::TxIndex, tx_hash.as_bytes().to_vec(), value);
    }

    pub fn remove_tx_location(&mut self, tx_hash: &Hash) {
        self.delete(Family::TxIndex, tx_hash.as_bytes().to_vec());
    }

    pub fn put_undo_log(&mut self, block_hash: &Hash, log: &UndoLog) {
        self.put(
            Family::EntityUndo,
            block_hash.as_bytes().to_vec(),
            ember_codec::encode(log),
        );
    }

    pub fn remove_undo_log(&mut self, block_hash: &Hash) {
        self.delete(Family::EntityUndo, block_hash.as_bytes().to_vec());
    }

    pub fn put_token_mirror(&mut self, token: &Address, bytes: Vec<u8>) {
        self.put(Family::Tokens, token.as_bytes().to_vec(), bytes);
    }

    pub fn remove_token_mirror(&mut self, token: &Address) {
        self.delete(Family::Tokens, token.as_bytes().to_vec());
    }

    pub fn put_authority_mirror(&mut self, address: &Address, bytes: Vec<u8>) {
        self.put(Family::Authorities, address.as_bytes().to_vec(), bytes);
    }

    pub fn remove_authority_mirror(&mut self, address: &Address) {
        self.delete(Family::Authorities, address.as_bytes().to_vec());
    }

    pub fn set_addr_counter(&mut self, address: &Address, counter: u64) {
        self.addr_counters.insert(*address, counter);
        self.put(
            Family::Metadata,
            addr_counter_key(address),
            counter.to_be_bytes().to_vec(),
        );
    }

    /// The counter value staged earlier in this batch, if any.
    #[must_use]
    pub fn staged_addr_counter(&self, address: &Address) -> Option<u64> {
        self.addr_counters.get(address).copied()
    }

    pub fn put_addr_tx(&mut self, address: &Address, counter: u64, tx_hash: &Hash) {
        self.put(
            Family::AddrTxIndex,
            addr_tx_key(address, counter),
            tx_hash.as_bytes().to_vec(),
        );
    }

    pub fn remove_addr_tx(&mut self, address: &Address, counter: u64) {
        self.delete(Family::AddrTxIndex, addr_tx_key(address, counter));
    }
}

impl NodeSink for AtomicBatch {
    fn put_node(&mut self, hash: Hash, bytes: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            family: Family::StateTrie,
            key: hash.as_bytes().to_vec(),
            value: bytes.clone(),
        });
        self.trie_nodes.push((hash, bytes));
    }
}
