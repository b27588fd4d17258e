//! # Block Store
//!
//! Queries over the column families plus the staging helpers the chain
//! engine uses inside its atomic batches. The store never mutates outside
//! [`BlockStore::execute_atomic_batch`].

use std::collections::BTreeMap;
use std::sync::Arc;

use ember_state::{StateError, TrieBackend, TrieNodeStore};
use shared_types::{
    Address, BlockHeader, BlockStateDiffs, Hash, StoredBlock, U256,
};
use tracing::debug;

use crate::batch::{addr_counter_key, AtomicBatch, META_TIP};
use crate::error::StoreError;
use crate::ports::{Family, KeyValueStore};
use crate::undo::{UndoLog, UndoOp};

/// Durable trie reads over the state-trie column family.
pub struct StateTrieBackend {
    kv: Arc<dyn KeyValueStore>,
}

impl StateTrieBackend {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

impl TrieBackend for StateTrieBackend {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError> {
        self.kv
            .get(Family::StateTrie, hash.as_bytes())
            .map_err(|e| StateError::Backend(e.to_string()))
    }
}

/// The durable chain store.
pub struct BlockStore {
    kv: Arc<dyn KeyValueStore>,
    trie_store: Arc<TrieNodeStore>,
}

impl BlockStore {
    /// Open over a key/value backend; wires the shared trie node store
    /// against the same backend.
    #[must_use]
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let backend = Arc::new(StateTrieBackend::new(kv.clone()));
        let trie_store = Arc::new(TrieNodeStore::new(backend));
        Self { kv, trie_store }
    }

    /// The shared trie node store, for building world states.
    #[must_use]
    pub fn trie_store(&self) -> Arc<TrieNodeStore> {
        self.trie_store.clone()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn tip_hash(&self) -> Result<Option<Hash>, StoreError> {
        Ok(self
            .kv
            .get(Family::Metadata, META_TIP)?
            .and_then(|bytes| Hash::from_slice(&bytes)))
    }

    pub fn stored_block(&self, hash: &Hash) -> Result<Option<StoredBlock>, StoreError> {
        match self.kv.get(Family::Blocks, hash.as_bytes())? {
            Some(bytes) => Ok(Some(ember_codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// A block that must exist; absence is a corruption-grade error.
    pub fn expect_block(&self, hash: &Hash) -> Result<StoredBlock, StoreError> {
        self.stored_block(hash)?.ok_or(StoreError::NotFound {
            what: "block",
            key: hash.to_string(),
        })
    }

    pub fn header(&self, hash: &Hash) -> Result<Option<BlockHeader>, StoreError> {
        match self.kv.get(Family::Headers, hash.as_bytes())? {
            Some(bytes) => Ok(Some(ember_codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.kv.get(Family::Headers, hash.as_bytes())?.is_some())
    }

    pub fn main_chain_hash(&self, height: u64) -> Result<Option<Hash>, StoreError> {
        Ok(self
            .kv
            .get(Family::MainChain, &height.to_be_bytes())?
            .and_then(|bytes| Hash::from_slice(&bytes)))
    }

    pub fn block_at_height(&self, height: u64) -> Result<Option<StoredBlock>, StoreError> {
        match self.main_chain_hash(height)? {
            Some(hash) => self.stored_block(&hash),
            None => Ok(None),
        }
    }

    pub fn cumulative_difficulty(&self, hash: &Hash) -> Result<Option<U256>, StoreError> {
        match self.kv.get(Family::CumDiff, hash.as_bytes())? {
            Some(bytes) => Ok(Some(ember_codec::Value::decode(&bytes)?.as_u256()?)),
            None => Ok(None),
        }
    }

    /// Where a transaction landed: `(block hash, index)`.
    pub fn tx_location(&self, tx_hash: &Hash) -> Result<Option<(Hash, u32)>, StoreError> {
        match self.kv.get(Family::TxIndex, tx_hash.as_bytes())? {
            Some(bytes) if bytes.len() == 36 => {
                let hash = Hash::from_slice(&bytes[..32])
                    .ok_or_else(|| StoreError::Corruption("tx index hash".to_string()))?;
                let index = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
                Ok(Some((hash, index)))
            }
            Some(bytes) => Err(StoreError::Corruption(format!(
                "tx index entry of {} bytes",
                bytes.len()
            ))),
            None => Ok(None),
        }
    }

    /// Transaction hashes touching `address`, oldest first, up to `limit`.
    pub fn address_tx_hashes(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<Hash>, StoreError> {
        let entries = self
            .kv
            .scan_prefix(Family::AddrTxIndex, address.as_bytes())?;
        entries
            .into_iter()
            .take(limit)
            .map(|(_, v)| {
                Hash::from_slice(&v)
                    .ok_or_else(|| StoreError::Corruption("address tx entry".to_string()))
            })
            .collect()
    }

    pub fn undo_log(&self, block_hash: &Hash) -> Result<Option<UndoLog>, StoreError> {
        match self.kv.get(Family::EntityUndo, block_hash.as_bytes())? {
            Some(bytes) => Ok(Some(ember_codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn addr_counter(&self, batch: &AtomicBatch, address: &Address) -> Result<u64, StoreError> {
        if let Some(staged) = batch.staged_addr_counter(address) {
            return Ok(staged);
        }
        match self.kv.get(Family::Metadata, &addr_counter_key(address))? {
            Some(bytes) if bytes.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(raw))
            }
            Some(_) => Err(StoreError::Corruption("address counter".to_string())),
            None => Ok(0),
        }
    }

    // =========================================================================
    // ATOMIC BATCHES
    // =========================================================================

    /// Run `f` against a fresh batch and commit what it staged. A closure
    /// error discards the batch. On success the shared trie cache is
    /// promoted with the nodes that just became durable.
    pub fn execute_atomic_batch<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AtomicBatch) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut batch = AtomicBatch::new();
        let out = f(&mut batch)?;
        let (ops, trie_nodes) = batch.into_parts();
        debug!(ops = ops.len(), trie_nodes = trie_nodes.len(), "committing batch");
        self.kv.write_batch(ops).map_err(E::from)?;
        self.trie_store.promote(trie_nodes);
        Ok(out)
    }

    // =========================================================================
    // STAGING
    // =========================================================================

    /// Stage everything a best-chain connect writes: the block, its
    /// indices, the enumeration mirrors, and the undo log that reverses
    /// them.
    pub fn stage_block_connect(
        &self,
        batch: &mut AtomicBatch,
        block: &StoredBlock,
        diffs: &BlockStateDiffs,
    ) -> Result<(), StoreError> {
        let block_hash = block.hash();
        let mut undo = UndoLog::default();

        batch.put_stored_block(block);
        batch.put_header(&block.block.header);
        batch.put_cumulative_difficulty(&block_hash, &block.cumulative_difficulty);
        batch.set_main_chain(block.height(), &block_hash);
        batch.set_tip(&block_hash);

        for (index, tx) in block.block.transactions.iter().enumerate() {
            batch.put_tx_location(&tx.hash, &block_hash, index as u32);
            undo.ops.push(UndoOp::RemoveTxIndex { tx_hash: tx.hash });
        }

        // Address history, senders and recipients, in transaction order.
        let mut per_address: BTreeMap<Address, Vec<Hash>> = BTreeMap::new();
        for tx in &block.block.transactions {
            per_address.entry(tx.sender).or_default().push(tx.hash);
            if let Some(recipient) = tx.transaction.recipient {
                if recipient != tx.sender {
                    per_address.entry(recipient).or_default().push(tx.hash);
                }
            }
        }
        for (address, hashes) in per_address {
            let start = self.addr_counter(batch, &address)?;
            for (offset, tx_hash) in hashes.iter().enumerate() {
                batch.put_addr_tx(&address, start + offset as u64, tx_hash);
            }
            batch.set_addr_counter(&address, start + hashes.len() as u64);
            undo.ops.push(UndoOp::RewindAddressTxs {
                address,
                prior_counter: start,
            });
        }

        // Enumeration mirrors follow the trie through the diffs.
        for (token, diff) in &diffs.tokens {
            match &diff.new {
                Some(state) => batch.put_token_mirror(token, ember_codec::encode(state)),
                None => batch.remove_token_mirror(token),
            }
            undo.ops.push(UndoOp::RestoreToken {
                token: *token,
                prior: diff.old.as_ref().map(ember_codec::encode),
            });
        }
        for (address, diff) in &diffs.authorities {
            match &diff.new {
                Some(state) => batch.put_authority_mirror(address, ember_codec::encode(state)),
                None => batch.remove_authority_mirror(address),
            }
            undo.ops.push(UndoOp::RestoreAuthority {
                address: *address,
                prior: diff.old.as_ref().map(ember_codec::encode),
            });
        }

        batch.put_undo_log(&block_hash, &undo);
        Ok(())
    }

    /// Stage a side-chain block: bytes and difficulty only, no indices.
    pub fn stage_side_block(&self, batch: &mut AtomicBatch, block: &StoredBlock) {
        batch.put_stored_block(block);
        batch.put_header(&block.block.header);
        batch.put_cumulative_difficulty(&block.hash(), &block.cumulative_difficulty);
    }

    /// Stage the disconnect of the current tip block: replay its undo log
    /// and rewind the height index. The block's bytes stay, unlinked.
    pub fn stage_block_disconnect(
        &self,
        batch: &mut AtomicBatch,
        block: &StoredBlock,
    ) -> Result<(), StoreError> {
        let block_hash = block.hash();
        let undo = self.undo_log(&block_hash)?.ok_or(StoreError::NotFound {
            what: "undo log",
            key: block_hash.to_string(),
        })?;

        for op in undo.ops {
            match op {
                UndoOp::RestoreToken { token, prior } => match prior {
                    Some(bytes) => batch.put_token_mirror(&token, bytes),
                    None => batch.remove_token_mirror(&token),
                },
                UndoOp::RestoreAuthority { address, prior } => match prior {
                    Some(bytes) => batch.put_authority_mirror(&address, bytes),
                    None => batch.remove_authority_mirror(&address),
                },
                UndoOp::RewindAddressTxs {
                    address,
                    prior_counter,
                } => {
                    let current = self.addr_counter(batch, &address)?;
                    for counter in prior_counter..current {
                        batch.remove_addr_tx(&address, counter);
                    }
                    batch.set_addr_counter(&address, prior_counter);
                }
                UndoOp::RemoveTxIndex { tx_hash } => {
                    batch.remove_tx_location(&tx_hash);
                }
            }
        }

        batch.remove_main_chain(block.height());
        batch.remove_undo_log(&block_hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyValueStore;
    use shared_types::{
        ConnectedSource, SealedBlock, SealedHeader, SealedTransaction, Signature, StateDiff,
        TokenState, Transaction, TxType,
    };

    fn store() -> BlockStore {
        BlockStore::open(Arc::new(MemoryKeyValueStore::new()))
    }

    fn dummy_tx(byte: u8, sender: u8, recipient: u8) -> SealedTransaction {
        SealedTransaction {
            transaction: Transaction {
                version: 1,
                tx_type: TxType::Transfer,
                network: 1,
                timestamp: 1,
                nonce: 1,
                recipient: Some(Address([recipient; 20])),
                amount: Some(U256::from(1u64)),
                fee: 1,
                token_address: Some(Address::NATIVE_TOKEN),
                payload: None,
                reference_hash: None,
                message: None,
                signature: Signature([byte; 65]),
            },
            hash: Hash([byte; 32]),
            sender: Address([sender; 20]),
            size: 100,
        }
    }

    fn dummy_block(height: u64, parent: Hash, tx_bytes: &[u8]) -> StoredBlock {
        let txs: Vec<SealedTransaction> =
            tx_bytes.iter().map(|b| dummy_tx(*b, *b, b + 100)).collect();
        let header = BlockHeader {
            version: 1,
            height,
            timestamp: 1_000 + height,
            previous_hash: parent,
            tx_root_hash: Hash::ZERO,
            state_root_hash: Hash::ZERO,
            difficulty: U256::MAX,
            coinbase: Address([1; 20]),
            nonce: 0,
            identity: Address([1; 20]),
            signature: Signature([0; 65]),
        };
        StoredBlock {
            block: SealedBlock {
                header: SealedHeader {
                    header,
                    hash: Hash([height as u8 + 10; 32]),
                    size: 200,
                },
                transactions: txs,
            },
            cumulative_difficulty: U256::from(height + 1),
            received_at: 0,
            received_from: None,
            source: ConnectedSource::Sync,
            events: vec![],
        }
    }

    fn connect(store: &BlockStore, block: &StoredBlock, diffs: &BlockStateDiffs) {
        store
            .execute_atomic_batch::<_, StoreError, _>(|batch| {
                store.stage_block_connect(batch, block, diffs)
            })
            .unwrap();
    }

    #[test]
    fn test_connect_then_query() {
        let store = store();
        let block = dummy_block(0, Hash::ZERO, &[1, 2]);
        connect(&store, &block, &BlockStateDiffs::default());

        assert_eq!(store.tip_hash().unwrap(), Some(block.hash()));
        assert_eq!(store.main_chain_hash(0).unwrap(), Some(block.hash()));
        assert_eq!(
            store.stored_block(&block.hash()).unwrap().unwrap(),
            block
        );
        assert_eq!(
            store.cumulative_difficulty(&block.hash()).unwrap(),
            Some(U256::from(1u64))
        );
        assert_eq!(
            store.tx_location(&Hash([1; 32])).unwrap(),
            Some((block.hash(), 0))
        );
        assert_eq!(
            store.tx_location(&Hash([2; 32])).unwrap(),
            Some((block.hash(), 1))
        );
    }

    #[test]
    fn test_address_index_appends_and_rewinds() {
        let store = store();
        let b0 = dummy_block(0, Hash::ZERO, &[1]);
        connect(&store, &b0, &BlockStateDiffs::default());
        let b1 = dummy_block(1, b0.hash(), &[2]);
        connect(&store, &b1, &BlockStateDiffs::default());

        // Sender 1 and 2 each have one entry, recipients likewise.
        assert_eq!(
            store.address_tx_hashes(&Address([1; 20]), 10).unwrap(),
            vec![Hash([1; 32])]
        );

        // Disconnect b1 and the indices roll back.
        store
            .execute_atomic_batch::<_, StoreError, _>(|batch| {
                store.stage_block_disconnect(batch, &b1)?;
                batch.set_tip(&b0.hash());
                Ok(())
            })
            .unwrap();

        assert_eq!(store.main_chain_hash(1).unwrap(), None);
        assert_eq!(store.tx_location(&Hash([2; 32])).unwrap(), None);
        assert!(store
            .address_tx_hashes(&Address([2; 20]), 10)
            .unwrap()
            .is_empty());
        assert_eq!(store.tip_hash().unwrap(), Some(b0.hash()));
        // b1's bytes are retained even though it left the main chain.
        assert!(store.stored_block(&b1.hash()).unwrap().is_some());
    }

    #[test]
    fn test_token_mirror_follows_diffs() {
        let store = store();
        let token_addr = Address([9; 20]);
        let token = TokenState {
            name: "EMBER".into(),
            smallest_unit_name: "SPARK".into(),
            decimals: 8,
            total_supply: U256::from(1u64),
            max_supply: None,
            user_burnable: false,
            website_url: None,
            whitepaper_url: None,
            origin_tx_hash: Hash([1; 32]),
            created_at_timestamp: 1,
            updated_at_height: 0,
            updated_at_timestamp: 1,
            version: 1,
        };
        let mut diffs = BlockStateDiffs::default();
        diffs
            .tokens
            .insert(token_addr, StateDiff::new(None, Some(token.clone())));

        let block = dummy_block(0, Hash::ZERO, &[]);
        connect(&store, &block, &diffs);
        assert!(store
            .kv
            .get(Family::Tokens, token_addr.as_bytes())
            .unwrap()
            .is_some());

        store
            .execute_atomic_batch::<_, StoreError, _>(|batch| {
                store.stage_block_disconnect(batch, &block)
            })
            .unwrap();
        assert!(store
            .kv
            .get(Family::Tokens, token_addr.as_bytes())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failed_batch_leaves_no_trace() {
        let store = store();
        let block = dummy_block(0, Hash::ZERO, &[1]);

        let result: Result<(), StoreError> = store.execute_atomic_batch(|batch| {
            store.stage_block_connect(batch, &block, &BlockStateDiffs::default())?;
            Err(StoreError::Corruption("forced failure".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.tip_hash().unwrap(), None);
        assert!(store.stored_block(&block.hash()).unwrap().is_none());
    }

}
