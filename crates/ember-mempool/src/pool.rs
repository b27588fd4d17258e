//! # Pool Indices
//!
//! The three synchronized indices behind the mempool lock. All methods
//! here assume validation already happened; they only maintain index
//! consistency.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use shared_types::{Address, Hash, SealedTransaction};

/// A pooled transaction with its admission metadata.
#[derive(Debug, Clone)]
pub struct PooledTx {
    pub tx: Arc<SealedTransaction>,
    pub added_at: u64,
    pub fee_per_byte: u64,
}

/// Priority-queue entry. Ordering is worst-first: iterating the set
/// ascending yields eviction candidates, descending yields selection
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedEntry {
    pub fee_per_byte: u64,
    pub added_at: u64,
    pub hash: Hash,
}

impl Ord for PricedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee_per_byte
            .cmp(&other.fee_per_byte)
            // Older transactions rank better at equal price.
            .then(other.added_at.cmp(&self.added_at))
            .then(self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PricedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The synchronized index set.
#[derive(Default)]
pub struct PoolInner {
    pub by_hash: HashMap<Hash, PooledTx>,
    pub by_sender: HashMap<Address, BTreeMap<u64, Hash>>,
    pub by_price: BTreeSet<PricedEntry>,
    pub total_bytes: u64,
}

impl PoolInner {
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// The pooled transaction at `(sender, nonce)`, if any.
    pub fn by_sender_nonce(&self, sender: &Address, nonce: u64) -> Option<&PooledTx> {
        let hash = self.by_sender.get(sender)?.get(&nonce)?;
        self.by_hash.get(hash)
    }

    /// Insert into all indices. The caller has already resolved
    /// duplicates and nonce collisions.
    pub fn insert(&mut self, pooled: PooledTx) {
        let hash = pooled.tx.hash;
        let sender = pooled.tx.sender;
        let nonce = pooled.tx.nonce();

        self.by_price.insert(PricedEntry {
            fee_per_byte: pooled.fee_per_byte,
            added_at: pooled.added_at,
            hash,
        });
        self.by_sender.entry(sender).or_default().insert(nonce, hash);
        self.total_bytes += u64::from(pooled.tx.size);
        self.by_hash.insert(hash, pooled);
    }

    /// Remove from all indices; returns the entry if it was present.
    pub fn remove(&mut self, hash: &Hash) -> Option<PooledTx> {
        let pooled = self.by_hash.remove(hash)?;
        self.by_price.remove(&PricedEntry {
            fee_per_byte: pooled.fee_per_byte,
            added_at: pooled.added_at,
            hash: *hash,
        });
        if let Some(group) = self.by_sender.get_mut(&pooled.tx.sender) {
            group.remove(&pooled.tx.nonce());
            if group.is_empty() {
                self.by_sender.remove(&pooled.tx.sender);
            }
        }
        self.total_bytes = self.total_bytes.saturating_sub(u64::from(pooled.tx.size));
        Some(pooled)
    }

    /// True if `hash` is the highest pooled nonce of its sender, i.e.
    /// evicting it cannot orphan a later transaction of the same sender.
    pub fn is_group_tail(&self, hash: &Hash) -> bool {
        let Some(pooled) = self.by_hash.get(hash) else {
            return false;
        };
        self.by_sender
            .get(&pooled.tx.sender)
            .and_then(|group| group.keys().next_back())
            .is_some_and(|max_nonce| *max_nonce == pooled.tx.nonce())
    }

    /// Worst-priced entry that is safe to evict.
    pub fn eviction_candidate(&self) -> Option<PricedEntry> {
        self.by_price
            .iter()
            .find(|entry| self.is_group_tail(&entry.hash))
            .cloned()
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_sender.clear();
        self.by_price.clear();
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Signature, Transaction, TxType, U256};

    fn pooled(sender: u8, nonce: u64, fee: u64, hash_byte: u8) -> PooledTx {
        let tx = SealedTransaction {
            transaction: Transaction {
                version: 1,
                tx_type: TxType::Transfer,
                network: 1,
                timestamp: 0,
                nonce,
                recipient: Some(Address([99; 20])),
                amount: Some(U256::one()),
                fee,
                token_address: Some(Address::NATIVE_TOKEN),
                payload: None,
                reference_hash: None,
                message: None,
                signature: Signature([0; 65]),
            },
            hash: Hash([hash_byte; 32]),
            sender: Address([sender; 20]),
            size: 100,
        };
        let fee_per_byte = tx.fee_per_byte();
        PooledTx {
            tx: Arc::new(tx),
            added_at: 0,
            fee_per_byte,
        }
    }

    #[test]
    fn test_insert_remove_keeps_indices_synced() {
        let mut pool = PoolInner::default();
        pool.insert(pooled(1, 1, 500, 1));
        pool.insert(pooled(1, 2, 600, 2));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.total_bytes, 200);
        assert!(pool.by_sender_nonce(&Address([1; 20]), 1).is_some());

        pool.remove(&Hash([1; 32]));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.total_bytes, 100);
        assert_eq!(pool.by_price.len(), 1);
        assert!(pool.by_sender_nonce(&Address([1; 20]), 1).is_none());

        pool.remove(&Hash([2; 32]));
        assert!(pool.is_empty());
        assert!(pool.by_sender.is_empty());
    }

    #[test]
    fn test_eviction_candidate_respects_nonce_chains() {
        let mut pool = PoolInner::default();
        // Sender 1: cheap nonce-1 with an expensive nonce-2 behind it.
        pool.insert(pooled(1, 1, 100, 1));
        pool.insert(pooled(1, 2, 5_000, 2));
        // Sender 2: single middling transaction.
        pool.insert(pooled(2, 1, 300, 3));

        // The cheapest entry is sender 1 nonce 1, but evicting it would
        // orphan the expensive nonce 2. The candidate must skip it.
        let candidate = pool.eviction_candidate().unwrap();
        assert_eq!(candidate.hash, Hash([3; 32]));
    }

    #[test]
    fn test_priced_order_worst_first() {
        let mut pool = PoolInner::default();
        pool.insert(pooled(1, 1, 900, 1));
        pool.insert(pooled(2, 1, 100, 2));
        pool.insert(pooled(3, 1, 500, 3));

        let order: Vec<Hash> = pool.by_price.iter().map(|e| e.hash).collect();
        assert_eq!(order, vec![Hash([2; 32]), Hash([3; 32]), Hash([1; 32])]);
    }
}
