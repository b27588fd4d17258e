//! # Mempool Service
//!
//! Admission, replacement, selection, maintenance. All indices sit
//! behind one short-critical-section lock; bus events are collected under
//! the lock and published after it drops, so subscribers can re-enter.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ember_chain::{validate_stateful, validate_stateless, ChainError, NonceRule};
use ember_state::WorldState;
use parking_lot::Mutex;
use shared_bus::{ChainEvent, EventSink, MempoolAddReason, MempoolRemoveReason};
use shared_types::{Hash, NetworkSettings, SealedTransaction, StoredBlock};
use tracing::{debug, trace};

use crate::config::MempoolConfig;
use crate::error::MempoolError;
use crate::pool::{PoolInner, PooledTx};

/// Snapshot of the pool's fee market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeStatistics {
    pub tx_count: usize,
    /// Median fee per byte across pooled transactions.
    pub median_fee_per_byte: u64,
    /// 75th percentile fee per byte; what a hurried sender should pay.
    pub fast_fee_per_byte: u64,
}

/// The pending-transaction store.
pub struct Mempool {
    settings: Arc<NetworkSettings>,
    config: MempoolConfig,
    bus: Arc<dyn EventSink>,
    inner: Mutex<PoolInner>,
}

impl Mempool {
    #[must_use]
    pub fn new(
        settings: Arc<NetworkSettings>,
        config: MempoolConfig,
        bus: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            settings,
            config,
            bus,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Validate and admit a transaction against the given tip snapshot.
    ///
    /// The nonce rule is relaxed to a bounded future window so senders can
    /// queue ahead. A `(sender, nonce)` collision is resolved by
    /// replace-by-fee: the newcomer must price strictly above the bump
    /// ratio or it is rejected.
    pub fn add(
        &self,
        tx: SealedTransaction,
        reason: MempoolAddReason,
        state: &WorldState,
    ) -> Result<(), MempoolError> {
        validate_stateless(&tx, &self.settings)?;
        match validate_stateful(
            &tx,
            state,
            NonceRule::Windowed {
                max_gap: self.settings.max_future_nonce_gap,
            },
            now_ms(),
        ) {
            Ok(()) => {}
            Err(ChainError::InvalidTx(reason)) => return Err(reason.into()),
            Err(ChainError::State(e)) => return Err(e.into()),
            Err(other) => {
                // Validation only surfaces invalidity or state access
                // failures; anything else is a state backend fault.
                return Err(MempoolError::State(ember_state::StateError::Backend(
                    other.to_string(),
                )));
            }
        }

        let network_floor = state.params()?.min_fee_for_size(tx.size);
        let required = network_floor.max(self.config.min_acceptable_fee);
        if tx.fee() < required {
            return Err(MempoolError::FeeTooLow {
                fee: tx.fee(),
                required,
            });
        }

        let mut events: Vec<ChainEvent> = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.contains(&tx.hash) {
                return Err(MempoolError::Duplicate(tx.hash));
            }

            // Replace-by-fee on a nonce collision.
            if let Some(existing) = inner.by_sender_nonce(&tx.sender, tx.nonce()) {
                let old_fee = existing.tx.fee();
                let old_hash = existing.tx.hash;
                if !rbf_acceptable(old_fee, tx.fee(), self.settings.rbf_bump_percent) {
                    return Err(MempoolError::ReplacementUnderpriced {
                        old_fee,
                        new_fee: tx.fee(),
                    });
                }
                inner.remove(&old_hash);
                debug!(old = %old_hash, new = %tx.hash, "replaced by fee");
                events.push(ChainEvent::MempoolTxRemoved {
                    hash: old_hash,
                    reason: MempoolRemoveReason::Rbf,
                });
            }

            self.make_room(&mut inner, &tx, &mut events)?;

            let pooled = PooledTx {
                fee_per_byte: tx.fee_per_byte(),
                added_at: now_ms(),
                tx: Arc::new(tx),
            };
            events.push(ChainEvent::MempoolTxAdded {
                tx: pooled.tx.clone(),
                reason,
            });
            inner.insert(pooled);
        }
        self.publish_all(events);
        Ok(())
    }

    /// Evict until the newcomer fits, never orphaning a sender's nonce
    /// chain and never evicting something pricier than the newcomer.
    fn make_room(
        &self,
        inner: &mut PoolInner,
        incoming: &SealedTransaction,
        events: &mut Vec<ChainEvent>,
    ) -> Result<(), MempoolError> {
        loop {
            let over_count = inner.len() + 1 > self.config.max_count;
            let over_bytes = inner.total_bytes + u64::from(incoming.size) > self.config.max_bytes;
            if !over_count && !over_bytes {
                return Ok(());
            }
            let Some(candidate) = inner.eviction_candidate() else {
                return Err(MempoolError::PoolFull);
            };
            if candidate.fee_per_byte >= incoming.fee_per_byte() {
                return Err(MempoolError::PoolFull);
            }
            inner.remove(&candidate.hash);
            trace!(hash = %candidate.hash, "evicted under capacity pressure");
            events.push(ChainEvent::MempoolTxRemoved {
                hash: candidate.hash,
                reason: MempoolRemoveReason::Invalid,
            });
        }
    }

    /// Remove one transaction, announcing the reason.
    pub fn remove(&self, hash: &Hash, reason: MempoolRemoveReason) {
        let removed = self.inner.lock().remove(hash).is_some();
        if removed {
            self.bus
                .publish(ChainEvent::MempoolTxRemoved { hash: *hash, reason });
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.inner.lock().contains(hash)
    }

    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<Arc<SealedTransaction>> {
        self.inner.lock().by_hash.get(hash).map(|p| p.tx.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    /// All pooled transaction hashes, unordered.
    #[must_use]
    pub fn all_hashes(&self) -> Vec<Hash> {
        self.inner.lock().by_hash.keys().copied().collect()
    }

    /// Select transactions for a block template.
    ///
    /// Sender groups are taken in descending fee-per-byte of the group's
    /// first selectable transaction; within a group strict nonce order
    /// from the stored nonce, stopping at the first gap. Budgets cap the
    /// result.
    #[must_use]
    pub fn select_for_block(
        &self,
        budget_bytes: u64,
        budget_count: usize,
        state: &WorldState,
    ) -> Vec<Arc<SealedTransaction>> {
        let inner = self.inner.lock();

        // Group heads: (price of first selectable tx, sender).
        let mut groups: Vec<(u64, shared_types::Address)> = Vec::new();
        for (sender, nonces) in &inner.by_sender {
            let Ok(stored) = state.get_nonce(sender) else {
                continue;
            };
            if let Some(hash) = nonces.get(&(stored.nonce + 1)) {
                if let Some(pooled) = inner.by_hash.get(hash) {
                    groups.push((pooled.fee_per_byte, *sender));
                }
            }
        }
        groups.sort_by(|a, b| b.cmp(a));

        let mut selected = Vec::new();
        let mut used_bytes = 0u64;
        'groups: for (_, sender) in groups {
            let Ok(stored) = state.get_nonce(&sender) else {
                continue;
            };
            let Some(nonces) = inner.by_sender.get(&sender) else {
                continue;
            };
            let mut expected = stored.nonce + 1;
            while let Some(hash) = nonces.get(&expected) {
                let Some(pooled) = inner.by_hash.get(hash) else {
                    break;
                };
                if selected.len() >= budget_count {
                    break 'groups;
                }
                if used_bytes + u64::from(pooled.tx.size) > budget_bytes {
                    // This sender's chain cannot continue; later nonces
                    // would leave a gap.
                    continue 'groups;
                }
                used_bytes += u64::from(pooled.tx.size);
                selected.push(pooled.tx.clone());
                expected += 1;
            }
        }
        selected
    }

    /// Median and fast (75th percentile) fee per byte of the pool.
    #[must_use]
    pub fn fee_statistics(&self) -> FeeStatistics {
        let inner = self.inner.lock();
        let count = inner.by_price.len();
        if count == 0 {
            return FeeStatistics {
                tx_count: 0,
                median_fee_per_byte: 0,
                fast_fee_per_byte: 0,
            };
        }
        let prices: Vec<u64> = inner.by_price.iter().map(|e| e.fee_per_byte).collect();
        FeeStatistics {
            tx_count: count,
            median_fee_per_byte: prices[count / 2],
            fast_fee_per_byte: prices[(count * 3) / 4],
        }
    }

    // =========================================================================
    // CHAIN INTEGRATION
    // =========================================================================

    /// A block connected: drop its transactions as mined and drop any
    /// transaction the new tip made stale.
    pub fn on_block_connected(&self, block: &StoredBlock, state: &WorldState) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            for tx in &block.block.transactions {
                if inner.remove(&tx.hash).is_some() {
                    events.push(ChainEvent::MempoolTxRemoved {
                        hash: tx.hash,
                        reason: MempoolRemoveReason::Mined,
                    });
                }
            }

            // Senders whose stored nonce moved may have stale entries.
            let senders: Vec<shared_types::Address> =
                inner.by_sender.keys().copied().collect();
            for sender in senders {
                let Ok(stored) = state.get_nonce(&sender) else {
                    continue;
                };
                let stale: Vec<Hash> = inner
                    .by_sender
                    .get(&sender)
                    .map(|group| {
                        group
                            .range(..=stored.nonce)
                            .map(|(_, hash)| *hash)
                            .collect()
                    })
                    .unwrap_or_default();
                for hash in stale {
                    if inner.remove(&hash).is_some() {
                        events.push(ChainEvent::MempoolTxRemoved {
                            hash,
                            reason: MempoolRemoveReason::StaleNonce,
                        });
                    }
                }
            }
        }
        self.publish_all(events);
    }

    /// A block disconnected during a reorg: try to take its transactions
    /// back, subject to normal admission against the new tip.
    pub fn on_block_disconnected(&self, block: &StoredBlock, state: &WorldState) {
        for tx in &block.block.transactions {
            match self.add(tx.clone(), MempoolAddReason::Reorg, state) {
                Ok(()) => {}
                Err(e) => {
                    debug!(tx = %tx.hash, error = %e, "disconnected tx not re-admitted")
                }
            }
        }
    }

    /// Drop transactions older than the configured time to live.
    pub fn sweep_expired(&self) {
        let cutoff = now_ms().saturating_sub(self.config.ttl_ms);
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let expired: Vec<Hash> = inner
                .by_hash
                .iter()
                .filter(|(_, pooled)| pooled.added_at < cutoff)
                .map(|(hash, _)| *hash)
                .collect();
            for hash in expired {
                inner.remove(&hash);
                events.push(ChainEvent::MempoolTxRemoved {
                    hash,
                    reason: MempoolRemoveReason::Expired,
                });
            }
        }
        self.publish_all(events);
    }

    fn publish_all(&self, events: Vec<ChainEvent>) {
        for event in events {
            self.bus.publish(event);
        }
    }
}

/// Strict replace-by-fee: the new fee must exceed the old fee scaled by
/// the bump percent. Equality loses, which keeps equal-fee spam out.
fn rbf_acceptable(old_fee: u64, new_fee: u64, bump_percent: u64) -> bool {
    u128::from(new_fee) * 100 > u128::from(old_fee) * u128::from(bump_percent)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_codec::sign_and_seal_transaction;
    use ember_state::{MemoryTrieBackend, TrieBackend, TrieNodeStore, EMPTY_ROOT};
    use shared_bus::{EventBus, EventFilter};
    use shared_crypto::NodeIdentity;
    use shared_types::{
        Address, NetworkParamsState, Signature, Transaction, TxType, U256,
        STATE_ENTITY_VERSION,
    };

    #[test]
    fn test_rbf_threshold_is_strict() {
        // 10 * 1.10 = 11.0 exactly; equality must lose.
        assert!(!rbf_acceptable(10, 11, 110));
        assert!(rbf_acceptable(10, 12, 110));
        assert!(!rbf_acceptable(10, 10, 110));
        assert!(rbf_acceptable(0, 1, 110));
        assert!(!rbf_acceptable(0, 0, 110));
    }

    fn settings() -> Arc<NetworkSettings> {
        Arc::new(NetworkSettings::devnet())
    }

    /// A funded world state positioned as if block 0 just committed.
    fn funded_state(owner: &NodeIdentity) -> WorldState {
        let backend = Arc::new(MemoryTrieBackend::new()) as Arc<dyn TrieBackend>;
        let shared = Arc::new(TrieNodeStore::new(backend));
        let mut ws = WorldState::create_for_validation(shared, EMPTY_ROOT);
        ws.begin_block(0, 1_700_000_000_000);
        ws.set_params(NetworkParamsState {
            block_reward: U256::from(50u64),
            block_reward_pool_address: Address([0xEE; 20]),
            target_mining_time_ms: 10_000,
            asert_half_life_blocks: 144,
            asert_anchor_height: 0,
            min_difficulty: U256::one(),
            min_tx_base_fee: 0,
            min_tx_byte_fee: 0,
            current_authority_count: 0,
            updated_by_tx_hash: shared_types::Hash::ZERO,
            updated_at_height: 0,
            updated_at_timestamp: 0,
            version: STATE_ENTITY_VERSION,
        })
        .unwrap();
        ws.credit(
            &owner.address(),
            &Address::NATIVE_TOKEN,
            U256::from(1_000_000u64),
        )
        .unwrap();
        ws.calculate_root_hash().unwrap();
        ws.prepare_for_next_block();
        ws
    }

    fn transfer(owner: &NodeIdentity, nonce: u64, fee: u64) -> SealedTransaction {
        let raw = Transaction {
            version: 1,
            tx_type: TxType::Transfer,
            network: settings().network_id,
            timestamp: now_ms(),
            nonce,
            recipient: Some(Address([0x42; 20])),
            amount: Some(U256::from(10u64)),
            fee,
            token_address: Some(Address::NATIVE_TOKEN),
            payload: None,
            reference_hash: None,
            message: None,
            signature: Signature::default(),
        };
        sign_and_seal_transaction(raw, owner).unwrap()
    }

    fn mempool() -> (Mempool, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let pool = Mempool::new(settings(), MempoolConfig::default(), bus.clone());
        (pool, bus)
    }

    #[test]
    fn test_admission_and_duplicate() {
        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        let (pool, _bus) = mempool();

        let tx = transfer(&owner, 1, 5);
        pool.add(tx.clone(), MempoolAddReason::New, &state).unwrap();
        assert_eq!(pool.len(), 1);

        let err = pool.add(tx, MempoolAddReason::New, &state).unwrap_err();
        assert!(matches!(err, MempoolError::Duplicate(_)));
    }

    #[test]
    fn test_future_nonce_window() {
        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        let (pool, _bus) = mempool();

        // Gap inside the window is fine.
        pool.add(transfer(&owner, 5, 5), MempoolAddReason::New, &state)
            .unwrap();

        // Beyond the window is not.
        let too_far = settings().max_future_nonce_gap + 1;
        let err = pool
            .add(transfer(&owner, too_far, 5), MempoolAddReason::New, &state)
            .unwrap_err();
        assert!(matches!(err, MempoolError::Invalid(_)));
    }

    #[test]
    fn test_rbf_boundary_and_events() {
        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        let (pool, bus) = mempool();
        let mut sub = bus.subscribe(EventFilter::all());

        let t1 = transfer(&owner, 1, 10);
        let t1_hash = t1.hash;
        pool.add(t1, MempoolAddReason::New, &state).unwrap();

        // 11 is exactly 10 * 1.10; strictly-greater fails.
        let err = pool
            .add(transfer(&owner, 1, 11), MempoolAddReason::New, &state)
            .unwrap_err();
        assert!(matches!(err, MempoolError::ReplacementUnderpriced { .. }));

        let t2 = transfer(&owner, 1, 12);
        let t2_hash = t2.hash;
        pool.add(t2, MempoolAddReason::New, &state).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&t2_hash));
        assert!(!pool.contains(&t1_hash));

        // Add(t1), Removed(t1, Rbf), Added(t2).
        assert!(matches!(
            sub.try_recv().unwrap(),
            ChainEvent::MempoolTxAdded { .. }
        ));
        match sub.try_recv().unwrap() {
            ChainEvent::MempoolTxRemoved { hash, reason } => {
                assert_eq!(hash, t1_hash);
                assert_eq!(reason, MempoolRemoveReason::Rbf);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            sub.try_recv().unwrap(),
            ChainEvent::MempoolTxAdded { .. }
        ));
    }

    #[test]
    fn test_node_fee_floor() {
        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        let bus = Arc::new(EventBus::new());
        let pool = Mempool::new(
            settings(),
            MempoolConfig {
                min_acceptable_fee: 100,
                ..MempoolConfig::default()
            },
            bus,
        );

        let err = pool
            .add(transfer(&owner, 1, 99), MempoolAddReason::New, &state)
            .unwrap_err();
        assert!(matches!(err, MempoolError::FeeTooLow { required: 100, .. }));
        pool.add(transfer(&owner, 1, 100), MempoolAddReason::New, &state)
            .unwrap();
    }

    #[test]
    fn test_select_for_block_stops_at_gap() {
        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        let (pool, _bus) = mempool();

        pool.add(transfer(&owner, 1, 50), MempoolAddReason::New, &state)
            .unwrap();
        pool.add(transfer(&owner, 2, 50), MempoolAddReason::New, &state)
            .unwrap();
        // Nonce 4 leaves a gap at 3.
        pool.add(transfer(&owner, 4, 900), MempoolAddReason::New, &state)
            .unwrap();

        let selected = pool.select_for_block(1 << 20, 100, &state);
        let nonces: Vec<u64> = selected.iter().map(|tx| tx.nonce()).collect();
        assert_eq!(nonces, vec![1, 2]);
    }

    #[test]
    fn test_selection_orders_groups_by_price() {
        let rich = NodeIdentity::generate();
        let poor = NodeIdentity::generate();
        let backend = Arc::new(MemoryTrieBackend::new()) as Arc<dyn TrieBackend>;
        let shared = Arc::new(TrieNodeStore::new(backend));
        let mut state = WorldState::create_for_validation(shared, EMPTY_ROOT);
        state.begin_block(0, 1_700_000_000_000);
        state
            .set_params(NetworkParamsState {
                block_reward: U256::zero(),
                block_reward_pool_address: Address([0xEE; 20]),
                target_mining_time_ms: 10_000,
                asert_half_life_blocks: 144,
                asert_anchor_height: 0,
                min_difficulty: U256::one(),
                min_tx_base_fee: 0,
                min_tx_byte_fee: 0,
                current_authority_count: 0,
                updated_by_tx_hash: shared_types::Hash::ZERO,
                updated_at_height: 0,
                updated_at_timestamp: 0,
                version: STATE_ENTITY_VERSION,
            })
            .unwrap();
        for id in [&rich, &poor] {
            state
                .credit(&id.address(), &Address::NATIVE_TOKEN, U256::from(1_000_000u64))
                .unwrap();
        }
        state.calculate_root_hash().unwrap();
        state.prepare_for_next_block();

        let (pool, _bus) = mempool();
        pool.add(transfer(&poor, 1, 10), MempoolAddReason::New, &state)
            .unwrap();
        pool.add(transfer(&rich, 1, 5_000), MempoolAddReason::New, &state)
            .unwrap();

        let selected = pool.select_for_block(1 << 20, 10, &state);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].sender, rich.address());
        assert_eq!(selected[1].sender, poor.address());
    }

    #[test]
    fn test_fee_statistics() {
        let (pool, _bus) = mempool();
        assert_eq!(pool.fee_statistics().tx_count, 0);

        let owner = NodeIdentity::generate();
        let state = funded_state(&owner);
        for (nonce, fee) in [(1u64, 1_000u64), (2, 2_000), (3, 9_000)] {
            pool.add(transfer(&owner, nonce, fee), MempoolAddReason::New, &state)
                .unwrap();
        }
        let stats = pool.fee_statistics();
        assert_eq!(stats.tx_count, 3);
        assert!(stats.fast_fee_per_byte >= stats.median_fee_per_byte);
    }
}
