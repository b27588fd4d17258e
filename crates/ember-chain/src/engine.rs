//! # Chain Engine
//!
//! Receives blocks from every source and produces consistent tip
//! transitions. All entry points serialize on the master chain lock; all
//! writes of one transition share one atomic batch; events publish only
//! after the batch committed.
//!
//! ## Fork choice
//!
//! The preferred chain has strictly greater cumulative difficulty; equal
//! difficulty breaks toward the lower tip hash so every node resolves the
//! same winner.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ember_codec::{header_pow_bytes, header_signing_hash, tx_merkle_root};
use ember_state::WorldState;
use ember_storage::{AtomicBatch, BlockStore};
use parking_lot::Mutex;
use shared_bus::{ChainEvent, EventSink};
use shared_crypto::{recover_signer, PowHasher};
use shared_types::{
    Address, BlockEvent, BlockStateDiffs, ConnectedSource, Hash, NetworkSettings, SealedBlock,
    StoredBlock, U256,
};
use tracing::{debug, info, warn};

use crate::apply::{apply_transaction, credit_coinbase, BlockPosition};
use crate::difficulty::{asert_next_target, work_from_target};
use crate::error::{ChainError, InvalidBlockReason};
use crate::validation::{validate_stateful, validate_stateless, NonceRule};

/// Snapshot of the current best tip.
#[derive(Debug, Clone)]
pub struct TipInfo {
    pub hash: Hash,
    pub height: u64,
    pub timestamp: u64,
    pub state_root: Hash,
    pub cumulative_difficulty: U256,
}

impl TipInfo {
    fn from_stored(block: &StoredBlock) -> Self {
        Self {
            hash: block.hash(),
            height: block.height(),
            timestamp: block.block.header.header.timestamp,
            state_root: block.block.header.header.state_root_hash,
            cumulative_difficulty: block.cumulative_difficulty,
        }
    }
}

/// What an import did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Extended the best chain by one block.
    Connected,
    /// The block was already known; nothing happened.
    AlreadyKnown,
    /// Stored on a side chain that does not win fork choice.
    SideChain,
    /// Won fork choice; the chain was atomically swapped.
    Reorged { disconnected: u64, connected: u64 },
}

/// Parent context for header validation, independent of storage form.
#[derive(Debug, Clone, Copy)]
struct ParentInfo {
    hash: Hash,
    height: u64,
    timestamp: u64,
    cumulative_difficulty: U256,
}

/// The engine. One per node.
pub struct ChainEngine {
    store: Arc<BlockStore>,
    settings: Arc<NetworkSettings>,
    pow: Arc<dyn PowHasher>,
    bus: Arc<dyn EventSink>,
    /// The master chain lock. Everything that moves the tip holds it.
    tip: Mutex<TipInfo>,
}

impl ChainEngine {
    /// Attach to an initialized store. Fails if the genesis bootstrap has
    /// not run.
    pub fn new(
        store: Arc<BlockStore>,
        settings: Arc<NetworkSettings>,
        pow: Arc<dyn PowHasher>,
        bus: Arc<dyn EventSink>,
    ) -> Result<Self, ChainError> {
        let tip_hash = store.tip_hash()?.ok_or(ChainError::NotInitialized)?;
        let tip_block = store.expect_block(&tip_hash)?;
        info!(tip = %tip_hash, height = tip_block.height(), "chain engine attached");
        Ok(Self {
            store,
            settings,
            pow,
            bus,
            tip: Mutex::new(TipInfo::from_stored(&tip_block)),
        })
    }

    #[must_use]
    pub fn tip(&self) -> TipInfo {
        self.tip.lock().clone()
    }

    #[must_use]
    pub fn store(&self) -> Arc<BlockStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn settings(&self) -> Arc<NetworkSettings> {
        self.settings.clone()
    }

    /// Import a sealed block from any source.
    ///
    /// Holds the master chain lock for the whole transition. A block
    /// whose parent is the tip connects directly; a block landing on a
    /// stored side chain triggers fork choice and possibly the atomic
    /// swap; an unknown parent is the caller's cue to sync.
    pub fn import_block(
        &self,
        block: SealedBlock,
        source: ConnectedSource,
        received_from: Option<Address>,
    ) -> Result<ImportOutcome, ChainError> {
        let mut tip = self.tip.lock();
        let hash = block.hash();
        let parent_hash = block.header.previous_hash();

        if self.store.has_block(&hash)? {
            return Ok(ImportOutcome::AlreadyKnown);
        }

        if parent_hash == tip.hash {
            let started = now_ms();
            let (stored, diffs) = self.store.execute_atomic_batch(|batch| {
                let parent = ParentInfo {
                    hash: tip.hash,
                    height: tip.height,
                    timestamp: tip.timestamp,
                    cumulative_difficulty: tip.cumulative_difficulty,
                };
                let mut ws =
                    WorldState::create_for_validation(self.store.trie_store(), tip.state_root);
                self.validate_and_apply(batch, &mut ws, parent, block, source, received_from)
            })?;

            *tip = TipInfo::from_stored(&stored);
            info!(hash = %stored.hash(), height = stored.height(), ?source, "block connected");
            self.bus.publish(ChainEvent::BlockConnected {
                block: Arc::new(stored),
                diffs: Arc::new(diffs),
                source,
                timing_ms: now_ms().saturating_sub(started),
            });
            return Ok(ImportOutcome::Connected);
        }

        // Side-chain candidate: the parent must at least be known.
        let Some(parent_block) = self.store.stored_block(&parent_hash)? else {
            return Err(ChainError::UnknownParent {
                hash,
                parent: parent_hash,
            });
        };

        let candidate_cum = parent_block
            .cumulative_difficulty
            .saturating_add(work_from_target(block.header.header.difficulty));

        if !prefers(candidate_cum, hash, &tip) {
            let stored = StoredBlock {
                block,
                cumulative_difficulty: candidate_cum,
                received_at: now_ms(),
                received_from,
                source,
                events: Vec::new(),
            };
            self.store
                .execute_atomic_batch::<_, ChainError, _>(|batch| {
                    self.store.stage_side_block(batch, &stored);
                    Ok(())
                })?;
            debug!(hash = %hash, "stored side-chain block");
            return Ok(ImportOutcome::SideChain);
        }

        // The candidate wins fork choice: assemble its path back to the
        // common ancestor and swap atomically.
        let (ancestor, mut new_chain) = self.path_from_main_chain(&parent_block)?;
        new_chain.push(block);
        let switch = match source {
            ConnectedSource::Sync => ConnectedSource::Sync,
            _ => ConnectedSource::Reorg,
        };
        self.execute_atomic_reorg_swap(&mut tip, ancestor, new_chain, switch, received_from)
    }

    /// Walk a side chain back to the first block still on the best chain.
    /// Returns the common ancestor and the side path in ancestor-to-tip
    /// order (excluding the ancestor).
    fn path_from_main_chain(
        &self,
        from: &StoredBlock,
    ) -> Result<(StoredBlock, Vec<SealedBlock>), ChainError> {
        let mut path = Vec::new();
        let mut cursor = from.clone();
        loop {
            let on_main = self
                .store
                .main_chain_hash(cursor.height())?
                .is_some_and(|h| h == cursor.hash());
            if on_main {
                path.reverse();
                return Ok((cursor, path));
            }
            let parent_hash = cursor.block.header.previous_hash();
            path.push(cursor.block);
            cursor = self.store.stored_block(&parent_hash)?.ok_or({
                ChainError::UnknownParent {
                    hash: Hash::ZERO,
                    parent: parent_hash,
                }
            })?;
        }
    }

    /// Disconnect back to `ancestor` and connect `new_chain`, all in one
    /// batch. On any failure the old tip stands untouched.
    fn execute_atomic_reorg_swap(
        &self,
        tip: &mut TipInfo,
        ancestor: StoredBlock,
        new_chain: Vec<SealedBlock>,
        switch: ConnectedSource,
        received_from: Option<Address>,
    ) -> Result<ImportOutcome, ChainError> {
        let started = now_ms();
        let old_tip = tip.clone();

        // Old chain path, tip first, down to the ancestor exclusive.
        let mut old_path = Vec::new();
        let mut cursor = tip.hash;
        while cursor != ancestor.hash() {
            let block = self.store.expect_block(&cursor)?;
            cursor = block.block.header.previous_hash();
            old_path.push(block);
        }

        info!(
            ancestor = %ancestor.hash(),
            disconnecting = old_path.len(),
            connecting = new_chain.len(),
            ?switch,
            "executing atomic chain swap"
        );

        let connected: Vec<(StoredBlock, BlockStateDiffs)> =
            self.store.execute_atomic_batch(|batch| {
                for old in &old_path {
                    self.store.stage_block_disconnect(batch, old)?;
                }

                let mut ws = WorldState::create_for_validation(
                    self.store.trie_store(),
                    ancestor.block.header.header.state_root_hash,
                );
                let mut parent = ParentInfo {
                    hash: ancestor.hash(),
                    height: ancestor.height(),
                    timestamp: ancestor.block.header.header.timestamp,
                    cumulative_difficulty: ancestor.cumulative_difficulty,
                };

                let mut connected = Vec::with_capacity(new_chain.len());
                for block in new_chain {
                    let (stored, diffs) = self.validate_and_apply(
                        batch,
                        &mut ws,
                        parent,
                        block,
                        switch,
                        received_from,
                    )?;
                    parent = ParentInfo {
                        hash: stored.hash(),
                        height: stored.height(),
                        timestamp: stored.block.header.header.timestamp,
                        cumulative_difficulty: stored.cumulative_difficulty,
                    };
                    ws.prepare_for_next_block();
                    connected.push((stored, diffs));
                }
                Ok::<_, ChainError>(connected)
            })?;

        let (last, _) = connected.last().ok_or_else(|| {
            ChainError::Store(ember_storage::StoreError::Corruption(
                "swap connected no blocks".to_string(),
            ))
        })?;
        *tip = TipInfo::from_stored(last);

        // Disconnects first, oldest-tip first; then connects in chain
        // order; then the reorg marker.
        for old in &old_path {
            self.bus.publish(ChainEvent::BlockDisconnected {
                block: Arc::new(old.clone()),
            });
        }
        let timing_ms = now_ms().saturating_sub(started);
        let connected_count = connected.len() as u64;
        for (stored, diffs) in connected {
            self.bus.publish(ChainEvent::BlockConnected {
                block: Arc::new(stored),
                diffs: Arc::new(diffs),
                source: switch,
                timing_ms,
            });
        }
        if switch == ConnectedSource::Reorg && !old_path.is_empty() {
            self.bus.publish(ChainEvent::Reorg {
                old_tip: old_tip.hash,
                old_height: old_tip.height,
                new_tip: tip.hash,
                new_height: tip.height,
            });
        }

        Ok(ImportOutcome::Reorged {
            disconnected: old_path.len() as u64,
            connected: connected_count,
        })
    }

    /// Validate one block against its parent and apply it: header
    /// context, every transaction, the coinbase, and the state root. On
    /// success the block and the world-state nodes are staged into the
    /// batch.
    fn validate_and_apply(
        &self,
        batch: &mut AtomicBatch,
        ws: &mut WorldState,
        parent: ParentInfo,
        block: SealedBlock,
        source: ConnectedSource,
        received_from: Option<Address>,
    ) -> Result<(StoredBlock, BlockStateDiffs), ChainError> {
        let hash = block.hash();
        let header = &block.header.header;

        self.validate_header_context(&block, parent, ws)?;

        ws.begin_block(header.height, header.timestamp);
        let pos = BlockPosition {
            height: header.height,
            timestamp: header.timestamp,
        };

        let mut events: Vec<BlockEvent> = Vec::new();
        let mut total_fees = U256::zero();
        for tx in &block.transactions {
            validate_stateless(tx, &self.settings).map_err(|reason| {
                ChainError::invalid_block(
                    hash,
                    InvalidBlockReason::InvalidTransaction {
                        hash: tx.hash,
                        reason,
                    },
                )
            })?;
            match validate_stateful(tx, ws, NonceRule::Exact, header.timestamp) {
                Ok(()) => {}
                Err(ChainError::InvalidTx(reason)) => {
                    debug!(tx = %tx.hash, %reason, "transaction failed in-block validation");
                    return Err(ChainError::invalid_block(
                        hash,
                        InvalidBlockReason::InvalidTransaction {
                            hash: tx.hash,
                            reason,
                        },
                    ));
                }
                Err(other) => return Err(other),
            }
            let fee = apply_transaction(ws, tx, pos, &self.settings, &mut events)?;
            total_fees = total_fees.saturating_add(fee);
        }

        credit_coinbase(ws, &header.coinbase, total_fees, &mut events)?;

        let computed_root = ws.calculate_root_hash()?;
        if computed_root != header.state_root_hash {
            warn!(block = %hash, expected = %header.state_root_hash, got = %computed_root,
                "state root mismatch");
            return Err(ChainError::invalid_block(
                hash,
                InvalidBlockReason::BadStateRoot {
                    expected: header.state_root_hash,
                    got: computed_root,
                },
            ));
        }

        let stored = StoredBlock {
            cumulative_difficulty: parent
                .cumulative_difficulty
                .saturating_add(work_from_target(header.difficulty)),
            received_at: now_ms(),
            received_from,
            source,
            events,
            block,
        };
        let diffs = ws.collect_diffs()?;
        ws.persist_to_batch(batch);
        self.store.stage_block_connect(batch, &stored, &diffs)?;
        Ok((stored, diffs))
    }

    /// Header context checks: linkage, clock, difficulty schedule, proof
    /// of work, identity signature, transaction root, size limits.
    fn validate_header_context(
        &self,
        block: &SealedBlock,
        parent: ParentInfo,
        ws: &WorldState,
    ) -> Result<(), ChainError> {
        let hash = block.hash();
        let header = &block.header.header;
        let reject =
            |reason: InvalidBlockReason| Err(ChainError::invalid_block(hash, reason));

        if header.height != parent.height + 1 || header.previous_hash != parent.hash {
            return reject(InvalidBlockReason::BadHeight {
                parent: parent.height,
                got: header.height,
            });
        }
        if header.timestamp <= parent.timestamp {
            return reject(InvalidBlockReason::TimestampNotAfterParent {
                parent: parent.timestamp,
                got: header.timestamp,
            });
        }
        let now = now_ms();
        if header.timestamp > now + self.settings.clock_skew_tolerance_ms {
            return reject(InvalidBlockReason::TimestampInFuture {
                got: header.timestamp,
                now,
                tolerance_ms: self.settings.clock_skew_tolerance_ms,
            });
        }

        let params = ws.params()?;
        let anchor = self
            .store
            .block_at_height(params.asert_anchor_height)?
            .ok_or_else(|| {
                ChainError::invalid_block(
                    hash,
                    InvalidBlockReason::MissingAnchor(params.asert_anchor_height),
                )
            })?;
        let expected = asert_next_target(
            anchor.block.header.header.difficulty,
            anchor.block.header.header.timestamp,
            anchor.height(),
            parent.timestamp,
            header.height,
            params.target_mining_time_ms,
            params.asert_half_life_blocks,
            params.min_difficulty,
        );
        if header.difficulty != expected {
            return reject(InvalidBlockReason::BadDifficulty {
                expected,
                got: header.difficulty,
            });
        }

        let pow = self.pow.pow_hash(&header_pow_bytes(header));
        if pow.as_u256() > header.difficulty {
            return reject(InvalidBlockReason::BadProofOfWork);
        }

        match recover_signer(&header_signing_hash(header), &header.signature) {
            Ok(signer) if signer == header.identity => {}
            _ => return reject(InvalidBlockReason::BadBlockSignature),
        }

        let tx_hashes = block.tx_hashes();
        if tx_merkle_root(&tx_hashes) != header.tx_root_hash {
            return reject(InvalidBlockReason::BadTxRoot);
        }

        let tx_count = block.transactions.len() as u32;
        let count_limit = self.settings.max_tx_count_per_block(header.height);
        if tx_count > count_limit {
            return reject(InvalidBlockReason::TooManyTransactions {
                count: tx_count,
                limit: count_limit,
            });
        }
        let size = block.total_size();
        let size_limit = self.settings.max_block_size(header.height);
        if size > size_limit {
            return reject(InvalidBlockReason::OversizedBlock {
                size,
                limit: size_limit,
            });
        }
        Ok(())
    }
}

/// Fork choice: strictly more work wins; equal work prefers the lower
/// hash.
fn prefers(candidate_cum: U256, candidate_hash: Hash, tip: &TipInfo) -> bool {
    candidate_cum > tip.cumulative_difficulty
        || (candidate_cum == tip.cumulative_difficulty && candidate_hash < tip.hash)
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
