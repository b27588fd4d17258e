//! # Mining Loop
//!
//! Assemble a candidate on top of the tip, search for a nonce whose
//! proof-of-work hash meets the target, sign, seal, submit. The search
//! aborts as soon as the tip moves.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ember_chain::difficulty::asert_next_target;
use ember_chain::{
    apply::{apply_transaction, credit_coinbase, BlockPosition},
    validate_stateful, ChainEngine, ChainError, NonceRule,
};
use ember_codec::{entities::HEADER_VERSION, header_pow_bytes, sign_and_seal_header, tx_merkle_root};
use ember_mempool::Mempool;
use ember_state::WorldState;
use shared_crypto::{NodeIdentity, PowHasher};
use shared_types::{
    Address, BlockEvent, BlockHeader, ConnectedSource, Hash, NetworkSettings, SealedBlock,
    SealedTransaction, Signature, U256,
};
use tracing::{debug, info, warn};

/// Mining settings.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub enabled: bool,
    /// Nonce-search worker threads; zero means one per remaining core.
    pub threads: usize,
    /// Reward recipient; defaults to the node identity's address.
    pub coinbase: Option<Address>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threads: 0,
            coinbase: None,
        }
    }
}

/// An assembled, unsolved candidate.
struct Candidate {
    header: BlockHeader,
    transactions: Vec<SealedTransaction>,
    parent_hash: Hash,
}

/// The miner. One per node; idle unless enabled.
pub struct Miner {
    engine: Arc<ChainEngine>,
    mempool: Arc<Mempool>,
    settings: Arc<NetworkSettings>,
    identity: Arc<NodeIdentity>,
    pow: Arc<dyn PowHasher>,
    config: MinerConfig,
    stop: Arc<AtomicBool>,
}

impl Miner {
    #[must_use]
    pub fn new(
        engine: Arc<ChainEngine>,
        mempool: Arc<Mempool>,
        settings: Arc<NetworkSettings>,
        identity: Arc<NodeIdentity>,
        pow: Arc<dyn PowHasher>,
        config: MinerConfig,
    ) -> Self {
        Self {
            engine,
            mempool,
            settings,
            identity,
            pow,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle used to stop the loop from the shutdown path.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the orchestration loop on its own thread.
    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("ember-miner".to_string())
            .spawn(move || self.run())
            .expect("spawning the miner thread cannot fail")
    }

    fn run(&self) {
        let workers = if self.config.threads == 0 {
            (num_cpus::get().saturating_sub(2)).max(1)
        } else {
            self.config.threads
        };
        info!(workers, "miner started");

        while !self.stop.load(Ordering::Relaxed) {
            let candidate = match self.assemble() {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(error = %e, "candidate assembly failed");
                    thread::sleep(Duration::from_millis(500));
                    continue;
                }
            };

            match self.search(&candidate, workers) {
                Some(nonce) => {
                    if let Err(e) = self.submit(candidate, nonce) {
                        warn!(error = %e, "mined block rejected");
                    }
                }
                // Tip moved or shutdown requested; reassemble.
                None => continue,
            }
        }
        info!("miner stopped");
    }

    /// Build a candidate over a lazy-diff state at the current tip.
    fn assemble(&self) -> Result<Candidate, ChainError> {
        let tip = self.engine.tip();
        let store = self.engine.store();
        let height = tip.height + 1;
        let timestamp = now_ms().max(tip.timestamp + 1);

        let mut ws = WorldState::create_for_mining(store.trie_store(), tip.state_root);
        ws.begin_block(height, timestamp);
        let params = ws.params()?;

        let anchor = store
            .block_at_height(params.asert_anchor_height)?
            .ok_or(ChainError::NotInitialized)?;
        let target = asert_next_target(
            anchor.block.header.header.difficulty,
            anchor.block.header.header.timestamp,
            anchor.height(),
            tip.timestamp,
            height,
            params.target_mining_time_ms,
            params.asert_half_life_blocks,
            params.min_difficulty,
        );

        // Leave generous header room inside the block budget.
        let byte_budget = self.settings.max_block_size(height).saturating_sub(1_024);
        let count_budget = self.settings.max_tx_count_per_block(height) as usize;
        let snapshot =
            WorldState::create_for_validation(store.trie_store(), tip.state_root);
        let selected = self
            .mempool
            .select_for_block(byte_budget, count_budget, &snapshot);

        let mut included = Vec::with_capacity(selected.len());
        let mut events: Vec<BlockEvent> = Vec::new();
        let mut total_fees = U256::zero();
        let pos = BlockPosition { height, timestamp };
        for tx in selected {
            if validate_stateful(&tx, &ws, NonceRule::Exact, timestamp).is_err() {
                continue;
            }
            match apply_transaction(&mut ws, &tx, pos, &self.settings, &mut events) {
                Ok(fee) => {
                    total_fees = total_fees.saturating_add(fee);
                    included.push((*tx).clone());
                }
                Err(e) => debug!(tx = %tx.hash, error = %e, "tx dropped from candidate"),
            }
        }
        let coinbase = self.config.coinbase.unwrap_or(self.identity.address());
        credit_coinbase(&mut ws, &coinbase, total_fees, &mut events)?;
        let state_root = ws.calculate_root_hash()?;

        let tx_hashes: Vec<Hash> = included.iter().map(|tx| tx.hash).collect();
        let header = BlockHeader {
            version: HEADER_VERSION,
            height,
            timestamp,
            previous_hash: tip.hash,
            tx_root_hash: tx_merkle_root(&tx_hashes),
            state_root_hash: state_root,
            difficulty: target,
            coinbase,
            nonce: 0,
            identity: self.identity.address(),
            signature: Signature::default(),
        };
        debug!(height, txs = included.len(), "candidate assembled");
        Ok(Candidate {
            header,
            transactions: included,
            parent_hash: tip.hash,
        })
    }

    /// Grind nonces across worker threads until a solution lands, the
    /// tip moves, or shutdown is requested.
    fn search(&self, candidate: &Candidate, workers: usize) -> Option<u64> {
        let found = Arc::new(AtomicBool::new(false));
        let solution = Arc::new(AtomicU64::new(0));

        thread::scope(|scope| {
            for worker in 0..workers {
                let mut header = candidate.header.clone();
                let found = found.clone();
                let solution = solution.clone();
                let pow = self.pow.clone();
                let stop = self.stop.clone();
                let engine = self.engine.clone();
                let parent = candidate.parent_hash;
                let target = candidate.header.difficulty;

                scope.spawn(move || {
                    let mut nonce = worker as u64;
                    let stride = workers as u64;
                    let mut since_check = 0u32;
                    loop {
                        if found.load(Ordering::Relaxed) {
                            return;
                        }
                        since_check += 1;
                        if since_check >= 4_096 {
                            since_check = 0;
                            if stop.load(Ordering::Relaxed) || engine.tip().hash != parent {
                                return;
                            }
                        }

                        header.nonce = nonce;
                        let hash = pow.pow_hash(&header_pow_bytes(&header));
                        if hash.as_u256() <= target {
                            if !found.swap(true, Ordering::SeqCst) {
                                solution.store(nonce, Ordering::SeqCst);
                            }
                            return;
                        }
                        nonce = nonce.wrapping_add(stride);
                    }
                });
            }
        });

        if found.load(Ordering::SeqCst) {
            Some(solution.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    /// Finalize the solved candidate and hand it to the engine.
    fn submit(&self, candidate: Candidate, nonce: u64) -> Result<(), ChainError> {
        let mut header = candidate.header;
        header.nonce = nonce;
        let sealed_header = match sign_and_seal_header(header, &self.identity) {
            Ok(sealed) => sealed,
            Err(ember_codec::SealError::Crypto(e)) => return Err(ChainError::Crypto(e)),
            Err(ember_codec::SealError::Codec(e)) => return Err(ChainError::Codec(e)),
        };

        let block = SealedBlock {
            header: sealed_header,
            transactions: candidate.transactions,
        };
        let hash = block.hash();
        self.engine
            .import_block(block, ConnectedSource::Miner, None)?;
        info!(block = %hash, "mined block connected");
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
