//! # Genesis
//!
//! Deterministic construction of block zero from a premine table, the
//! initial authority set, and the starting consensus parameters. The same
//! spec always produces the same genesis hash, which is how a node
//! detects that a data directory belongs to a different network.

use ember_codec::{entities::HEADER_VERSION, seal_header};
use ember_state::{WorldState, EMPTY_ROOT};
use ember_storage::BlockStore;
use shared_types::{
    Address, AuthorityState, BlockHeader, BlockStateDiffs, ConnectedSource, Hash,
    NetworkParamsState, NetworkSettings, SealedBlock, Signature, StoredBlock, U256,
    STATE_ENTITY_VERSION,
};
use shared_types::settings::GenesisParams;
use tracing::info;

use crate::difficulty::work_from_target;
use crate::error::ChainError;

/// Everything that defines block zero for a network.
#[derive(Debug, Clone)]
pub struct GenesisSpec {
    /// Fixed genesis timestamp in epoch milliseconds.
    pub timestamp: u64,
    /// Initial native balances.
    pub premine: Vec<(Address, U256)>,
    /// Initial authority set.
    pub authorities: Vec<Address>,
    /// Where block rewards are paid from.
    pub reward_pool_address: Address,
    /// Native balance of the reward pool at genesis.
    pub reward_pool_balance: U256,
    pub params: GenesisParams,
}

impl GenesisSpec {
    /// A development-network genesis: one funded account, one authority.
    #[must_use]
    pub fn dev(funded: Address, authority: Address) -> Self {
        Self {
            timestamp: 1_700_000_000_000,
            premine: vec![(funded, U256::from(1_000_000_000u64))],
            authorities: vec![authority],
            reward_pool_address: Address([0xEE; 20]),
            reward_pool_balance: U256::from(1_000_000_000_000u64),
            params: GenesisParams::default(),
        }
    }
}

/// Build the genesis block over the store's trie without committing.
/// Returns the world state (staged, uncommitted), the stored block, and
/// its diffs.
pub fn build_genesis(
    store: &BlockStore,
    spec: &GenesisSpec,
    _settings: &NetworkSettings,
) -> Result<(WorldState, StoredBlock, BlockStateDiffs), ChainError> {
    let mut ws = WorldState::create_for_validation(store.trie_store(), EMPTY_ROOT);
    ws.begin_block(0, spec.timestamp);

    for (address, amount) in &spec.premine {
        ws.credit(address, &Address::NATIVE_TOKEN, *amount)?;
    }
    if !spec.reward_pool_balance.is_zero() {
        ws.credit(
            &spec.reward_pool_address,
            &Address::NATIVE_TOKEN,
            spec.reward_pool_balance,
        )?;
    }
    for authority in &spec.authorities {
        ws.put_authority(
            *authority,
            AuthorityState {
                origin_tx_hash: Hash::ZERO,
                created_at_height: 0,
                created_at_timestamp: spec.timestamp,
                version: STATE_ENTITY_VERSION,
            },
        )?;
    }
    ws.set_params(NetworkParamsState {
        block_reward: spec.params.block_reward,
        block_reward_pool_address: spec.reward_pool_address,
        target_mining_time_ms: spec.params.target_mining_time_ms,
        asert_half_life_blocks: spec.params.asert_half_life_blocks,
        asert_anchor_height: 0,
        min_difficulty: spec.params.min_difficulty,
        min_tx_base_fee: spec.params.min_tx_base_fee,
        min_tx_byte_fee: spec.params.min_tx_byte_fee,
        current_authority_count: spec.authorities.len() as u32,
        updated_by_tx_hash: Hash::ZERO,
        updated_at_height: 0,
        updated_at_timestamp: spec.timestamp,
        version: STATE_ENTITY_VERSION,
    })?;

    let state_root = ws.calculate_root_hash()?;
    let header = BlockHeader {
        version: HEADER_VERSION,
        height: 0,
        timestamp: spec.timestamp,
        previous_hash: Hash::ZERO,
        tx_root_hash: Hash::ZERO,
        state_root_hash: state_root,
        difficulty: spec.params.initial_target,
        coinbase: Address::ZERO,
        nonce: 0,
        identity: Address::ZERO,
        signature: Signature::default(),
    };
    let diffs = ws.collect_diffs()?;
    let stored = StoredBlock {
        block: SealedBlock {
            header: seal_header(header),
            transactions: Vec::new(),
        },
        cumulative_difficulty: work_from_target(spec.params.initial_target),
        received_at: spec.timestamp,
        received_from: None,
        source: ConnectedSource::Genesis,
        events: Vec::new(),
    };
    Ok((ws, stored, diffs))
}

/// Initialize a fresh store with genesis, or verify an existing store
/// belongs to this genesis. Returns the genesis hash.
pub fn bootstrap(
    store: &BlockStore,
    spec: &GenesisSpec,
    settings: &NetworkSettings,
) -> Result<Hash, ChainError> {
    let (mut ws, genesis, diffs) = build_genesis(store, spec, settings)?;
    let expected = genesis.hash();

    match store.tip_hash()? {
        Some(tip_hash) => {
            ws.rollback();
            let found = store
                .main_chain_hash(0)?
                .ok_or_else(|| {
                    ChainError::Store(ember_storage::StoreError::Corruption(
                        "store has a tip but no genesis entry".to_string(),
                    ))
                })?;
            if found != expected {
                return Err(ChainError::GenesisMismatch { expected, found });
            }
            // Startup integrity: the tip must load and decode.
            let tip = store.expect_block(&tip_hash)?;
            info!(tip = %tip_hash, height = tip.height(), "existing chain verified");
            Ok(expected)
        }
        None => {
            store.execute_atomic_batch::<_, ChainError, _>(|batch| {
                ws.persist_to_batch(batch);
                store.stage_block_connect(batch, &genesis, &diffs)?;
                Ok(())
            })?;
            info!(genesis = %expected, "genesis block written");
            Ok(expected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_storage::MemoryKeyValueStore;
    use std::sync::Arc;

    fn spec() -> GenesisSpec {
        GenesisSpec::dev(Address([1; 20]), Address([2; 20]))
    }

    fn fresh_store() -> BlockStore {
        BlockStore::open(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn test_bootstrap_writes_genesis_once() {
        let store = fresh_store();
        let settings = NetworkSettings::devnet();

        let first = bootstrap(&store, &spec(), &settings).unwrap();
        assert_eq!(store.tip_hash().unwrap(), Some(first));
        assert_eq!(store.main_chain_hash(0).unwrap(), Some(first));

        // A second bootstrap verifies instead of rewriting.
        let second = bootstrap(&store, &spec(), &settings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let settings = NetworkSettings::devnet();
        let a = bootstrap(&fresh_store(), &spec(), &settings).unwrap();
        let b = bootstrap(&fresh_store(), &spec(), &settings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mismatched_genesis_detected() {
        let store = fresh_store();
        let settings = NetworkSettings::devnet();
        bootstrap(&store, &spec(), &settings).unwrap();

        let mut other = spec();
        other.premine[0].1 = U256::from(7u64);
        let err = bootstrap(&store, &other, &settings).unwrap_err();
        assert!(matches!(err, ChainError::GenesisMismatch { .. }));
    }

    #[test]
    fn test_genesis_state_contains_premine_and_params() {
        let store = fresh_store();
        let settings = NetworkSettings::devnet();
        bootstrap(&store, &spec(), &settings).unwrap();

        let genesis = store.block_at_height(0).unwrap().unwrap();
        let ws = WorldState::create_for_validation(
            store.trie_store(),
            genesis.block.header.header.state_root_hash,
        );
        let balance = ws
            .get_balance(&Address([1; 20]), &Address::NATIVE_TOKEN)
            .unwrap();
        assert_eq!(balance.balance, U256::from(1_000_000_000u64));
        assert!(ws.is_authority(&Address([2; 20])).unwrap());
        let params = ws.params().unwrap();
        assert_eq!(params.current_authority_count, 1);
        assert_eq!(params.asert_anchor_height, 0);
    }
}
