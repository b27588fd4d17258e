//! End-to-end chain scenarios over the in-memory storage adapter:
//! genesis and transfers, nonce rules, replace-by-fee, a depth-2 reorg
//! with event ordering, proposal approval with token creation, and
//! atomicity under rejected blocks.

use std::sync::Arc;

use ember_chain::apply::{apply_transaction, credit_coinbase, derive_token_address, BlockPosition};
use ember_chain::difficulty::asert_next_target;
use ember_chain::{
    bootstrap, ChainEngine, ChainError, GenesisSpec, ImportOutcome, InvalidBlockReason,
    InvalidTxReason,
};
use ember_codec::{
    entities::{HEADER_VERSION, TX_VERSION},
    header_pow_bytes, sign_and_seal_header, sign_and_seal_transaction, tx_merkle_root,
};
use ember_mempool::{Mempool, MempoolConfig};
use ember_state::WorldState;
use ember_storage::{BlockStore, MemoryKeyValueStore};
use shared_bus::{
    ChainEvent, EventBus, EventFilter, EventSink, MempoolAddReason, MempoolRemoveReason,
    Subscription,
};
use shared_crypto::{CpuPowHasher, NodeIdentity, PowHasher};
use shared_types::settings::GenesisParams;
use shared_types::{
    Address, BipAction, BipStatus, BlockEvent, BlockHeader, ConnectedSource, Hash,
    NetworkSettings, SealedBlock, SealedTransaction, Signature, StoredBlock, Transaction,
    TxPayload, TxType, U256,
};

struct Harness {
    settings: Arc<NetworkSettings>,
    store: Arc<BlockStore>,
    engine: Arc<ChainEngine>,
    bus: Arc<EventBus>,
    alice: NodeIdentity,
    bob: NodeIdentity,
    authorities: Vec<NodeIdentity>,
    miner: NodeIdentity,
    genesis_hash: Hash,
}

impl Harness {
    fn new() -> Harness {
        let settings = Arc::new(NetworkSettings::devnet());
        let alice = NodeIdentity::generate();
        let bob = NodeIdentity::generate();
        let authorities: Vec<NodeIdentity> =
            (0..3).map(|_| NodeIdentity::generate()).collect();
        let miner = NodeIdentity::generate();

        let spec = GenesisSpec {
            timestamp: 1_700_000_000_000,
            premine: vec![
                (alice.address(), U256::from(1_000u64)),
                // Authorities need native balance for proposal fees.
                (authorities[0].address(), U256::from(100_000u64)),
                (authorities[1].address(), U256::from(100_000u64)),
                (authorities[2].address(), U256::from(100_000u64)),
            ],
            authorities: authorities.iter().map(NodeIdentity::address).collect(),
            reward_pool_address: Address([0xEE; 20]),
            reward_pool_balance: U256::from(1_000_000_000_000u64),
            params: GenesisParams {
                initial_target: U256::MAX >> 4,
                ..GenesisParams::default()
            },
        };

        let store = Arc::new(BlockStore::open(Arc::new(MemoryKeyValueStore::new())));
        let genesis_hash = bootstrap(&store, &spec, &settings).unwrap();

        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(
            ChainEngine::new(
                store.clone(),
                settings.clone(),
                Arc::new(CpuPowHasher),
                bus.clone() as Arc<dyn EventSink>,
            )
            .unwrap(),
        );

        Harness {
            settings,
            store,
            engine,
            bus,
            alice,
            bob,
            authorities,
            miner,
            genesis_hash,
        }
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe(EventFilter::all())
    }

    /// A read-only world state at the current tip.
    fn tip_state(&self) -> WorldState {
        let tip = self.engine.tip();
        WorldState::create_for_validation(self.store.trie_store(), tip.state_root)
    }

    fn balance(&self, address: Address) -> U256 {
        self.tip_state()
            .get_balance(&address, &Address::NATIVE_TOKEN)
            .unwrap()
            .balance
    }

    fn transfer(
        &self,
        from: &NodeIdentity,
        to: Address,
        amount: u64,
        fee: u64,
        nonce: u64,
    ) -> SealedTransaction {
        let raw = Transaction {
            version: TX_VERSION,
            tx_type: TxType::Transfer,
            network: self.settings.network_id,
            timestamp: 1_700_000_000_500,
            nonce,
            recipient: Some(to),
            amount: Some(U256::from(amount)),
            fee,
            token_address: Some(Address::NATIVE_TOKEN),
            payload: None,
            reference_hash: None,
            message: None,
            signature: Signature::default(),
        };
        sign_and_seal_transaction(raw, from).unwrap()
    }

    fn bip_create(
        &self,
        from: &NodeIdentity,
        action: BipAction,
        nonce: u64,
    ) -> SealedTransaction {
        let raw = Transaction {
            version: TX_VERSION,
            tx_type: TxType::BipCreate,
            network: self.settings.network_id,
            timestamp: 1_700_000_000_500,
            nonce,
            recipient: None,
            amount: None,
            fee: 0,
            token_address: None,
            payload: Some(TxPayload::BipProposal(action)),
            reference_hash: None,
            message: None,
            signature: Signature::default(),
        };
        sign_and_seal_transaction(raw, from).unwrap()
    }

    fn bip_vote(
        &self,
        from: &NodeIdentity,
        proposal: Hash,
        approve: bool,
        nonce: u64,
    ) -> SealedTransaction {
        let raw = Transaction {
            version: TX_VERSION,
            tx_type: TxType::BipVote,
            network: self.settings.network_id,
            timestamp: 1_700_000_000_500,
            nonce,
            recipient: None,
            amount: None,
            fee: 0,
            token_address: None,
            payload: Some(TxPayload::BipVote { approve }),
            reference_hash: Some(proposal),
            message: None,
            signature: Signature::default(),
        };
        sign_and_seal_transaction(raw, from).unwrap()
    }

    /// Build a fully valid block on `parent`: apply the transactions,
    /// compute the state root and schedule target, grind a nonce, sign.
    fn make_block(
        &self,
        parent: &StoredBlock,
        txs: Vec<SealedTransaction>,
        timestamp: u64,
    ) -> SealedBlock {
        let height = parent.height() + 1;
        let mut ws = WorldState::create_for_validation(
            self.store.trie_store(),
            parent.block.header.header.state_root_hash,
        );
        ws.begin_block(height, timestamp);
        let params = ws.params().unwrap();

        let pos = BlockPosition { height, timestamp };
        let mut events: Vec<BlockEvent> = Vec::new();
        let mut fees = U256::zero();
        for tx in &txs {
            fees += apply_transaction(&mut ws, tx, pos, &self.settings, &mut events).unwrap();
        }
        credit_coinbase(&mut ws, &self.miner.address(), fees, &mut events).unwrap();
        let state_root = ws.calculate_root_hash().unwrap();

        self.seal_pow_block(parent, txs, timestamp, state_root, &params)
    }

    /// Build a block whose header claims `state_root` without applying
    /// anything; used to craft invalid blocks.
    fn make_block_with_root(
        &self,
        parent: &StoredBlock,
        txs: Vec<SealedTransaction>,
        timestamp: u64,
        state_root: Hash,
    ) -> SealedBlock {
        let ws = WorldState::create_for_validation(
            self.store.trie_store(),
            parent.block.header.header.state_root_hash,
        );
        let params = ws.params().unwrap();
        self.seal_pow_block(parent, txs, timestamp, state_root, &params)
    }

    fn seal_pow_block(
        &self,
        parent: &StoredBlock,
        txs: Vec<SealedTransaction>,
        timestamp: u64,
        state_root: Hash,
        params: &shared_types::NetworkParamsState,
    ) -> SealedBlock {
        let height = parent.height() + 1;
        let anchor = self
            .store
            .block_at_height(params.asert_anchor_height)
            .unwrap()
            .unwrap();
        let target = asert_next_target(
            anchor.block.header.header.difficulty,
            anchor.block.header.header.timestamp,
            anchor.height(),
            parent.block.header.header.timestamp,
            height,
            params.target_mining_time_ms,
            params.asert_half_life_blocks,
            params.min_difficulty,
        );

        let tx_hashes: Vec<Hash> = txs.iter().map(|tx| tx.hash).collect();
        let mut header = BlockHeader {
            version: HEADER_VERSION,
            height,
            timestamp,
            previous_hash: parent.hash(),
            tx_root_hash: tx_merkle_root(&tx_hashes),
            state_root_hash: state_root,
            difficulty: target,
            coinbase: self.miner.address(),
            nonce: 0,
            identity: self.miner.address(),
            signature: Signature::default(),
        };

        let hasher = CpuPowHasher;
        while hasher.pow_hash(&header_pow_bytes(&header)).as_u256() > target {
            header.nonce += 1;
        }

        SealedBlock {
            header: sign_and_seal_header(header, &self.miner).unwrap(),
            transactions: txs,
        }
    }

    fn genesis_block(&self) -> StoredBlock {
        self.store.expect_block(&self.genesis_hash).unwrap()
    }

    fn mempool(&self) -> Mempool {
        Mempool::new(
            self.settings.clone(),
            MempoolConfig::default(),
            self.bus.clone() as Arc<dyn EventSink>,
        )
    }
}

const GENESIS_TS: u64 = 1_700_000_000_000;

// =============================================================================
// SCENARIO: genesis plus one transfer
// =============================================================================

#[test]
fn test_genesis_and_one_transfer() {
    let h = Harness::new();
    assert_eq!(h.balance(h.alice.address()), U256::from(1_000u64));

    let tx = h.transfer(&h.alice, h.bob.address(), 250, 3, 1);
    let block = h.make_block(&h.genesis_block(), vec![tx], GENESIS_TS + 10_000);
    let outcome = h
        .engine
        .import_block(block, ConnectedSource::Miner, None)
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Connected);

    assert_eq!(h.balance(h.alice.address()), U256::from(747u64));
    assert_eq!(h.balance(h.bob.address()), U256::from(250u64));
    assert_eq!(
        h.tip_state().get_nonce(&h.alice.address()).unwrap().nonce,
        1
    );

    // Coinbase got the pool reward plus the fee.
    let params = h.tip_state().params().unwrap();
    assert_eq!(
        h.balance(h.miner.address()),
        params.block_reward + U256::from(3u64)
    );

    // The new root is what the header committed to.
    let tip = h.engine.tip();
    assert_eq!(tip.height, 1);
    assert_eq!(
        h.store
            .block_at_height(1)
            .unwrap()
            .unwrap()
            .block
            .header
            .header
            .state_root_hash,
        tip.state_root
    );
}

// =============================================================================
// SCENARIO: future nonce is pool-acceptable but block-invalid
// =============================================================================

#[test]
fn test_future_nonce_accepted_by_pool_rejected_in_block() {
    let h = Harness::new();
    let gap_tx = h.transfer(&h.alice, h.bob.address(), 10, 1, 2);

    // The mempool tolerates the gap.
    let pool = h.mempool();
    pool.add(gap_tx.clone(), MempoolAddReason::New, &h.tip_state())
        .unwrap();
    assert!(pool.contains(&gap_tx.hash));

    // A block including it with no nonce-1 predecessor is rejected.
    let parent = h.genesis_block();
    let block = h.make_block_with_root(
        &parent,
        vec![gap_tx],
        GENESIS_TS + 10_000,
        parent.block.header.header.state_root_hash,
    );
    let err = h
        .engine
        .import_block(block, ConnectedSource::Broadcast, None)
        .unwrap_err();
    match err {
        ChainError::InvalidBlock {
            reason: InvalidBlockReason::InvalidTransaction { reason, .. },
            ..
        } => assert!(matches!(reason, InvalidTxReason::NonceNotNext { stored: 0, got: 2 })),
        other => panic!("unexpected error {other}"),
    }

    // Nothing moved.
    assert_eq!(h.engine.tip().height, 0);
}

// =============================================================================
// SCENARIO: replace-by-fee boundary
// =============================================================================

#[test]
fn test_replace_by_fee_exact_boundary() {
    let h = Harness::new();
    let pool = h.mempool();
    let mut sub = h.subscribe();
    let state = h.tip_state();

    let t1 = h.transfer(&h.alice, h.bob.address(), 10, 10, 1);
    let t1_hash = t1.hash;
    pool.add(t1, MempoolAddReason::New, &state).unwrap();

    // 11 == 10 * 1.10 exactly: the bump must be strict, so this loses.
    let t2 = h.transfer(&h.alice, h.bob.address(), 10, 11, 1);
    assert!(pool.add(t2, MempoolAddReason::New, &state).is_err());

    let t2_prime = h.transfer(&h.alice, h.bob.address(), 10, 12, 1);
    let t2_hash = t2_prime.hash;
    pool.add(t2_prime, MempoolAddReason::New, &state).unwrap();

    assert!(!pool.contains(&t1_hash));
    assert!(pool.contains(&t2_hash));

    // Event order: add(t1), remove(t1, RBF), add(t2').
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
    match sub.try_recv().unwrap() {
        ChainEvent::MempoolTxAdded { tx, reason } => {
            assert_eq!(tx.hash, t2_hash);
            assert_eq!(reason, MempoolAddReason::New);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// =============================================================================
// SCENARIO: depth-2 reorg with event ordering and exact reversal
// =============================================================================

#[test]
fn test_depth_two_reorg() {
    let h = Harness::new();
    let genesis = h.genesis_block();

    // Old chain: G - X1 - X2, X1 carrying a transfer that must revert.
    let x_tx = h.transfer(&h.alice, h.bob.address(), 100, 2, 1);
    let x_tx_clone = x_tx.clone();
    let x1 = h.make_block(&genesis, vec![x_tx], GENESIS_TS + 10_000);
    h.engine
        .import_block(x1.clone(), ConnectedSource::Miner, None)
        .unwrap();
    let x1_stored = h.store.expect_block(&x1.hash()).unwrap();
    let x2 = h.make_block(&x1_stored, vec![], GENESIS_TS + 20_000);
    h.engine
        .import_block(x2.clone(), ConnectedSource::Miner, None)
        .unwrap();

    assert_eq!(h.balance(h.bob.address()), U256::from(100u64));

    // Competing chain: G - Y1 - Y2 - Y3, empty blocks, slightly slower so
    // every step until Y3 stays a side chain.
    let mut sub = h.subscribe();
    let y1 = h.make_block(&genesis, vec![], GENESIS_TS + 12_000);
    assert_eq!(
        h.engine
            .import_block(y1.clone(), ConnectedSource::Broadcast, None)
            .unwrap(),
        ImportOutcome::SideChain
    );
    let y1_stored = h.store.expect_block(&y1.hash()).unwrap();
    let y2 = h.make_block(&y1_stored, vec![], GENESIS_TS + 24_000);
    assert_eq!(
        h.engine
            .import_block(y2.clone(), ConnectedSource::Broadcast, None)
            .unwrap(),
        ImportOutcome::SideChain
    );
    let y2_stored = h.store.expect_block(&y2.hash()).unwrap();
    let y3 = h.make_block(&y2_stored, vec![], GENESIS_TS + 30_000);
    let outcome = h
        .engine
        .import_block(y3.clone(), ConnectedSource::Broadcast, None)
        .unwrap();
    assert_eq!(
        outcome,
        ImportOutcome::Reorged {
            disconnected: 2,
            connected: 3
        }
    );

    // Chain indices point at the new chain.
    assert_eq!(h.store.main_chain_hash(1).unwrap(), Some(y1.hash()));
    assert_eq!(h.store.main_chain_hash(2).unwrap(), Some(y2.hash()));
    assert_eq!(h.store.main_chain_hash(3).unwrap(), Some(y3.hash()));
    assert_eq!(h.engine.tip().hash, y3.hash());

    // The transfer from X1 is fully reversed at the new tip.
    assert_eq!(h.balance(h.bob.address()), U256::zero());
    assert_eq!(h.balance(h.alice.address()), U256::from(1_000u64));
    assert_eq!(
        h.tip_state().get_nonce(&h.alice.address()).unwrap().nonce,
        0
    );

    // Event order: disconnect X2 then X1, connect Y1 Y2 Y3, then the
    // reorg marker with old and new tips.
    match sub.try_recv().unwrap() {
        ChainEvent::BlockDisconnected { block } => assert_eq!(block.hash(), x2.hash()),
        other => panic!("expected disconnect of X2, got {other:?}"),
    }
    match sub.try_recv().unwrap() {
        ChainEvent::BlockDisconnected { block } => assert_eq!(block.hash(), x1.hash()),
        other => panic!("expected disconnect of X1, got {other:?}"),
    }
    for expected in [y1.hash(), y2.hash(), y3.hash()] {
        match sub.try_recv().unwrap() {
            ChainEvent::BlockConnected { block, source, .. } => {
                assert_eq!(block.hash(), expected);
                assert_eq!(source, ConnectedSource::Reorg);
            }
            other => panic!("expected connect, got {other:?}"),
        }
    }
    match sub.try_recv().unwrap() {
        ChainEvent::Reorg {
            old_tip,
            old_height,
            new_tip,
            new_height,
        } => {
            assert_eq!(old_tip, x2.hash());
            assert_eq!(old_height, 2);
            assert_eq!(new_tip, y3.hash());
            assert_eq!(new_height, 3);
        }
        other => panic!("expected reorg marker, got {other:?}"),
    }

    // The disconnected transfer is still valid under the new tip and can
    // return to the mempool.
    let pool = h.mempool();
    pool.add(x_tx_clone.clone(), MempoolAddReason::Reorg, &h.tip_state())
        .unwrap();
    assert!(pool.contains(&x_tx_clone.hash));
}

// =============================================================================
// SCENARIO: proposal approval creates a token
// =============================================================================

#[test]
fn test_bip_approval_executes_token_create() {
    let h = Harness::new();
    let genesis = h.genesis_block();

    let create = h.bip_create(
        &h.authorities[0],
        BipAction::TokenCreate {
            name: "EMBER".to_string(),
            smallest_unit_name: "SPARK".to_string(),
            decimals: 8,
            initial_supply: U256::from(1_000_000u64),
            max_supply: Some(U256::from(21_000_000u64)),
            user_burnable: true,
            website_url: None,
            whitepaper_url: None,
        },
        1,
    );
    let proposal_hash = create.hash;

    let b1 = h.make_block(&genesis, vec![create], GENESIS_TS + 10_000);
    h.engine
        .import_block(b1.clone(), ConnectedSource::Miner, None)
        .unwrap();

    // Three authorities at the default threshold need two approvals; the
    // authoring authority supplied the first.
    let state = h.tip_state();
    let bip = state.get_bip(&proposal_hash).unwrap().unwrap();
    assert_eq!(bip.status, BipStatus::Pending);
    assert_eq!(bip.number_of_required_votes, 2);
    assert_eq!(bip.approvers.len(), 1);
    assert!(!bip.is_action_executed);

    // The second approval lands in the next block and executes the
    // action.
    let vote = h.bip_vote(&h.authorities[1], proposal_hash, true, 1);
    let b1_stored = h.store.expect_block(&b1.hash()).unwrap();
    let b2 = h.make_block(&b1_stored, vec![vote], GENESIS_TS + 20_000);
    h.engine
        .import_block(b2.clone(), ConnectedSource::Miner, None)
        .unwrap();

    let state = h.tip_state();
    let bip = state.get_bip(&proposal_hash).unwrap().unwrap();
    assert_eq!(bip.status, BipStatus::Approved);
    assert!(bip.is_action_executed);

    let token_addr = derive_token_address(&proposal_hash);
    assert_eq!(bip.derived_token_address, Some(token_addr));
    let token = state.get_token(&token_addr).unwrap().unwrap();
    assert_eq!(token.name, "EMBER");
    assert_eq!(token.total_supply, U256::from(1_000_000u64));

    // Initial supply was minted to the proposer.
    assert_eq!(
        state
            .get_balance(&h.authorities[0].address(), &token_addr)
            .unwrap()
            .balance,
        U256::from(1_000_000u64)
    );

    // The connected block recorded the status flip.
    let stored = h.store.expect_block(&b2.hash()).unwrap();
    assert!(stored.events.iter().any(|e| matches!(
        e,
        BlockEvent::BipStateChanged {
            bip_hash,
            old_status: Some(BipStatus::Pending),
            new_status: BipStatus::Approved,
        } if *bip_hash == proposal_hash
    )));
    assert!(stored
        .events
        .iter()
        .any(|e| matches!(e, BlockEvent::TokenCreated { token } if *token == token_addr)));
}

// =============================================================================
// SCENARIO: a bad block leaves no trace
// =============================================================================

#[test]
fn test_bad_state_root_is_atomic() {
    let h = Harness::new();
    let genesis = h.genesis_block();
    let tip_before = h.engine.tip();

    let tx = h.transfer(&h.alice, h.bob.address(), 250, 3, 1);
    let block = h.make_block_with_root(
        &genesis,
        vec![tx.clone()],
        GENESIS_TS + 10_000,
        Hash([0xAB; 32]),
    );
    let block_hash = block.hash();
    let err = h
        .engine
        .import_block(block, ConnectedSource::Broadcast, None)
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::InvalidBlock {
            reason: InvalidBlockReason::BadStateRoot { .. },
            ..
        }
    ));

    // Tip, balances, and indices are exactly as before.
    assert_eq!(h.engine.tip().hash, tip_before.hash);
    assert_eq!(h.balance(h.alice.address()), U256::from(1_000u64));
    assert!(h.store.stored_block(&block_hash).unwrap().is_none());
    assert!(h.store.tx_location(&tx.hash).unwrap().is_none());
}

// =============================================================================
// SCENARIO: wrong difficulty is a consensus rejection
// =============================================================================

#[test]
fn test_wrong_difficulty_rejected() {
    let h = Harness::new();
    let genesis = h.genesis_block();

    let mut block = h.make_block(&genesis, vec![], GENESIS_TS + 10_000);
    // Re-sign with a tampered target so only the difficulty is wrong.
    let mut header = block.header.header.clone();
    header.difficulty = header.difficulty >> 1;
    block.header = sign_and_seal_header(header, &h.miner).unwrap();

    let err = h
        .engine
        .import_block(block, ConnectedSource::Broadcast, None)
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::InvalidBlock {
            reason: InvalidBlockReason::BadDifficulty { .. },
            ..
        }
    ));
}
