//! # World State
//!
//! A logical view over the trie rooted at a known state root, plus the
//! per-block mutation buffers. Reads overlay the dirty maps on the trie;
//! mutations touch only the buffers until [`WorldState::calculate_root_hash`]
//! stages them into trie nodes, and nothing becomes durable before
//! [`WorldState::persist_to_batch`] hands the staged nodes to an atomic
//! batch.
//!
//! ## Diff tracking
//!
//! Validation states track diffs eagerly: the previous value of every
//! touched cell is captured on first touch. Mining states defer the
//! previous-value reads until [`WorldState::collect_diffs`], because most
//! candidate blocks are discarded and their diffs never needed. Both
//! modes produce identical diffs for the same mutations.

use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{
    AccountBalanceState, AccountNonceState, Address, AddressAliasState, AuthorityState,
    BipState, BlockStateDiffs, Hash, NetworkParamsState, StateDiff, TokenState, ValidatorState,
    U256,
};

use crate::error::StateError;
use crate::keys;
use crate::store::{NodeSink, StagedNodeStore, TrieNodeStore};
use crate::trie::MerkleTrie;

/// How state diffs are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffTracking {
    /// Capture previous values on first touch. Used for validation.
    Eager,
    /// Read previous values only when diffs are requested. Used for
    /// mining candidates, which are usually thrown away.
    Lazy,
}

/// Height and timestamp stamped onto every mutated entity.
#[derive(Debug, Clone, Copy, Default)]
struct BlockContext {
    height: u64,
    timestamp: u64,
}

/// The mutable world state for one block application.
pub struct WorldState {
    trie: MerkleTrie,
    base_root: Hash,
    mode: DiffTracking,
    ctx: BlockContext,

    dirty_balances: HashMap<(Address, Address), AccountBalanceState>,
    dirty_nonces: HashMap<Address, AccountNonceState>,
    dirty_tokens: HashMap<Address, TokenState>,
    dirty_authorities: HashMap<Address, Option<AuthorityState>>,
    dirty_validators: HashMap<Address, Option<ValidatorState>>,
    dirty_aliases: HashMap<String, Option<AddressAliasState>>,
    dirty_bips: HashMap<Hash, BipState>,
    dirty_params: Option<NetworkParamsState>,

    /// Eagerly collected diffs; empty in lazy mode.
    diffs: BlockStateDiffs,
}

impl WorldState {
    /// State for validating a block, positioned at a committed root.
    #[must_use]
    pub fn create_for_validation(shared: Arc<TrieNodeStore>, root: Hash) -> Self {
        Self::new(shared, root, DiffTracking::Eager)
    }

    /// State for assembling a mining candidate.
    #[must_use]
    pub fn create_for_mining(shared: Arc<TrieNodeStore>, root: Hash) -> Self {
        Self::new(shared, root, DiffTracking::Lazy)
    }

    fn new(shared: Arc<TrieNodeStore>, root: Hash, mode: DiffTracking) -> Self {
        Self {
            trie: MerkleTrie::new(StagedNodeStore::new(shared), root),
            base_root: root,
            mode,
            ctx: BlockContext::default(),
            dirty_balances: HashMap::new(),
            dirty_nonces: HashMap::new(),
            dirty_tokens: HashMap::new(),
            dirty_authorities: HashMap::new(),
            dirty_validators: HashMap::new(),
            dirty_aliases: HashMap::new(),
            dirty_bips: HashMap::new(),
            dirty_params: None,
            diffs: BlockStateDiffs::default(),
        }
    }

    /// Stamp the block position onto subsequent mutations.
    pub fn begin_block(&mut self, height: u64, timestamp: u64) {
        self.ctx = BlockContext { height, timestamp };
    }

    /// The root this state was positioned at.
    #[must_use]
    pub fn base_root(&self) -> Hash {
        self.base_root
    }

    /// The last calculated root, equal to `base_root` until
    /// [`Self::calculate_root_hash`] runs.
    #[must_use]
    pub fn current_root(&self) -> Hash {
        self.trie.root()
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn get_balance(
        &self,
        address: &Address,
        token: &Address,
    ) -> Result<AccountBalanceState, StateError> {
        if let Some(state) = self.dirty_balances.get(&(*address, *token)) {
            return Ok(state.clone());
        }
        Ok(self
            .read_entity::<AccountBalanceState>(&keys::balance_key(address, token))?
            .unwrap_or_else(AccountBalanceState::absent))
    }

    pub fn get_nonce(&self, address: &Address) -> Result<AccountNonceState, StateError> {
        if let Some(state) = self.dirty_nonces.get(address) {
            return Ok(state.clone());
        }
        Ok(self
            .read_entity::<AccountNonceState>(&keys::nonce_key(address))?
            .unwrap_or_else(AccountNonceState::absent))
    }

    pub fn get_token(&self, token: &Address) -> Result<Option<TokenState>, StateError> {
        if let Some(state) = self.dirty_tokens.get(token) {
            return Ok(Some(state.clone()));
        }
        self.read_entity(&keys::token_key(token))
    }

    pub fn get_authority(
        &self,
        address: &Address,
    ) -> Result<Option<AuthorityState>, StateError> {
        if let Some(slot) = self.dirty_authorities.get(address) {
            return Ok(slot.clone());
        }
        self.read_entity(&keys::authority_key(address))
    }

    pub fn is_authority(&self, address: &Address) -> Result<bool, StateError> {
        Ok(self.get_authority(address)?.is_some())
    }

    pub fn get_validator(
        &self,
        address: &Address,
    ) -> Result<Option<ValidatorState>, StateError> {
        if let Some(slot) = self.dirty_validators.get(address) {
            return Ok(slot.clone());
        }
        self.read_entity(&keys::validator_key(address))
    }

    pub fn get_alias(&self, alias: &str) -> Result<Option<AddressAliasState>, StateError> {
        if let Some(slot) = self.dirty_aliases.get(alias) {
            return Ok(slot.clone());
        }
        self.read_entity(&keys::alias_key(alias))
    }

    pub fn get_bip(&self, origin: &Hash) -> Result<Option<BipState>, StateError> {
        if let Some(state) = self.dirty_bips.get(origin) {
            return Ok(Some(state.clone()));
        }
        self.read_entity(&keys::bip_key(origin))
    }

    /// The params cell. Written at genesis; a miss means this root does
    /// not belong to an initialized chain.
    pub fn params(&self) -> Result<NetworkParamsState, StateError> {
        if let Some(params) = &self.dirty_params {
            return Ok(params.clone());
        }
        self.read_entity(&keys::params_key())?
            .ok_or(StateError::MissingParams)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Add `amount` of `token` to `address`.
    pub fn credit(
        &mut self,
        address: &Address,
        token: &Address,
        amount: U256,
    ) -> Result<(), StateError> {
        let current = self.get_balance(address, token)?;
        let balance = current
            .balance
            .checked_add(amount)
            .ok_or_else(|| StateError::Backend(format!("balance overflow for {address}")))?;
        self.write_balance(*address, *token, balance)
    }

    /// Remove `amount` of `token` from `address`; fails short of funds.
    pub fn debit(
        &mut self,
        address: &Address,
        token: &Address,
        amount: U256,
    ) -> Result<(), StateError> {
        let current = self.get_balance(address, token)?;
        if current.balance < amount {
            return Err(StateError::InsufficientBalance {
                address: *address,
                token: *token,
                balance: current.balance,
                required: amount,
            });
        }
        self.write_balance(*address, *token, current.balance - amount)
    }

    fn write_balance(
        &mut self,
        address: Address,
        token: Address,
        balance: U256,
    ) -> Result<(), StateError> {
        let new = AccountBalanceState::new(balance, self.ctx.height, self.ctx.timestamp);
        if self.mode == DiffTracking::Eager {
            if !self.diffs.balances.contains_key(&(address, token)) {
                let old = self.read_entity(&keys::balance_key(&address, &token))?;
                self.diffs
                    .balances
                    .insert((address, token), StateDiff::new(old, Some(new.clone())));
            } else if let Some(diff) = self.diffs.balances.get_mut(&(address, token)) {
                diff.new = Some(new.clone());
            }
        }
        self.dirty_balances.insert((address, token), new);
        Ok(())
    }

    /// Advance a sender's nonce. The accepted-transaction path only ever
    /// moves it forward by exactly one.
    pub fn set_nonce(&mut self, address: &Address, new_nonce: u64) -> Result<(), StateError> {
        let current = self.get_nonce(address)?;
        if new_nonce != current.nonce + 1 {
            return Err(StateError::NonceNotSequential {
                address: *address,
                current: current.nonce,
                attempted: new_nonce,
            });
        }
        let new = AccountNonceState::new(new_nonce, self.ctx.height, self.ctx.timestamp);
        if self.mode == DiffTracking::Eager {
            if !self.diffs.nonces.contains_key(address) {
                let old = self.read_entity(&keys::nonce_key(address))?;
                self.diffs
                    .nonces
                    .insert(*address, StateDiff::new(old, Some(new.clone())));
            } else if let Some(diff) = self.diffs.nonces.get_mut(address) {
                diff.new = Some(new.clone());
            }
        }
        self.dirty_nonces.insert(*address, new);
        Ok(())
    }

    pub fn put_token(&mut self, token: Address, state: TokenState) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager {
            if !self.diffs.tokens.contains_key(&token) {
                let old = self.read_entity(&keys::token_key(&token))?;
                self.diffs
                    .tokens
                    .insert(token, StateDiff::new(old, Some(state.clone())));
            } else if let Some(diff) = self.diffs.tokens.get_mut(&token) {
                diff.new = Some(state.clone());
            }
        }
        self.dirty_tokens.insert(token, state);
        Ok(())
    }

    pub fn put_authority(
        &mut self,
        address: Address,
        state: AuthorityState,
    ) -> Result<(), StateError> {
        self.write_authority(address, Some(state))
    }

    pub fn remove_authority(&mut self, address: &Address) -> Result<(), StateError> {
        self.write_authority(*address, None)
    }

    fn write_authority(
        &mut self,
        address: Address,
        slot: Option<AuthorityState>,
    ) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager {
            if !self.diffs.authorities.contains_key(&address) {
                let old = self.read_entity(&keys::authority_key(&address))?;
                self.diffs
                    .authorities
                    .insert(address, StateDiff::new(old, slot.clone()));
            } else if let Some(diff) = self.diffs.authorities.get_mut(&address) {
                diff.new = slot.clone();
            }
        }
        self.dirty_authorities.insert(address, slot);
        Ok(())
    }

    pub fn put_validator(
        &mut self,
        address: Address,
        state: ValidatorState,
    ) -> Result<(), StateError> {
        self.write_validator(address, Some(state))
    }

    pub fn remove_validator(&mut self, address: &Address) -> Result<(), StateError> {
        self.write_validator(*address, None)
    }

    fn write_validator(
        &mut self,
        address: Address,
        slot: Option<ValidatorState>,
    ) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager {
            if !self.diffs.validators.contains_key(&address) {
                let old = self.read_entity(&keys::validator_key(&address))?;
                self.diffs
                    .validators
                    .insert(address, StateDiff::new(old, slot.clone()));
            } else if let Some(diff) = self.diffs.validators.get_mut(&address) {
                diff.new = slot.clone();
            }
        }
        self.dirty_validators.insert(address, slot);
        Ok(())
    }

    pub fn put_alias(
        &mut self,
        alias: String,
        state: AddressAliasState,
    ) -> Result<(), StateError> {
        self.write_alias(alias, Some(state))
    }

    pub fn remove_alias(&mut self, alias: &str) -> Result<(), StateError> {
        self.write_alias(alias.to_string(), None)
    }

    fn write_alias(
        &mut self,
        alias: String,
        slot: Option<AddressAliasState>,
    ) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager {
            if !self.diffs.aliases.contains_key(&alias) {
                let old = self.read_entity(&keys::alias_key(&alias))?;
                self.diffs
                    .aliases
                    .insert(alias.clone(), StateDiff::new(old, slot.clone()));
            } else if let Some(diff) = self.diffs.aliases.get_mut(&alias) {
                diff.new = slot.clone();
            }
        }
        self.dirty_aliases.insert(alias, slot);
        Ok(())
    }

    pub fn put_bip(&mut self, origin: Hash, state: BipState) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager {
            if !self.diffs.bips.contains_key(&origin) {
                let old = self.read_entity(&keys::bip_key(&origin))?;
                self.diffs
                    .bips
                    .insert(origin, StateDiff::new(old, Some(state.clone())));
            } else if let Some(diff) = self.diffs.bips.get_mut(&origin) {
                diff.new = Some(state.clone());
            }
        }
        self.dirty_bips.insert(origin, state);
        Ok(())
    }

    pub fn set_params(&mut self, params: NetworkParamsState) -> Result<(), StateError> {
        if self.mode == DiffTracking::Eager && self.diffs.params.is_none() {
            let old = self.read_entity(&keys::params_key())?;
            self.diffs.params = Some(StateDiff::new(old, Some(params.clone())));
        } else if let Some(diff) = &mut self.diffs.params {
            diff.new = Some(params.clone());
        }
        self.dirty_params = Some(params);
        Ok(())
    }

    // =========================================================================
    // ROOT, DIFFS, PERSISTENCE
    // =========================================================================

    /// Stage every buffered mutation into trie nodes and return the new
    /// root. Deterministic: the same buffers always produce the same root.
    pub fn calculate_root_hash(&mut self) -> Result<Hash, StateError> {
        let balances: Vec<_> = self
            .dirty_balances
            .iter()
            .map(|((a, t), v)| (keys::balance_key(a, t), ember_codec::encode(v)))
            .collect();
        let nonces: Vec<_> = self
            .dirty_nonces
            .iter()
            .map(|(a, v)| (keys::nonce_key(a), ember_codec::encode(v)))
            .collect();
        let tokens: Vec<_> = self
            .dirty_tokens
            .iter()
            .map(|(a, v)| (keys::token_key(a), ember_codec::encode(v)))
            .collect();
        let bips: Vec<_> = self
            .dirty_bips
            .iter()
            .map(|(h, v)| (keys::bip_key(h), ember_codec::encode(v)))
            .collect();

        for (key, bytes) in balances
            .into_iter()
            .chain(nonces)
            .chain(tokens)
            .chain(bips)
        {
            self.trie.insert(&key, bytes)?;
        }

        let authorities: Vec<_> = self
            .dirty_authorities
            .iter()
            .map(|(a, slot)| (keys::authority_key(a), slot.as_ref().map(ember_codec::encode)))
            .collect();
        let validators: Vec<_> = self
            .dirty_validators
            .iter()
            .map(|(a, slot)| (keys::validator_key(a), slot.as_ref().map(ember_codec::encode)))
            .collect();
        let aliases: Vec<_> = self
            .dirty_aliases
            .iter()
            .map(|(a, slot)| (keys::alias_key(a), slot.as_ref().map(ember_codec::encode)))
            .collect();

        for (key, slot) in authorities.into_iter().chain(validators).chain(aliases) {
            match slot {
                Some(bytes) => self.trie.insert(&key, bytes)?,
                None => self.trie.remove(&key)?,
            }
        }

        if let Some(params) = &self.dirty_params {
            let bytes = ember_codec::encode(params);
            self.trie.insert(&keys::params_key(), bytes)?;
        }

        Ok(self.trie.root())
    }

    /// The old/new pair for every cell this block touched.
    pub fn collect_diffs(&self) -> Result<BlockStateDiffs, StateError> {
        match self.mode {
            DiffTracking::Eager => Ok(self.diffs.clone()),
            DiffTracking::Lazy => self.build_diffs_from_buffers(),
        }
    }

    fn build_diffs_from_buffers(&self) -> Result<BlockStateDiffs, StateError> {
        let mut diffs = BlockStateDiffs::default();
        for ((address, token), new) in &self.dirty_balances {
            let old = self.read_entity(&keys::balance_key(address, token))?;
            diffs
                .balances
                .insert((*address, *token), StateDiff::new(old, Some(new.clone())));
        }
        for (address, new) in &self.dirty_nonces {
            let old = self.read_entity(&keys::nonce_key(address))?;
            diffs
                .nonces
                .insert(*address, StateDiff::new(old, Some(new.clone())));
        }
        for (token, new) in &self.dirty_tokens {
            let old = self.read_entity(&keys::token_key(token))?;
            diffs
                .tokens
                .insert(*token, StateDiff::new(old, Some(new.clone())));
        }
        for (address, slot) in &self.dirty_authorities {
            let old = self.read_entity(&keys::authority_key(address))?;
            diffs
                .authorities
                .insert(*address, StateDiff::new(old, slot.clone()));
        }
        for (address, slot) in &self.dirty_validators {
            let old = self.read_entity(&keys::validator_key(address))?;
            diffs
                .validators
                .insert(*address, StateDiff::new(old, slot.clone()));
        }
        for (alias, slot) in &self.dirty_aliases {
            let old = self.read_entity(&keys::alias_key(alias))?;
            diffs
                .aliases
                .insert(alias.clone(), StateDiff::new(old, slot.clone()));
        }
        for (origin, new) in &self.dirty_bips {
            let old = self.read_entity(&keys::bip_key(origin))?;
            diffs
                .bips
                .insert(*origin, StateDiff::new(old, Some(new.clone())));
        }
        if let Some(params) = &self.dirty_params {
            let old = self.read_entity(&keys::params_key())?;
            diffs.params = Some(StateDiff::new(old, Some(params.clone())));
        }
        Ok(diffs)
    }

    /// Flush staged trie nodes into the caller's atomic batch.
    pub fn persist_to_batch(&mut self, batch: &mut dyn NodeSink) {
        self.trie.store_mut().commit_to_batch(batch);
    }

    /// Drop every staged write and buffer; the state is back at its base
    /// root as if nothing happened.
    pub fn rollback(&mut self) {
        self.trie.store_mut().rollback();
        self.trie.reset_root(self.base_root);
        self.clear_buffers();
    }

    /// Reset buffers for the next block in a chain of applications; the
    /// calculated root becomes the new base.
    pub fn prepare_for_next_block(&mut self) {
        self.base_root = self.trie.root();
        self.clear_buffers();
    }

    fn clear_buffers(&mut self) {
        self.dirty_balances.clear();
        self.dirty_nonces.clear();
        self.dirty_tokens.clear();
        self.dirty_authorities.clear();
        self.dirty_validators.clear();
        self.dirty_aliases.clear();
        self.dirty_bips.clear();
        self.dirty_params = None;
        self.diffs = BlockStateDiffs::default();
    }

    /// Committed read: the trie value at the base root, before this
    /// block's buffers.
    fn read_entity<T: ember_codec::FromValue>(
        &self,
        key: &[u8],
    ) -> Result<Option<T>, StateError> {
        match self.trie.get_at(self.base_root, key)? {
            Some(bytes) => Ok(Some(ember_codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTrieBackend, TrieBackend};
    use crate::trie::EMPTY_ROOT;

    fn fresh_state(mode: DiffTracking) -> WorldState {
        let backend = Arc::new(MemoryTrieBackend::new()) as Arc<dyn TrieBackend>;
        let shared = Arc::new(TrieNodeStore::new(backend));
        let mut state = match mode {
            DiffTracking::Eager => WorldState::create_for_validation(shared, EMPTY_ROOT),
            DiffTracking::Lazy => WorldState::create_for_mining(shared, EMPTY_ROOT),
        };
        state.begin_block(1, 1_700_000_000_000);
        state
    }

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[test]
    fn test_absent_balance_is_zero_sentinel() {
        let state = fresh_state(DiffTracking::Eager);
        let balance = state.get_balance(&addr(1), &Address::NATIVE_TOKEN).unwrap();
        assert!(!balance.exists());
        assert!(balance.balance.is_zero());
    }

    #[test]
    fn test_credit_debit_flow() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(1);
        state.credit(&a, &Address::NATIVE_TOKEN, U256::from(1000u64)).unwrap();
        state.debit(&a, &Address::NATIVE_TOKEN, U256::from(253u64)).unwrap();

        let balance = state.get_balance(&a, &Address::NATIVE_TOKEN).unwrap();
        assert_eq!(balance.balance, U256::from(747u64));
    }

    #[test]
    fn test_debit_past_balance_fails() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(1);
        state.credit(&a, &Address::NATIVE_TOKEN, U256::from(10u64)).unwrap();
        let err = state
            .debit(&a, &Address::NATIVE_TOKEN, U256::from(11u64))
            .unwrap_err();
        assert!(matches!(err, StateError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_nonce_must_advance_by_one() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(1);
        state.set_nonce(&a, 1).unwrap();
        state.set_nonce(&a, 2).unwrap();
        let err = state.set_nonce(&a, 4).unwrap_err();
        assert!(matches!(err, StateError::NonceNotSequential { current: 2, attempted: 4, .. }));
    }

    #[test]
    fn test_root_hash_changes_with_mutations_and_is_idempotent() {
        let mut state = fresh_state(DiffTracking::Eager);
        state.credit(&addr(1), &Address::NATIVE_TOKEN, U256::from(5u64)).unwrap();

        let root_a = state.calculate_root_hash().unwrap();
        let root_b = state.calculate_root_hash().unwrap();
        assert_eq!(root_a, root_b);
        assert_ne!(root_a, EMPTY_ROOT);
    }

    #[test]
    fn test_eager_and_lazy_diffs_agree() {
        let mutate = |state: &mut WorldState| {
            state.credit(&addr(1), &Address::NATIVE_TOKEN, U256::from(9u64)).unwrap();
            state.set_nonce(&addr(1), 1).unwrap();
            state
                .put_authority(
                    addr(2),
                    AuthorityState {
                        origin_tx_hash: Hash([1; 32]),
                        created_at_height: 1,
                        created_at_timestamp: 2,
                        version: 1,
                    },
                )
                .unwrap();
        };

        let mut eager = fresh_state(DiffTracking::Eager);
        mutate(&mut eager);
        let mut lazy = fresh_state(DiffTracking::Lazy);
        mutate(&mut lazy);

        assert_eq!(eager.collect_diffs().unwrap(), lazy.collect_diffs().unwrap());
    }

    #[test]
    fn test_diffs_capture_first_old_value() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(1);
        state.credit(&a, &Address::NATIVE_TOKEN, U256::from(100u64)).unwrap();
        state.debit(&a, &Address::NATIVE_TOKEN, U256::from(40u64)).unwrap();

        let diffs = state.collect_diffs().unwrap();
        let diff = &diffs.balances[&(a, Address::NATIVE_TOKEN)];
        // Old is the pre-block value (absent), new is the final value.
        assert!(diff.old.is_none());
        assert_eq!(diff.new.as_ref().unwrap().balance, U256::from(60u64));
    }

    #[test]
    fn test_authority_remove_roundtrip() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(3);
        state
            .put_authority(
                a,
                AuthorityState {
                    origin_tx_hash: Hash([1; 32]),
                    created_at_height: 1,
                    created_at_timestamp: 2,
                    version: 1,
                },
            )
            .unwrap();
        assert!(state.is_authority(&a).unwrap());
        state.remove_authority(&a).unwrap();
        assert!(!state.is_authority(&a).unwrap());
    }

    #[test]
    fn test_prepare_for_next_block_rebases() {
        let mut state = fresh_state(DiffTracking::Eager);
        let a = addr(1);
        state.credit(&a, &Address::NATIVE_TOKEN, U256::from(100u64)).unwrap();
        let root = state.calculate_root_hash().unwrap();
        state.prepare_for_next_block();

        assert_eq!(state.base_root(), root);
        // The committed value is now visible as the base.
        let balance = state.get_balance(&a, &Address::NATIVE_TOKEN).unwrap();
        assert_eq!(balance.balance, U256::from(100u64));

        // And the next block's diff captures it as the old value.
        state.begin_block(2, 1_700_000_001_000);
        state.credit(&a, &Address::NATIVE_TOKEN, U256::from(1u64)).unwrap();
        let diffs = state.collect_diffs().unwrap();
        let diff = &diffs.balances[&(a, Address::NATIVE_TOKEN)];
        assert_eq!(diff.old.as_ref().unwrap().balance, U256::from(100u64));
    }

    #[test]
    fn test_rollback_discards_everything() {
        let mut state = fresh_state(DiffTracking::Eager);
        state.credit(&addr(1), &Address::NATIVE_TOKEN, U256::from(5u64)).unwrap();
        state.calculate_root_hash().unwrap();
        state.rollback();

        assert_eq!(state.trie.store().pending_len(), 0);
        assert!(state.collect_diffs().unwrap().is_empty());
    }

    #[test]
    fn test_missing_params_is_an_error() {
        let state = fresh_state(DiffTracking::Eager);
        assert!(matches!(state.params(), Err(StateError::MissingParams)));
    }
}
