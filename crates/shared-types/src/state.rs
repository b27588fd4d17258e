//! # World-State Entities
//!
//! The consensus-bearing state cells and the diff records kept for every
//! cell a block mutates.
//!
//! ## Lifecycle
//!
//! Entities are created by applying a block and mutated only by applying a
//! later block. They revert only during a reorg disconnect, driven by the
//! persistent trie (the old root survives) plus the per-block undo log for
//! the enumeration mirrors.

use std::collections::HashMap;

use crate::primitives::{Address, Hash, U256};
use crate::transaction::{BipAction, BipType};

/// Current encoding version written for state entities.
pub const STATE_ENTITY_VERSION: u16 = 1;

/// Balance of one `(account, token)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalanceState {
    pub balance: U256,
    pub updated_at_height: u64,
    pub updated_at_timestamp: u64,
    pub version: u16,
    /// False only for the sentinel returned on a miss; never persisted.
    exists: bool,
}

impl AccountBalanceState {
    #[must_use]
    pub fn new(balance: U256, height: u64, timestamp: u64) -> Self {
        Self {
            balance,
            updated_at_height: height,
            updated_at_timestamp: timestamp,
            version: STATE_ENTITY_VERSION,
            exists: true,
        }
    }

    /// Zero-balance sentinel for an account that has never held this token.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            balance: U256::zero(),
            updated_at_height: 0,
            updated_at_timestamp: 0,
            version: STATE_ENTITY_VERSION,
            exists: false,
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }
}

/// Per-account transaction counter.
///
/// The next accepted nonce for a sender is always `nonce + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNonceState {
    pub nonce: u64,
    pub updated_at_height: u64,
    pub updated_at_timestamp: u64,
    pub version: u16,
    exists: bool,
}

impl AccountNonceState {
    #[must_use]
    pub fn new(nonce: u64, height: u64, timestamp: u64) -> Self {
        Self {
            nonce,
            updated_at_height: height,
            updated_at_timestamp: timestamp,
            version: STATE_ENTITY_VERSION,
            exists: true,
        }
    }

    /// Nonce sentinel for a fresh account; the first valid nonce is 1.
    #[must_use]
    pub fn absent() -> Self {
        Self {
            nonce: 0,
            updated_at_height: 0,
            updated_at_timestamp: 0,
            version: STATE_ENTITY_VERSION,
            exists: false,
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }
}

/// A token registered through governance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    pub name: String,
    pub smallest_unit_name: String,
    pub decimals: u8,
    pub total_supply: U256,
    pub max_supply: Option<U256>,
    pub user_burnable: bool,
    pub website_url: Option<String>,
    pub whitepaper_url: Option<String>,
    /// Hash of the proposal transaction that created the token.
    pub origin_tx_hash: Hash,
    pub created_at_timestamp: u64,
    pub updated_at_height: u64,
    pub updated_at_timestamp: u64,
    pub version: u16,
}

/// Membership marker for the authority set that governs proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityState {
    pub origin_tx_hash: Hash,
    pub created_at_height: u64,
    pub created_at_timestamp: u64,
    pub version: u16,
}

/// Membership marker for the validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorState {
    pub origin_tx_hash: Hash,
    pub created_at_height: u64,
    pub created_at_timestamp: u64,
    pub version: u16,
}

/// A human-readable name bound to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAliasState {
    pub address: Address,
    pub origin_tx_hash: Hash,
    pub created_at_height: u64,
    pub created_at_timestamp: u64,
    pub version: u16,
}

/// Proposal voting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BipStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl BipStatus {
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            BipStatus::Pending => 0,
            BipStatus::Approved => 1,
            BipStatus::Rejected => 2,
            BipStatus::Expired => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<BipStatus> {
        match code {
            0 => Some(BipStatus::Pending),
            1 => Some(BipStatus::Approved),
            2 => Some(BipStatus::Rejected),
            3 => Some(BipStatus::Expired),
            _ => None,
        }
    }
}

/// State of one governance proposal, keyed by the hash of the transaction
/// that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BipState {
    pub bip_type: BipType,
    pub status: BipStatus,
    pub is_action_executed: bool,
    /// Sender of the proposal transaction; receives minted supply for
    /// `TokenCreate` actions.
    pub proposer: Address,
    /// Voting order is preserved for deterministic re-encoding.
    pub approvers: Vec<Address>,
    pub disapprovers: Vec<Address>,
    pub number_of_required_votes: u32,
    pub expiration_timestamp: u64,
    /// Version of the proposal transaction, kept for re-validation.
    pub tx_version: u16,
    pub action: BipAction,
    /// Token address derived deterministically for `TokenCreate` actions.
    pub derived_token_address: Option<Address>,
    pub executed_at_timestamp: Option<u64>,
    pub origin_tx_hash: Hash,
    pub updated_by_tx_hash: Hash,
    pub updated_at_height: u64,
    pub updated_at_timestamp: u64,
    pub version: u16,
}

impl BipState {
    /// True when a vote from `address` was already counted either way.
    #[must_use]
    pub fn has_voted(&self, address: &Address) -> bool {
        self.approvers.contains(address) || self.disapprovers.contains(address)
    }

    #[must_use]
    pub fn is_expired_at(&self, timestamp: u64) -> bool {
        timestamp >= self.expiration_timestamp
    }
}

/// The single-valued consensus parameter cell.
///
/// Changes only through an approved `NetworkParamsSet` proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParamsState {
    pub block_reward: U256,
    pub block_reward_pool_address: Address,
    /// At least 5000 ms.
    pub target_mining_time_ms: u64,
    /// At least 1.
    pub asert_half_life_blocks: u64,
    pub asert_anchor_height: u64,
    pub min_difficulty: U256,
    pub min_tx_base_fee: u64,
    pub min_tx_byte_fee: u64,
    pub current_authority_count: u32,
    pub updated_by_tx_hash: Hash,
    pub updated_at_height: u64,
    pub updated_at_timestamp: u64,
    pub version: u16,
}

impl NetworkParamsState {
    /// Network minimum fee for a transaction of `size` bytes.
    #[must_use]
    pub fn min_fee_for_size(&self, size: u32) -> u64 {
        self.min_tx_base_fee
            .saturating_add(self.min_tx_byte_fee.saturating_mul(u64::from(size)))
    }
}

/// Old and new value of one state cell mutated by a block.
///
/// `old == None` records a creation, `new == None` a deletion. Exact
/// reverts replay `old` over `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDiff<T> {
    pub old: Option<T>,
    pub new: Option<T>,
}

impl<T> StateDiff<T> {
    #[must_use]
    pub fn new(old: Option<T>, new: Option<T>) -> Self {
        Self { old, new }
    }

    #[must_use]
    pub fn is_creation(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }
}

/// Every diff collected while applying one block.
///
/// Feeds event extraction, the entity undo log, and bus subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStateDiffs {
    pub balances: HashMap<(Address, Address), StateDiff<AccountBalanceState>>,
    pub nonces: HashMap<Address, StateDiff<AccountNonceState>>,
    pub tokens: HashMap<Address, StateDiff<TokenState>>,
    pub authorities: HashMap<Address, StateDiff<AuthorityState>>,
    pub validators: HashMap<Address, StateDiff<ValidatorState>>,
    pub aliases: HashMap<String, StateDiff<AddressAliasState>>,
    pub bips: HashMap<Hash, StateDiff<BipState>>,
    pub params: Option<StateDiff<NetworkParamsState>>,
}

impl BlockStateDiffs {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.nonces.is_empty()
            && self.tokens.is_empty()
            && self.authorities.is_empty()
            && self.validators.is_empty()
            && self.aliases.is_empty()
            && self.bips.is_empty()
            && self.params.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_sentinels() {
        let balance = AccountBalanceState::absent();
        assert!(!balance.exists());
        assert!(balance.balance.is_zero());

        let nonce = AccountNonceState::absent();
        assert!(!nonce.exists());
        assert_eq!(nonce.nonce, 0);
    }

    #[test]
    fn test_bip_status_codes_roundtrip() {
        for s in [
            BipStatus::Pending,
            BipStatus::Approved,
            BipStatus::Rejected,
            BipStatus::Expired,
        ] {
            assert_eq!(BipStatus::from_code(s.code()), Some(s));
        }
    }

    #[test]
    fn test_diff_classification() {
        let creation: StateDiff<u32> = StateDiff::new(None, Some(1));
        assert!(creation.is_creation());
        let deletion: StateDiff<u32> = StateDiff::new(Some(1), None);
        assert!(deletion.is_deletion());
    }

    #[test]
    fn test_min_fee_for_size() {
        let params = NetworkParamsState {
            block_reward: U256::from(50),
            block_reward_pool_address: Address::ZERO,
            target_mining_time_ms: 10_000,
            asert_half_life_blocks: 144,
            asert_anchor_height: 0,
            min_difficulty: U256::one(),
            min_tx_base_fee: 10,
            min_tx_byte_fee: 2,
            current_authority_count: 0,
            updated_by_tx_hash: Hash::ZERO,
            updated_at_height: 0,
            updated_at_timestamp: 0,
            version: STATE_ENTITY_VERSION,
        };
        assert_eq!(params.min_fee_for_size(100), 210);
    }
}
