//! # Transactions
//!
//! The signed transaction record, its typed payloads, and the sealed form
//! carrying derived fields (hash, sender, size).
//!
//! A transaction is immutable once signed. The sender is never a field: it
//! is recovered from the signature over the signing hash, so a transaction
//! cannot be replayed under a different identity.

use crate::primitives::{Address, Hash, Signature, U256};

/// Transaction kinds carried on the wire and in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    /// Move value of one token between two accounts.
    Transfer,
    /// Propose a governance action, voted on by authorities.
    BipCreate,
    /// Approve or disapprove a pending proposal.
    BipVote,
}

impl TxType {
    /// Stable wire code for the canonical encoding.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            TxType::Transfer => 1,
            TxType::BipCreate => 2,
            TxType::BipVote => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<TxType> {
        match code {
            1 => Some(TxType::Transfer),
            2 => Some(TxType::BipCreate),
            3 => Some(TxType::BipVote),
            _ => None,
        }
    }
}

/// Governance actions a proposal can carry.
///
/// On approval the action is executed exactly once inside the block that
/// reached the vote threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BipAction {
    TokenCreate {
        /// Display name, `[A-Z0-9_]{1,16}`, not starting or ending with `_`.
        name: String,
        /// Name of the smallest unit, same character rules as `name`.
        smallest_unit_name: String,
        /// Number of decimal places, 0 to 18.
        decimals: u8,
        /// Supply minted to the proposer on execution.
        initial_supply: U256,
        /// Optional hard cap; minting past it fails.
        max_supply: Option<U256>,
        /// Whether holders may burn their own balance.
        user_burnable: bool,
        website_url: Option<String>,
        whitepaper_url: Option<String>,
    },
    TokenMint {
        token: Address,
        recipient: Address,
        amount: U256,
    },
    TokenBurn {
        token: Address,
        holder: Address,
        amount: U256,
    },
    AuthorityAdd {
        address: Address,
    },
    AuthorityRemove {
        address: Address,
    },
    ValidatorAdd {
        address: Address,
    },
    ValidatorRemove {
        address: Address,
    },
    AliasRegister {
        /// `[a-z0-9_]{1,64}`.
        alias: String,
        address: Address,
    },
    AliasRemove {
        alias: String,
    },
    NetworkParamsSet(NetworkParamsUpdate),
}

impl BipAction {
    #[must_use]
    pub fn bip_type(&self) -> BipType {
        match self {
            BipAction::TokenCreate { .. } => BipType::TokenCreate,
            BipAction::TokenMint { .. } => BipType::TokenMint,
            BipAction::TokenBurn { .. } => BipType::TokenBurn,
            BipAction::AuthorityAdd { .. } => BipType::AuthorityAdd,
            BipAction::AuthorityRemove { .. } => BipType::AuthorityRemove,
            BipAction::ValidatorAdd { .. } => BipType::ValidatorAdd,
            BipAction::ValidatorRemove { .. } => BipType::ValidatorRemove,
            BipAction::AliasRegister { .. } => BipType::AliasRegister,
            BipAction::AliasRemove { .. } => BipType::AliasRemove,
            BipAction::NetworkParamsSet(_) => BipType::NetworkParamsSet,
        }
    }
}

/// Discriminant of a proposal's action, stored on the proposal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BipType {
    TokenCreate,
    TokenMint,
    TokenBurn,
    AuthorityAdd,
    AuthorityRemove,
    ValidatorAdd,
    ValidatorRemove,
    AliasRegister,
    AliasRemove,
    NetworkParamsSet,
}

impl BipType {
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            BipType::TokenCreate => 1,
            BipType::TokenMint => 2,
            BipType::TokenBurn => 3,
            BipType::AuthorityAdd => 4,
            BipType::AuthorityRemove => 5,
            BipType::ValidatorAdd => 6,
            BipType::ValidatorRemove => 7,
            BipType::AliasRegister => 8,
            BipType::AliasRemove => 9,
            BipType::NetworkParamsSet => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<BipType> {
        match code {
            1 => Some(BipType::TokenCreate),
            2 => Some(BipType::TokenMint),
            3 => Some(BipType::TokenBurn),
            4 => Some(BipType::AuthorityAdd),
            5 => Some(BipType::AuthorityRemove),
            6 => Some(BipType::ValidatorAdd),
            7 => Some(BipType::ValidatorRemove),
            8 => Some(BipType::AliasRegister),
            9 => Some(BipType::AliasRemove),
            10 => Some(BipType::NetworkParamsSet),
            _ => None,
        }
    }
}

/// Partial update of the consensus network parameters.
///
/// `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkParamsUpdate {
    pub block_reward: Option<U256>,
    pub block_reward_pool_address: Option<Address>,
    /// Must be at least 5000 ms.
    pub target_mining_time_ms: Option<u64>,
    /// Must be at least 1.
    pub asert_half_life_blocks: Option<u64>,
    pub min_difficulty: Option<U256>,
    pub min_tx_base_fee: Option<u64>,
    pub min_tx_byte_fee: Option<u64>,
}

impl NetworkParamsUpdate {
    /// True when the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_reward.is_none()
            && self.block_reward_pool_address.is_none()
            && self.target_mining_time_ms.is_none()
            && self.asert_half_life_blocks.is_none()
            && self.min_difficulty.is_none()
            && self.min_tx_base_fee.is_none()
            && self.min_tx_byte_fee.is_none()
    }
}

/// Typed transaction payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPayload {
    /// Carried by `BipCreate`.
    BipProposal(BipAction),
    /// Carried by `BipVote`; `approve == false` records a disapproval.
    BipVote { approve: bool },
}

/// A signed transaction as received from a client or a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Encoding version of this record.
    pub version: u16,
    pub tx_type: TxType,
    /// Chain id; transactions do not cross networks.
    pub network: u32,
    /// Client-side creation time in epoch milliseconds.
    pub timestamp: u64,
    /// Per-sender monotonic counter. The first accepted transaction of an
    /// account carries nonce 1.
    pub nonce: u64,
    pub recipient: Option<Address>,
    pub amount: Option<U256>,
    /// Fee in smallest native units, paid regardless of transaction type.
    pub fee: u64,
    pub token_address: Option<Address>,
    pub payload: Option<TxPayload>,
    /// Links a vote to the proposal it votes on.
    pub reference_hash: Option<Hash>,
    /// Free-form note, capped by the stateless size check only.
    pub message: Option<String>,
    pub signature: Signature,
}

/// A transaction plus its derived identity.
///
/// Produced by `ember_codec::seal` after decoding or signing; everything
/// downstream of admission handles the sealed form so hash, sender, and
/// size are computed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedTransaction {
    pub transaction: Transaction,
    /// Content hash of the full canonical encoding.
    pub hash: Hash,
    /// Recovered from the signature over the signing hash.
    pub sender: Address,
    /// Canonical encoding length in bytes.
    pub size: u32,
}

impl SealedTransaction {
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.transaction.nonce
    }

    #[must_use]
    pub fn fee(&self) -> u64 {
        self.transaction.fee
    }

    /// Fee divided by encoded size, the mempool's priority metric.
    /// Rounds down; a zero-fee transaction prices at zero.
    #[must_use]
    pub fn fee_per_byte(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.transaction.fee / u64::from(self.size)
    }
}
