//! # Chain Errors
//!
//! One enumerated reason per rejection, so callers and logs can tell
//! exactly which rule a transaction or block violated.

use shared_types::{Address, Hash, U256};
use thiserror::Error;

/// Why a transaction is invalid. Validation stops at the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTxReason {
    // ----- stateless -----
    #[error("transaction of {size} bytes exceeds the {limit} byte cap")]
    TooLarge { size: u32, limit: u32 },

    #[error("transaction is for network {got}, this chain is {expected}")]
    WrongNetwork { expected: u32, got: u32 },

    #[error("nonce must be positive")]
    ZeroNonce,

    #[error("recipient required for this transaction type")]
    MissingRecipient,

    #[error("recipient not allowed for this transaction type")]
    UnexpectedRecipient,

    #[error("amount required for this transaction type")]
    MissingAmount,

    #[error("amount not allowed for this transaction type")]
    UnexpectedAmount,

    #[error("token address required for this transaction type")]
    MissingTokenAddress,

    #[error("token address not allowed for this transaction type")]
    UnexpectedTokenAddress,

    #[error("payload required for this transaction type")]
    MissingPayload,

    #[error("payload kind does not match the transaction type")]
    WrongPayloadKind,

    #[error("reference hash required for this transaction type")]
    MissingReference,

    #[error("reference hash not allowed for this transaction type")]
    UnexpectedReference,

    #[error("token name must be 1-16 of A-Z 0-9 _ and not edge underscores")]
    BadTokenName,

    #[error("token decimals must be at most 18")]
    BadDecimals,

    #[error("url malformed or too long")]
    BadUrl,

    #[error("alias must be 1-64 of a-z 0-9 _")]
    BadAlias,

    #[error("network params update malformed: {0}")]
    BadParamsUpdate(String),

    #[error("sender and recipient must differ")]
    SelfTransfer,

    #[error("signature does not recover a sender")]
    BadSignature,

    // ----- stateful -----
    #[error("nonce {got} at or below the stored nonce {stored}")]
    NonceTooLow { stored: u64, got: u64 },

    #[error("nonce {got} leaves a gap past {limit}")]
    NonceGap { limit: u64, got: u64 },

    #[error("nonce {got} does not follow stored nonce {stored}")]
    NonceNotNext { stored: u64, got: u64 },

    #[error("native balance {balance} below required {required}")]
    InsufficientFeeBalance { balance: U256, required: U256 },

    #[error("balance {balance} of token {token} below transfer amount {amount}")]
    InsufficientTokenBalance {
        token: Address,
        balance: U256,
        amount: U256,
    },

    #[error("sender is not an authority")]
    NotAuthority,

    #[error("referenced proposal {0} does not exist")]
    UnknownBip(Hash),

    #[error("referenced proposal is not pending")]
    BipNotPending,

    #[error("referenced proposal expired")]
    BipExpired,

    #[error("sender already voted on this proposal")]
    AlreadyVoted,

    #[error("derived token address {0} already in use")]
    TokenExists(Address),

    #[error("token {0} does not exist")]
    UnknownToken(Address),

    #[error("mint would exceed the token's max supply")]
    ExceedsMaxSupply,

    #[error("alias already bound")]
    AliasTaken,

    #[error("alias not bound")]
    UnknownAlias,

    #[error("address is already an authority")]
    AuthorityExists,

    #[error("address is not an authority")]
    UnknownAuthority,

    #[error("address is already a validator")]
    ValidatorExists,

    #[error("address is not a validator")]
    UnknownValidator,
}

/// Why a block was rejected during header-context or body validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBlockReason {
    #[error("height {got} does not follow parent height {parent}")]
    BadHeight { parent: u64, got: u64 },

    #[error("timestamp {got} not after parent timestamp {parent}")]
    TimestampNotAfterParent { parent: u64, got: u64 },

    #[error("timestamp {got} further than {tolerance_ms} ms ahead of local time {now}")]
    TimestampInFuture {
        got: u64,
        now: u64,
        tolerance_ms: u64,
    },

    #[error("difficulty target mismatch: expected {expected}, got {got}")]
    BadDifficulty { expected: U256, got: U256 },

    #[error("proof-of-work hash above target")]
    BadProofOfWork,

    #[error("header signature does not recover the identity address")]
    BadBlockSignature,

    #[error("transaction root mismatch")]
    BadTxRoot,

    #[error("state root mismatch: expected {expected}, got {got}")]
    BadStateRoot { expected: Hash, got: Hash },

    #[error("{count} transactions exceed the {limit} per-block cap")]
    TooManyTransactions { count: u32, limit: u32 },

    #[error("block of {size} bytes exceeds the {limit} byte cap")]
    OversizedBlock { size: u64, limit: u64 },

    #[error("difficulty anchor block missing at height {0}")]
    MissingAnchor(u64),

    #[error("invalid transaction {hash}: {reason}")]
    InvalidTransaction {
        hash: Hash,
        reason: InvalidTxReason,
    },
}

/// Top-level chain engine error.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// A transaction failed validation outside a block context.
    #[error("invalid transaction: {0}")]
    InvalidTx(#[from] InvalidTxReason),

    /// Consensus rejection of a block. The block is dropped and the peer
    /// that sent it penalized.
    #[error("invalid block {hash}: {reason}")]
    InvalidBlock {
        hash: Hash,
        reason: InvalidBlockReason,
    },

    /// The parent is unknown; the caller should sync first.
    #[error("unknown parent {parent} for block {hash}")]
    UnknownParent { hash: Hash, parent: Hash },

    #[error(transparent)]
    State(#[from] ember_state::StateError),

    #[error(transparent)]
    Store(#[from] ember_storage::StoreError),

    #[error(transparent)]
    Crypto(#[from] shared_crypto::CryptoError),

    #[error(transparent)]
    Codec(#[from] ember_codec::CodecError),

    /// The database has no tip; the genesis bootstrap has not run.
    #[error("chain store not initialized")]
    NotInitialized,

    /// The database belongs to a different genesis.
    #[error("genesis mismatch: store has {found}, configuration expects {expected}")]
    GenesisMismatch { expected: Hash, found: Hash },
}

impl ChainError {
    /// Helper for block rejections.
    pub(crate) fn invalid_block(hash: Hash, reason: InvalidBlockReason) -> Self {
        ChainError::InvalidBlock { hash, reason }
    }
}
