//! # State Errors

use shared_types::{Address, Hash, U256};
use thiserror::Error;

/// Errors of the trie and the world state.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// A node referenced by the trie is absent from every layer. Harmless
    /// for speculative reads, fatal during block validation.
    #[error("missing trie node {hash}")]
    MissingNode { hash: Hash },

    /// A stored node or entity failed to decode.
    #[error(transparent)]
    Codec(#[from] ember_codec::CodecError),

    /// Debit past the available balance.
    #[error("insufficient balance of {token} for {address}: have {balance}, need {required}")]
    InsufficientBalance {
        address: Address,
        token: Address,
        balance: U256,
        required: U256,
    },

    /// The accepted-transaction path only ever advances a nonce by one.
    #[error("nonce for {address} must advance from {current} by one, got {attempted}")]
    NonceNotSequential {
        address: Address,
        current: u64,
        attempted: u64,
    },

    /// The params cell is written at genesis; its absence means the state
    /// root does not belong to this chain.
    #[error("network params cell missing from state")]
    MissingParams,

    /// Backend I/O failure.
    #[error("trie backend error: {0}")]
    Backend(String),
}
