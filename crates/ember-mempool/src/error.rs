//! # Mempool Errors

use ember_chain::InvalidTxReason;
use shared_types::Hash;
use thiserror::Error;

/// Why a transaction was not admitted.
#[derive(Debug, Clone, Error)]
pub enum MempoolError {
    #[error("transaction {0} already pooled")]
    Duplicate(Hash),

    /// Failed stateless or stateful validation.
    #[error("invalid transaction: {0}")]
    Invalid(#[from] InvalidTxReason),

    #[error(transparent)]
    State(#[from] ember_state::StateError),

    #[error("fee {fee} below required floor {required}")]
    FeeTooLow { fee: u64, required: u64 },

    /// A same-nonce replacement must price strictly above the bump ratio.
    #[error("replacement fee {new_fee} does not beat {old_fee} by the required bump")]
    ReplacementUnderpriced { old_fee: u64, new_fee: u64 },

    /// At capacity and the newcomer does not outbid anything evictable.
    #[error("pool full")]
    PoolFull,
}
