//! # Block Events
//!
//! Events extracted from the state diffs of a connected block and stored
//! with it. These describe what a block did in domain terms, without
//! requiring consumers to re-interpret raw diffs.

use crate::primitives::{Address, Hash, U256};
use crate::state::BipStatus;

/// A state transition caused by one block, in extraction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    /// Reward paid out of the reward pool to the coinbase. The amount may
    /// fall short of the configured reward when the pool runs dry.
    BlockReward { recipient: Address, amount: U256 },
    /// Sum of all transaction fees credited to the coinbase.
    FeesCollected { recipient: Address, amount: U256 },
    TokenCreated { token: Address },
    TokenMinted { token: Address, recipient: Address, amount: U256 },
    TokenBurned { token: Address, holder: Address, amount: U256 },
    AuthorityAdded { address: Address },
    AuthorityRemoved { address: Address },
    ValidatorAdded { address: Address },
    ValidatorRemoved { address: Address },
    NetworkParamsChanged,
    AddressAliasRegistered { alias: String, address: Address },
    AddressAliasRemoved { alias: String },
    BipStateChanged {
        bip_hash: Hash,
        old_status: Option<BipStatus>,
        new_status: BipStatus,
    },
}

impl BlockEvent {
    /// Stable wire code for the canonical encoding.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            BlockEvent::BlockReward { .. } => 1,
            BlockEvent::FeesCollected { .. } => 2,
            BlockEvent::TokenCreated { .. } => 3,
            BlockEvent::TokenMinted { .. } => 4,
            BlockEvent::TokenBurned { .. } => 5,
            BlockEvent::AuthorityAdded { .. } => 6,
            BlockEvent::AuthorityRemoved { .. } => 7,
            BlockEvent::ValidatorAdded { .. } => 8,
            BlockEvent::ValidatorRemoved { .. } => 9,
            BlockEvent::NetworkParamsChanged => 10,
            BlockEvent::AddressAliasRegistered { .. } => 11,
            BlockEvent::AddressAliasRemoved { .. } => 12,
            BlockEvent::BipStateChanged { .. } => 13,
        }
    }
}
