//! # Blocks
//!
//! Block headers, full blocks, and the stored form persisted by the block
//! store with chain metadata attached.

use crate::events::BlockEvent;
use crate::primitives::{Address, Hash, Signature, U256};
use crate::transaction::SealedTransaction;

/// The header of a block.
///
/// `state_root_hash` is the Merkle root of the world state after applying
/// this block; `tx_root_hash` is the Merkle root of the ordered transaction
/// list. The proof-of-work solution is `nonce`; `difficulty` is the target
/// ceiling the solution hash must not exceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Encoding version of this record.
    pub version: u16,
    pub height: u64,
    /// Epoch milliseconds; strictly greater than the parent's.
    pub timestamp: u64,
    pub previous_hash: Hash,
    pub tx_root_hash: Hash,
    pub state_root_hash: Hash,
    /// Proof-of-work target. Higher means easier.
    pub difficulty: U256,
    /// Recipient of the block reward and collected fees.
    pub coinbase: Address,
    /// Proof-of-work solution.
    pub nonce: u64,
    /// Miner identity; must match the signer recovered from `signature`.
    pub identity: Address,
    pub signature: Signature,
}

/// A header plus its derived identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedHeader {
    pub header: BlockHeader,
    /// Content hash of the full canonical encoding.
    pub hash: Hash,
    /// Canonical encoding length in bytes.
    pub size: u32,
}

impl SealedHeader {
    #[must_use]
    pub fn height(&self) -> u64 {
        self.header.height
    }

    #[must_use]
    pub fn previous_hash(&self) -> Hash {
        self.header.previous_hash
    }
}

/// A sealed block: header plus the ordered transaction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub header: SealedHeader,
    pub transactions: Vec<SealedTransaction>,
}

impl SealedBlock {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.header.height()
    }

    /// Header size plus the sum of transaction sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        u64::from(self.header.size)
            + self
                .transactions
                .iter()
                .map(|tx| u64::from(tx.size))
                .sum::<u64>()
    }

    #[must_use]
    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}

/// Where a connected block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectedSource {
    Genesis,
    Miner,
    Broadcast,
    Sync,
    Reorg,
}

impl ConnectedSource {
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            ConnectedSource::Genesis => 0,
            ConnectedSource::Miner => 1,
            ConnectedSource::Broadcast => 2,
            ConnectedSource::Sync => 3,
            ConnectedSource::Reorg => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<ConnectedSource> {
        match code {
            0 => Some(ConnectedSource::Genesis),
            1 => Some(ConnectedSource::Miner),
            2 => Some(ConnectedSource::Broadcast),
            3 => Some(ConnectedSource::Sync),
            4 => Some(ConnectedSource::Reorg),
            _ => None,
        }
    }
}

/// A block as persisted by the block store.
///
/// Carries the chain metadata needed to answer fork choice and history
/// queries without replaying state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub block: SealedBlock,
    /// Total work of the chain ending at this block.
    pub cumulative_difficulty: U256,
    /// Local receive time in epoch milliseconds.
    pub received_at: u64,
    /// Peer identity the block arrived from; `None` for local origins.
    pub received_from: Option<Address>,
    pub source: ConnectedSource,
    /// Events extracted from the state diffs when the block connected.
    pub events: Vec<BlockEvent>,
}

impl StoredBlock {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.block.hash()
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.block.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_source_codes_roundtrip() {
        for s in [
            ConnectedSource::Genesis,
            ConnectedSource::Miner,
            ConnectedSource::Broadcast,
            ConnectedSource::Sync,
            ConnectedSource::Reorg,
        ] {
            assert_eq!(ConnectedSource::from_code(s.code()), Some(s));
        }
        assert_eq!(ConnectedSource::from_code(5), None);
    }
}
