//! # Transaction Merkle Root
//!
//! Binary Merkle tree over the ordered transaction hashes of a block.
//! A level with an odd node count duplicates its last node; the root of
//! an empty list is the zero hash.

use shared_crypto::keccak256;
use shared_types::Hash;

/// Compute the Merkle root of an ordered transaction hash list.
#[must_use]
pub fn tx_merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(left.as_bytes());
            concat[32..].copy_from_slice(right.as_bytes());
            next.push(keccak256(&concat));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash {
        Hash([byte; 32])
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(tx_merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        assert_eq!(tx_merkle_root(&[h(1)]), h(1));
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(tx_merkle_root(&[h(1), h(2)]), tx_merkle_root(&[h(2), h(1)]));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let three = tx_merkle_root(&[h(1), h(2), h(3)]);
        let padded = tx_merkle_root(&[h(1), h(2), h(3), h(3)]);
        assert_eq!(three, padded);
    }
}
