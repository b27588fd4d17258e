//! # Content Hashing and the Proof-of-Work Boundary

use sha3::{Digest, Keccak256};
use shared_types::Hash;

/// Keccak-256, the content hash for trie nodes, transactions, and headers.
#[must_use]
pub fn keccak256(bytes: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// The proof-of-work hash function.
///
/// The production implementation is memory-hard and lives outside this
/// repository; the chain engine and miner only see this trait. The input
/// is the canonical signing encoding of a header (nonce included,
/// signature excluded) and the output is compared against the header's
/// difficulty target as a big-endian integer.
pub trait PowHasher: Send + Sync {
    fn pow_hash(&self, header_bytes: &[u8]) -> Hash;
}

/// Double-Keccak reference hasher for development networks and tests.
///
/// Not memory-hard. Never configure this on a public network.
#[derive(Debug, Default, Clone)]
pub struct CpuPowHasher;

impl PowHasher for CpuPowHasher {
    fn pow_hash(&self, header_bytes: &[u8]) -> Hash {
        keccak256(keccak256(header_bytes).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_vector() {
        // Keccak-256 of the empty string.
        let hash = keccak256(b"");
        assert_eq!(
            hash.to_string(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_cpu_pow_hasher_is_deterministic() {
        let hasher = CpuPowHasher;
        assert_eq!(hasher.pow_hash(b"header"), hasher.pow_hash(b"header"));
        assert_ne!(hasher.pow_hash(b"a"), hasher.pow_hash(b"b"));
    }
}
