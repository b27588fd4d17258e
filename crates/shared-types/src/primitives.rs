//! # Primitive Identifiers
//!
//! Fixed-width byte identifiers used as keys throughout the node.
//!
//! Equality is byte-wise everywhere. [`Hash`] keys the Merkle trie and all
//! block indices; [`Address`] keys accounts, tokens, and peer identities;
//! [`Signature`] is a recoverable signature whose signer address is derived
//! from the signed hash plus the signature itself (see `shared-crypto`).

use std::fmt;

pub use primitive_types::U256;

/// A 32-byte content hash produced by the configured hash function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used for "no parent" and empty roots.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Interpret the hash as a big-endian 256-bit integer.
    ///
    /// Used for the proof-of-work target comparison and the deterministic
    /// fork-choice tie break.
    #[must_use]
    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from an exact 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "{}..", hex::encode(&self.0[..4]))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// A 20-byte account identifier derived deterministically from a public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The null address: mint and burn sink, and the "no recipient" marker.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Sentinel token address for the native asset.
    pub const NATIVE_TOKEN: Address = Address([0xFFu8; 20]);

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Address> {
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    /// True for the native-asset sentinel.
    #[must_use]
    pub fn is_native_token(&self) -> bool {
        *self == Self::NATIVE_TOKEN
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}..", hex::encode(&self.0[..4]))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

/// A 65-byte recoverable signature (r, s, recovery id).
///
/// Combined with the signed hash this yields the signer's [`Address`];
/// transactions and headers therefore carry no explicit sender field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 65]);

impl Signature {
    pub const LENGTH: usize = 65;

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Signature> {
        let arr: [u8; 65] = bytes.try_into().ok()?;
        Some(Signature(arr))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature([0u8; 65])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}..", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ordering_is_bytewise() {
        let lo = Hash([0u8; 32]);
        let mut hi = [0u8; 32];
        hi[0] = 1;
        assert!(lo < Hash(hi));
    }

    #[test]
    fn test_reserved_addresses_are_distinct() {
        assert_ne!(Address::ZERO, Address::NATIVE_TOKEN);
        assert!(Address::NATIVE_TOKEN.is_native_token());
        assert!(!Address::ZERO.is_native_token());
    }

    #[test]
    fn test_hash_u256_roundtrip() {
        let mut raw = [0u8; 32];
        raw[31] = 7;
        assert_eq!(Hash(raw).as_u256(), U256::from(7));
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        assert!(Hash::from_slice(&[0u8; 31]).is_none());
        assert!(Address::from_slice(&[0u8; 21]).is_none());
        assert!(Signature::from_slice(&[0u8; 64]).is_none());
    }
}
