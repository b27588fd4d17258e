//! # Recoverable Signatures
//!
//! ECDSA over secp256k1 with public-key recovery. A signature over a hash
//! yields the signer's address, so signed records carry no explicit
//! sender field.
//!
//! Layout of [`shared_types::Signature`]: `r (32) || s (32) || v (1)`,
//! where `v` is the recovery id.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use shared_types::{Address, Hash, Signature};
use thiserror::Error;

use crate::hashing::keccak256;

/// Failures of the signature scheme.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Signature bytes malformed or recovery failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Key bytes malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Derive the address of a verifying key: the last 20 bytes of the
/// Keccak-256 of the uncompressed point without its prefix byte.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_bytes()[12..]);
    Address(out)
}

/// Sign `hash` with `key`, producing a recoverable signature.
pub fn sign_hash(key: &SigningKey, hash: &Hash) -> Result<Signature, CryptoError> {
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(hash.as_bytes())
        .map_err(|_| CryptoError::InvalidSignature)?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(Signature(out))
}

/// Recover the signer address of `signature` over `hash`.
pub fn recover_signer(hash: &Hash, signature: &Signature) -> Result<Address, CryptoError> {
    let bytes = signature.as_bytes();
    let sig = EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;
    let recovery_id =
        RecoveryId::from_byte(bytes[64]).ok_or(CryptoError::InvalidSignature)?;

    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    Ok(address_of(&key))
}
