//! # Node Identity
//!
//! The node's long-lived signing key. It signs the status handshake, the
//! directory ping, and mined block headers; its address is the node's
//! identity on the network.

use std::fmt;
use std::fs;
use std::path::Path;

use k256::ecdsa::SigningKey;
use shared_types::{Address, Hash, Signature};

use crate::signature::{address_of, sign_hash, CryptoError};

/// A secp256k1 keypair with its derived address.
#[derive(Clone)]
pub struct NodeIdentity {
    key: SigningKey,
    address: Address,
}

impl NodeIdentity {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_of(key.verifying_key());
        Self { key, address }
    }

    /// Rebuild from raw 32-byte secret material.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Load the identity from `path`, creating and persisting a fresh one
    /// on first start. The file holds the hex-encoded secret.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| CryptoError::InvalidKey(format!("read {}: {e}", path.display())))?;
            let bytes = hex::decode(content.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("decode {}: {e}", path.display())))?;
            return Self::from_secret_bytes(&bytes);
        }

        let identity = Self::generate();
        let encoded = hex::encode(identity.key.to_bytes());
        fs::write(path, encoded)
            .map_err(|e| CryptoError::InvalidKey(format!("write {}: {e}", path.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }
        Ok(identity)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, hash: &Hash) -> Result<Signature, CryptoError> {
        sign_hash(&self.key, hash)
    }

    /// The underlying signing key, for sealing helpers.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("NodeIdentity")
            .field("address", &self.address)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::keccak256;
    use crate::signature::recover_signer;

    #[test]
    fn test_identity_signs_as_its_address() {
        let identity = NodeIdentity::generate();
        let hash = keccak256(b"status");
        let sig = identity.sign(&hash).unwrap();
        assert_eq!(recover_signer(&hash, &sig).unwrap(), identity.address());
    }

    #[test]
    fn test_load_or_create_roundtrip() {
        let dir = std::env::temp_dir().join(format!("ember-id-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".node_identity");

        let created = NodeIdentity::load_or_create(&path).unwrap();
        let loaded = NodeIdentity::load_or_create(&path).unwrap();
        assert_eq!(created.address(), loaded.address());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
