//! # Status Handshake
//!
//! On connect, both sides send a signed STATUS and verify the peer's:
//! right network, compatible protocol, a signature that recovers the
//! announced identity, and an identity that is not already connected or
//! banned. Any failure closes the connection with a reputation penalty.

use shared_crypto::{keccak256, recover_signer, NodeIdentity};
use shared_types::{NetworkSettings, Signature};

use crate::error::NetworkError;
use crate::messages::StatusPayload;

/// Build and sign our own status from the current tip.
pub fn build_status(
    identity: &NodeIdentity,
    settings: &NetworkSettings,
    total_difficulty: shared_types::U256,
    head_hash: shared_types::Hash,
    head_height: u64,
    timestamp: u64,
) -> Result<StatusPayload, NetworkError> {
    let mut status = StatusPayload {
        network_id: settings.network_id,
        protocol_version: settings.protocol_version,
        software_version: settings.software_version.clone(),
        node_identity: identity.address(),
        total_difficulty,
        head_hash,
        head_height,
        timestamp,
        signature: Signature::default(),
    };
    let hash = keccak256(&status.signing_value().encode());
    status.signature = identity
        .sign(&hash)
        .map_err(|e| NetworkError::Handshake(e.to_string()))?;
    Ok(status)
}

/// Verify a peer's status against our settings. Returns nothing; the
/// caller still has to reject duplicates and banned identities, which
/// need connection-table state.
pub fn verify_status(
    status: &StatusPayload,
    settings: &NetworkSettings,
) -> Result<(), NetworkError> {
    if status.network_id != settings.network_id {
        return Err(NetworkError::WrongNetwork {
            expected: settings.network_id,
            got: status.network_id,
        });
    }
    if status.protocol_version < settings.min_protocol_version {
        return Err(NetworkError::IncompatibleProtocol {
            minimum: settings.min_protocol_version,
            theirs: status.protocol_version,
        });
    }

    let hash = keccak256(&status.signing_value().encode());
    match recover_signer(&hash, &status.signature) {
        Ok(signer) if signer == status.node_identity => Ok(()),
        _ => Err(NetworkError::Handshake(
            "status signature does not recover the announced identity".to_string(),
        )),
    }
}
