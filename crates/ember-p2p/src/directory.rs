//! # Directory Client
//!
//! Periodic signed ping to the central peer registry. The binary payload
//! is the canonical codec, hex-wrapped into a JSON envelope alongside its
//! hash and signature; the response carries a peer list signed by the
//! pinned directory identity and is rejected wholesale on any signature
//! mismatch.

use std::sync::Arc;
use std::time::Duration;

use ember_codec::{CodecError, Value};
use serde::{Deserialize, Serialize};
use shared_crypto::{keccak256, recover_signer, NodeIdentity};
use shared_types::{Address, NetworkSettings};
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::error::NetworkError;
use crate::manager::{now_ms, KnownAddress, PeerManager};

/// Delay before the first ping after startup.
const INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Response flag: our software version is no longer accepted.
const FLAG_UPGRADE_REQUIRED: u64 = 1;

/// The JSON envelope both directions share. All fields are hex.
#[derive(Debug, Serialize, Deserialize)]
struct DirectoryEnvelope {
    payload: String,
    hash: String,
    signature: String,
}

/// The periodic registry ping task.
pub struct DirectoryClient {
    manager: Arc<PeerManager>,
    identity: Arc<NodeIdentity>,
    settings: Arc<NetworkSettings>,
    config: P2pConfig,
    /// The registry's pinned signing identity.
    directory_identity: Address,
    http: reqwest::Client,
}

impl DirectoryClient {
    #[must_use]
    pub fn new(
        manager: Arc<PeerManager>,
        identity: Arc<NodeIdentity>,
        settings: Arc<NetworkSettings>,
        config: P2pConfig,
        directory_identity: Address,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            identity,
            settings,
            config,
            directory_identity,
            http: reqwest::Client::new(),
        })
    }

    /// Ping forever. Returns only on a fatal upgrade demand, which the
    /// runtime maps to exit code 2.
    pub async fn run(self: Arc<Self>) -> Result<(), NetworkError> {
        tokio::time::sleep(INITIAL_DELAY).await;
        let interval = Duration::from_millis(self.config.directory_ping_interval_ms.max(1_000));
        loop {
            match self.ping_once().await {
                Ok(peers) => debug!(peers, "directory ping ok"),
                Err(NetworkError::VersionTooOld) => {
                    warn!("directory rejected our software version");
                    return Err(NetworkError::VersionTooOld);
                }
                Err(e) => warn!(error = %e, "directory ping failed"),
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One signed ping and peer-table merge. Returns the merged count.
    pub async fn ping_once(&self) -> Result<usize, NetworkError> {
        let tip = self.manager.engine().tip();
        let payload = Value::list(vec![
            Value::string(&self.config.host),
            Value::uint(u64::from(self.config.port)),
            Value::uint(u64::from(self.settings.protocol_version)),
            Value::string(&self.settings.software_version),
            Value::uint(now_ms()),
            Value::uint(u64::from(self.settings.network_id)),
            Value::address(&self.identity.address()),
            Value::u256(&tip.cumulative_difficulty),
            Value::hash(&tip.hash),
            Value::uint(tip.height),
        ])
        .encode();

        let hash = keccak256(&payload);
        let signature = self
            .identity
            .sign(&hash)
            .map_err(|e| NetworkError::Handshake(e.to_string()))?;
        let request = DirectoryEnvelope {
            payload: hex::encode(&payload),
            hash: hex::encode(hash.as_bytes()),
            signature: hex::encode(signature.as_bytes()),
        };

        let url = format!(
            "{}/api/v1/node/ping",
            self.config.directory_host.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NetworkError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| NetworkError::Http(e.to_string()))?;
        let envelope: DirectoryEnvelope = response
            .json()
            .await
            .map_err(|e| NetworkError::Http(e.to_string()))?;

        let entries = self.verify_and_decode(&envelope)?;
        let count = entries.len();
        self.manager.merge_directory_peers(entries);
        info!(peers = count, "directory peers merged");
        Ok(count)
    }

    /// Verify the response signature over the canonical re-encoding by
    /// the pinned directory identity, then decode the peer list.
    fn verify_and_decode(
        &self,
        envelope: &DirectoryEnvelope,
    ) -> Result<Vec<(Address, KnownAddress)>, NetworkError> {
        let payload = hex::decode(&envelope.payload)
            .map_err(|_| NetworkError::DirectorySignature)?;
        let claimed_hash = hex::decode(&envelope.hash)
            .ok()
            .and_then(|b| shared_types::Hash::from_slice(&b))
            .ok_or(NetworkError::DirectorySignature)?;
        let signature = hex::decode(&envelope.signature)
            .ok()
            .and_then(|b| shared_types::Signature::from_slice(&b))
            .ok_or(NetworkError::DirectorySignature)?;

        let computed = keccak256(&payload);
        if computed != claimed_hash {
            return Err(NetworkError::DirectorySignature);
        }
        match recover_signer(&computed, &signature) {
            Ok(signer) if signer == self.directory_identity => {}
            _ => return Err(NetworkError::DirectorySignature),
        }

        decode_peer_list(&payload)
    }
}

/// Response payload: `[flags, [[identity, host, port, updated_at], ...]]`.
/// The list is unordered by contract; the merge treats it as a set.
fn decode_peer_list(payload: &[u8]) -> Result<Vec<(Address, KnownAddress)>, NetworkError> {
    let value = Value::decode(payload)?;
    let fields = value.as_fields("directory response", 2)?;
    if fields[0].as_uint()? & FLAG_UPGRADE_REQUIRED != 0 {
        return Err(NetworkError::VersionTooOld);
    }

    let mut entries = Vec::new();
    for entry in fields[1].as_list()? {
        let parts = entry.as_fields("directory peer", 4)?;
        entries.push((
            parts[0].as_address()?,
            KnownAddress {
                host: parts[1].as_string()?,
                port: u16::try_from(parts[2].as_uint()?).map_err(|_| {
                    NetworkError::Codec(CodecError::format("directory peer", "port range"))
                })?,
                updated_at: parts[3].as_uint()?,
            },
        ));
    }
    Ok(entries)
}
