//! # Peer Reputation
//!
//! A persistent counter of failures per peer identity with a ban
//! sentinel and time-based recovery. Records live in their own column
//! family with a version-prefixed fixed byte layout:
//!
//! `[version:u8][failure_count:u32 BE][last_failure:u64 BE][last_success:u64 BE]`

use std::sync::Arc;

use dashmap::DashMap;
use ember_storage::{BatchOp, Family, KeyValueStore};
use shared_types::Address;
use tracing::{debug, info};

use crate::error::NetworkError;

/// Failure count value marking a ban.
pub const SENTINEL_BANNED: u32 = u32::MAX;

/// Bans lift after twelve hours.
pub const BAN_DURATION_MS: u64 = 12 * 60 * 60 * 1000;

const RECORD_VERSION: u8 = 1;
const RECORD_LEN: usize = 1 + 4 + 8 + 8;

/// One peer's standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReputationRecord {
    pub failure_count: u32,
    pub last_failure_epoch: u64,
    pub last_success_epoch: u64,
}

impl ReputationRecord {
    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.failure_count == SENTINEL_BANNED
    }

    /// Lift an expired ban: counters reset, timestamps kept.
    #[must_use]
    pub fn check_expiration(mut self, now: u64) -> Self {
        if self.is_banned() && now.saturating_sub(self.last_failure_epoch) >= BAN_DURATION_MS {
            self.failure_count = 0;
        }
        self
    }

    /// Higher is better; a banned peer is never selected.
    #[must_use]
    pub fn reliability_score(&self) -> i64 {
        if self.is_banned() {
            i64::MIN
        } else {
            1_000 - i64::from(self.failure_count.min(1_000))
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_LEN);
        out.push(RECORD_VERSION);
        out.extend_from_slice(&self.failure_count.to_be_bytes());
        out.extend_from_slice(&self.last_failure_epoch.to_be_bytes());
        out.extend_from_slice(&self.last_success_epoch.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        if bytes.len() != RECORD_LEN || bytes[0] != RECORD_VERSION {
            return Err(NetworkError::Codec(ember_codec::CodecError::format(
                "reputation record",
                format!("{} bytes, version {}", bytes.len(), bytes.first().unwrap_or(&0)),
            )));
        }
        let mut fc = [0u8; 4];
        fc.copy_from_slice(&bytes[1..5]);
        let mut lf = [0u8; 8];
        lf.copy_from_slice(&bytes[5..13]);
        let mut ls = [0u8; 8];
        ls.copy_from_slice(&bytes[13..21]);
        Ok(Self {
            failure_count: u32::from_be_bytes(fc),
            last_failure_epoch: u64::from_be_bytes(lf),
            last_success_epoch: u64::from_be_bytes(ls),
        })
    }
}

/// Write-through reputation store: a concurrent map in front of the
/// peer-reputation column family.
pub struct PeerReputationStore {
    kv: Arc<dyn KeyValueStore>,
    cache: DashMap<Address, ReputationRecord>,
}

impl PeerReputationStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            cache: DashMap::new(),
        }
    }

    /// Current record with ban expiry applied. An expired ban is written
    /// back immediately so the reset survives restart.
    pub fn get(&self, peer: &Address, now: u64) -> Result<ReputationRecord, NetworkError> {
        let loaded = match self.cache.get(peer) {
            Some(entry) => *entry,
            None => {
                let record = match self.kv.get(Family::PeerReputation, peer.as_bytes())? {
                    Some(bytes) => ReputationRecord::decode(&bytes)?,
                    None => ReputationRecord::default(),
                };
                self.cache.insert(*peer, record);
                record
            }
        };

        let checked = loaded.check_expiration(now);
        if checked != loaded {
            info!(peer = %peer, "ban expired, counters reset");
            self.persist(peer, checked)?;
        }
        Ok(checked)
    }

    pub fn record_success(&self, peer: &Address, now: u64) -> Result<(), NetworkError> {
        let mut record = self.get(peer, now)?;
        if record.is_banned() {
            return Ok(());
        }
        record.failure_count = 0;
        record.last_success_epoch = now;
        self.persist(peer, record)
    }

    /// Returns the updated record so callers can escalate to a ban.
    pub fn record_failure(
        &self,
        peer: &Address,
        now: u64,
    ) -> Result<ReputationRecord, NetworkError> {
        let mut record = self.get(peer, now)?;
        if record.is_banned() {
            return Ok(record);
        }
        record.failure_count = record.failure_count.saturating_add(1).min(SENTINEL_BANNED - 1);
        record.last_failure_epoch = now;
        debug!(peer = %peer, failures = record.failure_count, "peer failure recorded");
        self.persist(peer, record)?;
        Ok(record)
    }

    pub fn ban(&self, peer: &Address, now: u64) -> Result<(), NetworkError> {
        let mut record = self.get(peer, now)?;
        record.failure_count = SENTINEL_BANNED;
        record.last_failure_epoch = now;
        info!(peer = %peer, "peer banned");
        self.persist(peer, record)
    }

    pub fn is_dialable(&self, peer: &Address, now: u64) -> Result<bool, NetworkError> {
        Ok(!self.get(peer, now)?.is_banned())
    }

    pub fn reliability_score(&self, peer: &Address, now: u64) -> Result<i64, NetworkError> {
        Ok(self.get(peer, now)?.reliability_score())
    }

    fn persist(&self, peer: &Address, record: ReputationRecord) -> Result<(), NetworkError> {
        self.cache.insert(*peer, record);
        self.kv.write_batch(vec![BatchOp::Put {
            family: Family::PeerReputation,
            key: peer.as_bytes().to_vec(),
            value: record.encode(),
        }])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_storage::MemoryKeyValueStore;

    fn store() -> PeerReputationStore {
        PeerReputationStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    fn peer() -> Address {
        Address([0xAB; 20])
    }

    #[test]
    fn test_record_layout_roundtrip() {
        let record = ReputationRecord {
            failure_count: 7,
            last_failure_epoch: 1_700_000_000_123,
            last_success_epoch: 1_700_000_000_456,
        };
        let bytes = record.encode();
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(bytes[0], RECORD_VERSION);
        assert_eq!(ReputationRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        let mut bytes = ReputationRecord::default().encode();
        bytes[0] = 9;
        assert!(ReputationRecord::decode(&bytes).is_err());
    }

    #[test]
    fn test_success_resets_failures() {
        let store = store();
        let now = 1_000_000;
        store.record_failure(&peer(), now).unwrap();
        store.record_failure(&peer(), now + 1).unwrap();
        assert_eq!(store.get(&peer(), now + 2).unwrap().failure_count, 2);

        store.record_success(&peer(), now + 3).unwrap();
        let record = store.get(&peer(), now + 4).unwrap();
        assert_eq!(record.failure_count, 0);
        assert_eq!(record.last_success_epoch, now + 3);
    }

    #[test]
    fn test_ban_blocks_updates_until_expiry() {
        let store = store();
        let now = 1_000_000;
        store.ban(&peer(), now).unwrap();
        assert!(!store.is_dialable(&peer(), now + 1).unwrap());
        assert_eq!(store.reliability_score(&peer(), now + 1).unwrap(), i64::MIN);

        // Success and failure are ignored while banned.
        store.record_success(&peer(), now + 2).unwrap();
        assert!(store.get(&peer(), now + 3).unwrap().is_banned());

        // Twelve hours later the ban lifts and counters read zero.
        let later = now + BAN_DURATION_MS;
        let record = store.get(&peer(), later).unwrap();
        assert!(!record.is_banned());
        assert_eq!(record.failure_count, 0);
        assert!(store.is_dialable(&peer(), later).unwrap());
    }

    #[test]
    fn test_expired_ban_reset_is_persisted() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let now = 1_000_000;
        {
            let store = PeerReputationStore::new(kv.clone());
            store.ban(&peer(), now).unwrap();
            let _ = store.get(&peer(), now + BAN_DURATION_MS).unwrap();
        }
        // A fresh store over the same backend sees the lifted ban.
        let store = PeerReputationStore::new(kv);
        let record = store.get(&peer(), now + BAN_DURATION_MS + 1).unwrap();
        assert_eq!(record.failure_count, 0);
    }

    #[test]
    fn test_reliability_score_floor() {
        let store = store();
        let now = 0;
        for i in 0..2_000u64 {
            store.record_failure(&peer(), now + i).unwrap();
        }
        assert_eq!(store.reliability_score(&peer(), 3_000).unwrap(), 0);
    }
}
