//! # Chain Sync
//!
//! Per round: pick the best peer ahead of us, locate the common
//! ancestor with exponential-backoff locator heights, then pull headers
//! in windows, fetch bodies, and hand assembled blocks to the chain
//! engine. The engine's fork choice decides whether the downloaded chain
//! replaces ours.
//!
//! One request is outstanding per peer; a timeout debits the peer, and
//! repeated consecutive timeouts escalate to a ban.

use std::sync::Arc;
use std::time::Duration;

use ember_chain::ChainError;
use ember_codec::seal_header;
use parking_lot::Mutex;
use shared_types::{ConnectedSource, SealedBlock};
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::manager::{now_ms, PeerManager};
use crate::messages::{GetHeadersRequest, HeadersStart, Message};
use crate::peer::{Peer, ResponseKind};
use crate::HEADER_WINDOW;

/// Consecutive failures that escalate to a ban.
const FAILURES_BEFORE_BAN: u32 = 3;

/// Idle poll interval when no peer wakes us.
const IDLE_INTERVAL: Duration = Duration::from_secs(15);

/// Observable phase of the per-peer sync machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    HeadersRequested,
    BodiesRequested,
    Validating,
}

/// The sync driver.
pub struct SyncManager {
    manager: Arc<PeerManager>,
    phase: Mutex<SyncPhase>,
}

impl SyncManager {
    #[must_use]
    pub fn new(manager: Arc<PeerManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            phase: Mutex::new(SyncPhase::Idle),
        })
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    /// Run forever: wake on hints from the transport or on the idle
    /// timer, sync one round, go back to sleep.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.manager.sync_wakeup() => {}
                () = tokio::time::sleep(IDLE_INTERVAL) => {}
            }
            if let Err(e) = self.sync_round().await {
                debug!(error = %e, "sync round failed");
            }
            *self.phase.lock() = SyncPhase::Idle;
        }
    }

    /// One round against the best available peer, if any is ahead of us.
    pub async fn sync_round(&self) -> Result<(), NetworkError> {
        let engine = self.manager.engine();
        let local = engine.tip();
        let reputation = self.manager.reputation();
        let now = now_ms();

        // Peers strictly ahead, best reputation first, least recently
        // used breaking ties.
        let mut candidates: Vec<(i64, u64, Arc<Peer>)> = Vec::new();
        for peer in self.manager.connected_peers() {
            let state = peer.chain_state();
            if state.total_difficulty <= local.cumulative_difficulty {
                continue;
            }
            let score = reputation.reliability_score(&peer.identity, now)?;
            if score == i64::MIN {
                continue;
            }
            candidates.push((score, peer.last_synced_ms(), peer));
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let Some((_, _, peer)) = candidates.into_iter().next() else {
            return Ok(());
        };

        match self.sync_with(&peer).await {
            Ok(imported) => {
                peer.mark_synced(now_ms());
                reputation.record_success(&peer.identity, now_ms())?;
                if imported > 0 {
                    info!(peer = %peer.identity, imported, "sync round complete");
                }
                Ok(())
            }
            Err(NetworkError::Timeout) => {
                let record = reputation.record_failure(&peer.identity, now_ms())?;
                if record.failure_count >= FAILURES_BEFORE_BAN {
                    reputation.ban(&peer.identity, now_ms())?;
                }
                Err(NetworkError::Timeout)
            }
            Err(other) => Err(other),
        }
    }

    async fn sync_with(&self, peer: &Arc<Peer>) -> Result<u64, NetworkError> {
        let engine = self.manager.engine();
        let store = engine.store();
        let timeout = self.manager.request_timeout();

        // Locate the common ancestor: probe our chain's heights with
        // exponentially growing steps until the peer's header there
        // matches ours.
        let local_tip = engine.tip();
        let mut ancestor_height = 0u64;
        for height in locator_heights(local_tip.height) {
            *self.phase.lock() = SyncPhase::HeadersRequested;
            let response = peer
                .request(
                    Message::GetBlockHeaders(GetHeadersRequest {
                        start: HeadersStart::FromHeight(height),
                        count: 1,
                        ascending: true,
                        skip: 0,
                    }),
                    ResponseKind::Headers,
                    timeout,
                )
                .await?;
            let Message::BlockHeaders(headers) = response else {
                return Err(NetworkError::UnexpectedResponse);
            };
            let Some(header) = headers.into_iter().next() else {
                continue;
            };
            let theirs = seal_header(header).hash;
            if store.main_chain_hash(height)? == Some(theirs) {
                ancestor_height = height;
                break;
            }
        }

        // Windowed download from the ancestor forward.
        let mut imported = 0u64;
        let mut from = ancestor_height + 1;
        loop {
            *self.phase.lock() = SyncPhase::HeadersRequested;
            let response = peer
                .request(
                    Message::GetBlockHeaders(GetHeadersRequest {
                        start: HeadersStart::FromHeight(from),
                        count: HEADER_WINDOW,
                        ascending: true,
                        skip: 0,
                    }),
                    ResponseKind::Headers,
                    timeout,
                )
                .await?;
            let Message::BlockHeaders(headers) = response else {
                return Err(NetworkError::UnexpectedResponse);
            };
            if headers.is_empty() {
                break;
            }

            // Continuity: consecutive heights, linked hashes.
            let sealed: Vec<_> = headers.into_iter().map(seal_header).collect();
            for (i, header) in sealed.iter().enumerate() {
                let expected_height = from + i as u64;
                if header.header.height != expected_height {
                    self.punish(peer, "non-contiguous header heights").await?;
                    return Err(NetworkError::UnexpectedResponse);
                }
                if i > 0 && header.header.previous_hash != sealed[i - 1].hash {
                    self.punish(peer, "broken header linkage").await?;
                    return Err(NetworkError::UnexpectedResponse);
                }
            }

            *self.phase.lock() = SyncPhase::BodiesRequested;
            let hashes: Vec<_> = sealed.iter().map(|h| h.hash).collect();
            let response = peer
                .request(
                    Message::GetBlockBodies(hashes),
                    ResponseKind::Bodies,
                    timeout,
                )
                .await?;
            let Message::BlockBodies(bodies) = response else {
                return Err(NetworkError::UnexpectedResponse);
            };
            if bodies.len() != sealed.len() {
                self.punish(peer, "body count mismatch").await?;
                return Err(NetworkError::UnexpectedResponse);
            }

            *self.phase.lock() = SyncPhase::Validating;
            let window_len = sealed.len();
            for (header, transactions) in sealed.into_iter().zip(bodies) {
                let block = SealedBlock {
                    header,
                    transactions,
                };
                let hash = block.hash();
                let engine = engine.clone();
                let from_peer = peer.identity;
                let outcome = tokio::task::spawn_blocking(move || {
                    engine.import_block(block, ConnectedSource::Sync, Some(from_peer))
                })
                .await
                .map_err(|e| NetworkError::Handshake(format!("import task failed: {e}")))?;

                match outcome {
                    Ok(_) => imported += 1,
                    Err(ChainError::InvalidBlock { reason, .. }) => {
                        warn!(peer = %peer.identity, block = %hash, %reason,
                            "invalid block during sync");
                        self.punish(peer, "invalid synced block").await?;
                        return Ok(imported);
                    }
                    Err(e) => {
                        warn!(block = %hash, error = %e, "sync import failed");
                        return Ok(imported);
                    }
                }
            }

            from += window_len as u64;
            if window_len < HEADER_WINDOW as usize {
                break;
            }
        }
        Ok(imported)
    }

    async fn punish(&self, peer: &Arc<Peer>, why: &str) -> Result<(), NetworkError> {
        debug!(peer = %peer.identity, why, "penalizing peer");
        self.manager
            .reputation()
            .record_failure(&peer.identity, now_ms())?;
        Ok(())
    }
}

/// Heights to probe when locating the common ancestor: the tip, then
/// exponentially larger steps back, then genesis.
fn locator_heights(tip: u64) -> Vec<u64> {
    let mut heights = Vec::new();
    let mut step = 1u64;
    let mut height = tip;
    loop {
        heights.push(height);
        if height == 0 {
            break;
        }
        height = height.saturating_sub(step);
        if heights.len() > 8 {
            step *= 2;
        }
    }
    heights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_starts_at_tip_and_ends_at_genesis() {
        let heights = locator_heights(100);
        assert_eq!(heights.first(), Some(&100));
        assert_eq!(heights.last(), Some(&0));
        // Strictly decreasing.
        for pair in heights.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_locator_of_genesis() {
        assert_eq!(locator_heights(0), vec![0]);
    }

    #[test]
    fn test_locator_is_logarithmic_for_deep_chains() {
        let heights = locator_heights(1_000_000);
        assert!(heights.len() < 64, "got {} locator heights", heights.len());
    }
}
