//! # Peer Handle
//!
//! One live connection: a bounded outbound queue with shedding, the
//! peer's announced chain position, and the single in-flight
//! request/response slot the sync machine uses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::{Address, Hash, U256};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::error::NetworkError;
use crate::messages::{Message, StatusPayload};

/// What a pending request expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Headers,
    Bodies,
    MempoolHashes,
    MempoolTransactions,
}

impl ResponseKind {
    fn matches(self, msg: &Message) -> bool {
        matches!(
            (self, msg),
            (ResponseKind::Headers, Message::BlockHeaders(_))
                | (ResponseKind::Bodies, Message::BlockBodies(_))
                | (ResponseKind::MempoolHashes, Message::MempoolHashes(_))
                | (
                    ResponseKind::MempoolTransactions,
                    Message::MempoolTransactions(_)
                )
        )
    }
}

struct PendingRequest {
    kind: ResponseKind,
    reply: oneshot::Sender<Message>,
}

/// The peer's last announced chain position.
#[derive(Debug, Clone, Copy)]
pub struct PeerChainState {
    pub total_difficulty: U256,
    pub head_hash: Hash,
    pub head_height: u64,
    pub last_seen_ms: u64,
}

/// A connected peer.
pub struct Peer {
    pub identity: Address,
    pub remote_addr: String,
    /// True when we dialed the peer.
    pub outbound: bool,
    state: Mutex<PeerChainState>,
    sender: mpsc::Sender<Message>,
    pending: Mutex<Option<PendingRequest>>,
    last_sync_ms: AtomicU64,
}

impl Peer {
    /// Build the handle and the queue the writer task drains.
    pub fn new(
        identity: Address,
        remote_addr: String,
        outbound: bool,
        status: &StatusPayload,
        queue_len: usize,
        now_ms: u64,
    ) -> (std::sync::Arc<Peer>, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(queue_len.max(1));
        let peer = std::sync::Arc::new(Peer {
            identity,
            remote_addr,
            outbound,
            state: Mutex::new(PeerChainState {
                total_difficulty: status.total_difficulty,
                head_hash: status.head_hash,
                head_height: status.head_height,
                last_seen_ms: now_ms,
            }),
            sender,
            pending: Mutex::new(None),
            last_sync_ms: AtomicU64::new(0),
        });
        (peer, receiver)
    }

    /// Queue a message for the writer. Sheddable gossip is dropped when
    /// the queue is full; everything else waits for space.
    pub async fn send(&self, msg: Message) -> Result<(), NetworkError> {
        if msg.sheddable() {
            match self.sender.try_send(msg) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    trace!(peer = %self.identity, code = dropped.code(),
                        "outbound queue full, gossip shed");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(NetworkError::ConnectionClosed)
                }
            }
        } else {
            self.sender
                .send(msg)
                .await
                .map_err(|_| NetworkError::ConnectionClosed)
        }
    }

    /// Issue a request and await its matching response. One request may
    /// be in flight per peer; the timeout frees the slot and counts as a
    /// peer failure at the caller.
    pub async fn request(
        &self,
        msg: Message,
        kind: ResponseKind,
        timeout: Duration,
    ) -> Result<Message, NetworkError> {
        let (reply, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(NetworkError::UnexpectedResponse);
            }
            *pending = Some(PendingRequest { kind, reply });
        }

        if let Err(e) = self.send(msg).await {
            self.pending.lock().take();
            return Err(e);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(NetworkError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().take();
                Err(NetworkError::Timeout)
            }
        }
    }

    /// Route a response message into the pending slot. Returns the
    /// message back when nothing was waiting for it.
    pub fn fulfill(&self, msg: Message) -> Option<Message> {
        let mut pending = self.pending.lock();
        match pending.take() {
            Some(req) if req.kind.matches(&msg) => {
                // A dropped receiver just means the requester gave up.
                let _ = req.reply.send(msg);
                None
            }
            Some(req) => {
                *pending = Some(req);
                Some(msg)
            }
            None => Some(msg),
        }
    }

    pub fn update_status(&self, status: &StatusPayload, now_ms: u64) {
        let mut state = self.state.lock();
        state.total_difficulty = status.total_difficulty;
        state.head_hash = status.head_hash;
        state.head_height = status.head_height;
        state.last_seen_ms = now_ms;
    }

    #[must_use]
    pub fn chain_state(&self) -> PeerChainState {
        *self.state.lock()
    }

    pub fn mark_synced(&self, now_ms: u64) {
        self.last_sync_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Last time this peer served a sync round; the least-recently-used
    /// peer wins ties during selection.
    #[must_use]
    pub fn last_synced_ms(&self) -> u64 {
        self.last_sync_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Signature;

    fn status() -> StatusPayload {
        StatusPayload {
            network_id: 1,
            protocol_version: 1,
            software_version: "test".to_string(),
            node_identity: Address([1; 20]),
            total_difficulty: U256::from(5u64),
            head_hash: Hash([2; 32]),
            head_height: 3,
            timestamp: 0,
            signature: Signature([0; 65]),
        }
    }

    fn peer(queue: usize) -> (std::sync::Arc<Peer>, mpsc::Receiver<Message>) {
        Peer::new(Address([1; 20]), "127.0.0.1:1".to_string(), true, &status(), queue, 0)
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (peer, mut rx) = peer(8);

        let requester = {
            let peer = peer.clone();
            tokio::spawn(async move {
                peer.request(
                    Message::GetMempoolHashes,
                    ResponseKind::MempoolHashes,
                    Duration::from_secs(1),
                )
                .await
            })
        };

        // The writer side sees the request; the reader side fulfills it.
        let outgoing = rx.recv().await.unwrap();
        assert!(matches!(outgoing, Message::GetMempoolHashes));
        assert!(peer.fulfill(Message::MempoolHashes(vec![])).is_none());

        let response = requester.await.unwrap().unwrap();
        assert!(matches!(response, Message::MempoolHashes(_)));
    }

    #[tokio::test]
    async fn test_request_timeout_frees_slot() {
        let (peer, _rx) = peer(8);
        let err = peer
            .request(
                Message::GetMempoolHashes,
                ResponseKind::MempoolHashes,
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Timeout));

        // The slot is free again.
        assert!(peer.pending.lock().is_none());
    }

    #[tokio::test]
    async fn test_mismatched_response_is_returned() {
        let (peer, _rx) = peer(8);
        // No pending request: the message comes back for normal handling.
        let msg = Message::BlockHeaders(vec![]);
        assert!(peer.fulfill(msg).is_some());
    }

    #[tokio::test]
    async fn test_gossip_shed_when_queue_full() {
        let (peer, mut rx) = peer(1);
        let tx = dummy_tx();
        peer.send(Message::NewMempoolTx(tx.clone())).await.unwrap();
        // Queue of one is now full; this one is shed silently.
        peer.send(Message::NewMempoolTx(tx)).await.unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    fn dummy_tx() -> shared_types::SealedTransaction {
        shared_types::SealedTransaction {
            transaction: shared_types::Transaction {
                version: 1,
                tx_type: shared_types::TxType::Transfer,
                network: 1,
                timestamp: 0,
                nonce: 1,
                recipient: Some(Address([1; 20])),
                amount: Some(U256::one()),
                fee: 1,
                token_address: Some(Address::NATIVE_TOKEN),
                payload: None,
                reference_hash: None,
                message: None,
                signature: Signature([0; 65]),
            },
            hash: Hash([5; 32]),
            sender: Address([6; 20]),
            size: 10,
        }
    }
}
