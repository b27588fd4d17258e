//! # Peer Manager
//!
//! Owns every live connection: the listener, the handshake, per-peer
//! reader and writer tasks, gossip fan-out, and the known-address table
//! the dialer and the directory client feed.
//!
//! Inbound blocks go to the chain engine on the blocking pool so the
//! async workers never sit on the master chain lock; inbound
//! transactions go straight to the mempool against a fresh tip snapshot.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use ember_chain::{ChainEngine, ChainError};
use ember_mempool::Mempool;
use ember_state::WorldState;
use shared_bus::{ChainEvent, EventBus, EventFilter, EventTopic, MempoolAddReason};
use shared_crypto::NodeIdentity;
use shared_types::{
    Address, BlockHeader, ConnectedSource, Hash, NetworkSettings, SealedTransaction,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::error::NetworkError;
use crate::framing::{read_frame, write_frame};
use crate::handshake::{build_status, verify_status};
use crate::messages::{GetHeadersRequest, HeadersStart, Message, StatusPayload};
use crate::peer::Peer;
use crate::reputation::PeerReputationStore;
use crate::HEADER_WINDOW;

/// A peer we know how to reach but are not necessarily connected to.
#[derive(Debug, Clone)]
pub struct KnownAddress {
    pub host: String,
    pub port: u16,
    pub updated_at: u64,
}

/// The connection table and its tasks.
pub struct PeerManager {
    settings: Arc<NetworkSettings>,
    config: P2pConfig,
    identity: Arc<NodeIdentity>,
    engine: Arc<ChainEngine>,
    mempool: Arc<Mempool>,
    reputation: Arc<PeerReputationStore>,
    bus: Arc<EventBus>,
    peers: DashMap<Address, Arc<Peer>>,
    known_addresses: DashMap<Address, KnownAddress>,
    /// Poked when a peer announces a block we cannot attach.
    sync_wakeup: Notify,
}

impl PeerManager {
    #[must_use]
    pub fn new(
        settings: Arc<NetworkSettings>,
        config: P2pConfig,
        identity: Arc<NodeIdentity>,
        engine: Arc<ChainEngine>,
        mempool: Arc<Mempool>,
        reputation: Arc<PeerReputationStore>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            config,
            identity,
            engine,
            mempool,
            reputation,
            bus,
            peers: DashMap::new(),
            known_addresses: DashMap::new(),
            sync_wakeup: Notify::new(),
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Bind the listener and spawn the accept loop, the gossip task, and
    /// the dialer. Returns once the listener is bound.
    pub async fn start(self: &Arc<Self>) -> Result<(), NetworkError> {
        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(host = %self.config.host, port = self.config.port, "p2p listener bound");

        let accept_mgr = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!(%addr, "inbound connection");
                        let mgr = accept_mgr.clone();
                        tokio::spawn(async move {
                            if let Err(e) = mgr.run_connection(stream, false).await {
                                debug!(%addr, error = %e, "inbound connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(250)).await;
                    }
                }
            }
        });

        let gossip_mgr = self.clone();
        tokio::spawn(async move { gossip_mgr.run_block_gossip().await });

        let dial_mgr = self.clone();
        tokio::spawn(async move { dial_mgr.run_dialer().await });

        Ok(())
    }

    /// Relay freshly connected local and broadcast blocks to every peer
    /// except the one that sent them.
    async fn run_block_gossip(self: Arc<Self>) {
        let mut sub = self.bus.subscribe(EventFilter::topics(vec![EventTopic::Chain]));
        while let Some(event) = sub.recv().await {
            if let ChainEvent::BlockConnected { block, source, .. } = event {
                if !matches!(
                    source,
                    ConnectedSource::Miner | ConnectedSource::Broadcast
                ) {
                    continue;
                }
                self.gossip_block_inner(&Message::NewBlock(block.block.clone()), block.received_from)
                    .await;
            }
        }
    }

    /// Dial manual and directory peers while below the connection cap.
    async fn run_dialer(self: Arc<Self>) {
        loop {
            if self.peers.len() < self.config.max_peers {
                let mut targets: Vec<String> = self.config.manual_peers.clone();
                for entry in self.known_addresses.iter() {
                    if self.peers.contains_key(entry.key()) {
                        continue;
                    }
                    if !self
                        .reputation
                        .is_dialable(entry.key(), now_ms())
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    targets.push(format!("{}:{}", entry.value().host, entry.value().port));
                }
                for target in targets {
                    if self.peers.len() >= self.config.max_peers {
                        break;
                    }
                    if let Err(e) = self.connect_to(&target).await {
                        debug!(%target, error = %e, "dial failed");
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    /// Dial one peer and run its connection to completion in a task.
    pub async fn connect_to(self: &Arc<Self>, addr: &str) -> Result<(), NetworkError> {
        let stream = TcpStream::connect(addr).await?;
        let mgr = self.clone();
        let addr = addr.to_string();
        tokio::spawn(async move {
            if let Err(e) = mgr.run_connection(stream, true).await {
                debug!(%addr, error = %e, "outbound connection ended");
            }
        });
        Ok(())
    }

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Handshake, register, then pump inbound messages until the
    /// connection dies. Cleans the table up on the way out.
    async fn run_connection(
        self: Arc<Self>,
        stream: TcpStream,
        outbound: bool,
    ) -> Result<(), NetworkError> {
        let remote = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (mut reader, mut writer) = stream.into_split();

        let (peer, receiver) = match self
            .handshake(&mut reader, &mut writer, &remote, outbound)
            .await
        {
            Ok(established) => established,
            Err(e) => {
                // A failed handshake from a known identity costs it.
                debug!(%remote, error = %e, "handshake failed");
                return Err(e);
            }
        };
        info!(peer = %peer.identity, %remote, outbound, "peer connected");

        spawn_writer(peer.identity, writer, receiver);
        self.spawn_keepalive(peer.clone());
        self.spawn_mempool_exchange(peer.clone());

        let result = self.read_loop(&peer, &mut reader).await;

        self.peers.remove(&peer.identity);
        info!(peer = %peer.identity, "peer disconnected");
        if let Err(e) = &result {
            if matches!(
                e,
                NetworkError::FrameTooLarge { .. } | NetworkError::Codec(_) | NetworkError::Seal(_)
            ) {
                let _ = self.reputation.record_failure(&peer.identity, now_ms());
            }
        }
        result
    }

    async fn handshake(
        self: &Arc<Self>,
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
        remote: &str,
        outbound: bool,
    ) -> Result<(Arc<Peer>, mpsc::Receiver<Message>), NetworkError> {
        write_frame(writer, &Message::Status(self.our_status()?).encode()).await?;

        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let frame = tokio::time::timeout(timeout, read_frame(reader))
            .await
            .map_err(|_| NetworkError::Timeout)??;
        let Message::Status(status) = Message::decode(&frame)? else {
            return Err(NetworkError::Handshake(
                "first message was not a status".to_string(),
            ));
        };
        verify_status(&status, &self.settings)?;

        let identity = status.node_identity;
        if identity == self.identity.address() {
            return Err(NetworkError::Handshake("connected to self".to_string()));
        }
        if !self.reputation.is_dialable(&identity, now_ms())? {
            return Err(NetworkError::PeerBanned(identity));
        }
        if self.peers.contains_key(&identity) {
            return Err(NetworkError::DuplicatePeer(identity));
        }
        if self.peers.len() >= self.config.max_peers {
            return Err(NetworkError::Handshake("at connection capacity".to_string()));
        }

        let (peer, receiver) = Peer::new(
            identity,
            remote.to_string(),
            outbound,
            &status,
            self.config.outbound_queue,
            now_ms(),
        );
        self.peers.insert(identity, peer.clone());

        // A peer strictly ahead of us is worth a sync round.
        if status.total_difficulty > self.engine.tip().cumulative_difficulty {
            self.sync_wakeup.notify_one();
        }
        Ok((peer, receiver))
    }

    async fn read_loop(
        self: &Arc<Self>,
        peer: &Arc<Peer>,
        reader: &mut OwnedReadHalf,
    ) -> Result<(), NetworkError> {
        loop {
            let frame = read_frame(reader).await?;
            let message = Message::decode(&frame)?;
            self.handle_message(peer, message).await?;
        }
    }

    /// One-shot mempool reconciliation after connect: learn the peer's
    /// pooled hashes, fetch the ones we miss, admit what validates.
    fn spawn_mempool_exchange(self: &Arc<Self>, peer: Arc<Peer>) {
        let mgr = self.clone();
        tokio::spawn(async move {
            let timeout = mgr.request_timeout();
            let response = peer
                .request(
                    Message::GetMempoolHashes,
                    crate::peer::ResponseKind::MempoolHashes,
                    timeout,
                )
                .await;
            let Ok(Message::MempoolHashes(hashes)) = response else {
                return;
            };
            let missing: Vec<Hash> = hashes
                .into_iter()
                .filter(|h| !mgr.mempool.contains(h))
                .collect();
            if missing.is_empty() {
                return;
            }

            let response = peer
                .request(
                    Message::GetMempoolTransactions(missing),
                    crate::peer::ResponseKind::MempoolTransactions,
                    timeout,
                )
                .await;
            let Ok(Message::MempoolTransactions(pairs)) = response else {
                return;
            };
            let state = mgr.tip_state();
            let mut admitted = 0usize;
            for (_, tx) in pairs {
                if mgr
                    .mempool
                    .add(tx, MempoolAddReason::New, &state)
                    .is_ok()
                {
                    admitted += 1;
                }
            }
            debug!(peer = %peer.identity, admitted, "mempool exchange complete");
        });
    }

    fn spawn_keepalive(self: &Arc<Self>, peer: Arc<Peer>) {
        let mgr = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !mgr.peers.contains_key(&peer.identity) {
                    break;
                }
                let Ok(status) = mgr.our_status() else { break };
                if peer.send(Message::Ping(status)).await.is_err() {
                    break;
                }
            }
        });
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    async fn handle_message(
        self: &Arc<Self>,
        peer: &Arc<Peer>,
        message: Message,
    ) -> Result<(), NetworkError> {
        match message {
            Message::Status(status) | Message::Pong(status) => {
                peer.update_status(&status, now_ms());
            }
            Message::Ping(status) => {
                peer.update_status(&status, now_ms());
                peer.send(Message::Pong(self.our_status()?)).await?;
            }

            Message::NewBlock(block) => {
                self.handle_new_block(peer, block).await;
            }
            Message::NewMempoolTx(tx) => {
                self.handle_new_tx(peer, tx).await;
            }

            Message::GetBlockHeaders(request) => {
                let headers = self.serve_headers(request)?;
                peer.send(Message::BlockHeaders(headers)).await?;
            }
            Message::GetBlockBodies(hashes) => {
                let bodies = self.serve_bodies(&hashes)?;
                peer.send(Message::BlockBodies(bodies)).await?;
            }
            Message::GetMempoolHashes => {
                peer.send(Message::MempoolHashes(self.mempool.all_hashes()))
                    .await?;
            }
            Message::GetMempoolTransactions(hashes) => {
                let pairs = hashes
                    .iter()
                    .filter_map(|h| self.mempool.get(h).map(|tx| (*h, (*tx).clone())))
                    .collect();
                peer.send(Message::MempoolTransactions(pairs)).await?;
            }

            response @ (Message::BlockHeaders(_)
            | Message::BlockBodies(_)
            | Message::MempoolHashes(_)
            | Message::MempoolTransactions(_)) => {
                if let Some(unclaimed) = peer.fulfill(response) {
                    debug!(peer = %peer.identity, code = unclaimed.code(),
                        "unsolicited response dropped");
                }
            }
        }
        Ok(())
    }

    async fn handle_new_block(self: &Arc<Self>, peer: &Arc<Peer>, block: shared_types::SealedBlock) {
        let hash = block.hash();
        // Duplicate announcements are normal gossip noise.
        if matches!(self.engine.store().has_block(&hash), Ok(true)) {
            return;
        }

        let engine = self.engine.clone();
        let from = peer.identity;
        let outcome = tokio::task::spawn_blocking(move || {
            engine.import_block(block, ConnectedSource::Broadcast, Some(from))
        })
        .await;

        match outcome {
            Ok(Ok(_)) => {
                let _ = self.reputation.record_success(&peer.identity, now_ms());
            }
            Ok(Err(ChainError::UnknownParent { .. })) => {
                debug!(peer = %peer.identity, block = %hash, "block ahead of us, waking sync");
                self.sync_wakeup.notify_one();
            }
            Ok(Err(ChainError::InvalidBlock { reason, .. })) => {
                warn!(peer = %peer.identity, block = %hash, %reason, "invalid block from peer");
                let _ = self.reputation.record_failure(&peer.identity, now_ms());
            }
            Ok(Err(e)) => warn!(block = %hash, error = %e, "block import failed"),
            Err(e) => warn!(error = %e, "import task panicked"),
        }
    }

    async fn handle_new_tx(self: &Arc<Self>, peer: &Arc<Peer>, tx: SealedTransaction) {
        if self.mempool.contains(&tx.hash) {
            return;
        }
        let state = self.tip_state();
        match self.mempool.add(tx.clone(), MempoolAddReason::New, &state) {
            Ok(()) => {
                self.gossip_tx(&tx, Some(peer.identity)).await;
            }
            Err(e) => {
                debug!(peer = %peer.identity, tx = %tx.hash, error = %e, "gossip tx rejected");
            }
        }
    }

    // =========================================================================
    // SERVING
    // =========================================================================

    fn serve_headers(&self, request: GetHeadersRequest) -> Result<Vec<BlockHeader>, NetworkError> {
        let store = self.engine.store();
        let start_height = match request.start {
            HeadersStart::FromHeight(height) => height,
            HeadersStart::FromHash(hash) => match store.header(&hash)? {
                Some(header) => header.height,
                None => return Ok(Vec::new()),
            },
        };

        let count = request.count.min(HEADER_WINDOW) as usize;
        let step = u64::from(request.skip) + 1;
        let mut headers = Vec::with_capacity(count);
        let mut height = start_height;
        while headers.len() < count {
            let Some(hash) = store.main_chain_hash(height)? else {
                break;
            };
            if let Some(header) = store.header(&hash)? {
                headers.push(header);
            }
            if request.ascending {
                height = height.saturating_add(step);
            } else {
                if height < step {
                    break;
                }
                height -= step;
            }
        }
        Ok(headers)
    }

    fn serve_bodies(&self, hashes: &[Hash]) -> Result<Vec<Vec<SealedTransaction>>, NetworkError> {
        let store = self.engine.store();
        let mut bodies = Vec::with_capacity(hashes.len());
        for hash in hashes {
            bodies.push(
                store
                    .stored_block(hash)?
                    .map(|b| b.block.transactions)
                    .unwrap_or_default(),
            );
        }
        Ok(bodies)
    }

    // =========================================================================
    // GOSSIP AND SUBMISSION
    // =========================================================================

    /// Admit a locally submitted transaction and announce it everywhere.
    pub async fn submit_local_tx(
        self: &Arc<Self>,
        tx: SealedTransaction,
    ) -> Result<(), ember_mempool::MempoolError> {
        let state = self.tip_state();
        self.mempool.add(tx.clone(), MempoolAddReason::New, &state)?;
        self.gossip_tx(&tx, None).await;
        Ok(())
    }

    async fn gossip_tx(&self, tx: &SealedTransaction, except: Option<Address>) {
        let message = Message::NewMempoolTx(tx.clone());
        for entry in self.peers.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            let _ = entry.value().send(message.clone()).await;
        }
    }

    async fn gossip_block_inner(&self, message: &Message, except: Option<Address>) {
        for entry in self.peers.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            let _ = entry.value().send(message.clone()).await;
        }
    }

    // =========================================================================
    // TABLE ACCESS
    // =========================================================================

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot of connected peers.
    #[must_use]
    pub fn connected_peers(&self) -> Vec<Arc<Peer>> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_peer(&self, identity: &Address) -> Option<Arc<Peer>> {
        self.peers.get(identity).map(|e| e.value().clone())
    }

    /// Await the next hint that sync work exists.
    pub async fn sync_wakeup(&self) {
        self.sync_wakeup.notified().await;
    }

    /// Merge a directory response: upsert everything it lists, forget
    /// everything it does not, reject unsafe hosts. The list order is
    /// meaningless and treated as such.
    pub fn merge_directory_peers(&self, entries: Vec<(Address, KnownAddress)>) {
        let own = self.identity.address();
        let keep: std::collections::HashSet<Address> =
            entries.iter().map(|(addr, _)| *addr).collect();
        self.known_addresses.retain(|addr, _| keep.contains(addr));
        for (address, known) in entries {
            if address == own {
                continue;
            }
            if !self.host_is_safe(&known.host) {
                debug!(peer = %address, host = %known.host, "unsafe directory host rejected");
                continue;
            }
            self.known_addresses.insert(address, known);
        }
    }

    #[must_use]
    pub fn known_address_count(&self) -> usize {
        self.known_addresses.len()
    }

    fn host_is_safe(&self, host: &str) -> bool {
        host_is_safe(host, self.config.allow_private_addresses)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    pub(crate) fn our_status(&self) -> Result<StatusPayload, NetworkError> {
        let tip = self.engine.tip();
        build_status(
            &self.identity,
            &self.settings,
            tip.cumulative_difficulty,
            tip.hash,
            tip.height,
            now_ms(),
        )
    }

    pub(crate) fn tip_state(&self) -> WorldState {
        let tip = self.engine.tip();
        WorldState::create_for_validation(self.engine.store().trie_store(), tip.state_root)
    }

    pub(crate) fn engine(&self) -> Arc<ChainEngine> {
        self.engine.clone()
    }

    pub(crate) fn reputation(&self) -> Arc<PeerReputationStore> {
        self.reputation.clone()
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }
}

fn spawn_writer(identity: Address, mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &message.encode()).await {
                debug!(peer = %identity, error = %e, "write failed, closing");
                break;
            }
        }
    });
}

/// Non-routable and local addresses are rejected from the directory in
/// production; hostnames resolve at dial time and pass through.
pub(crate) fn host_is_safe(host: &str, allow_private: bool) -> bool {
    if allow_private {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            !(v4.is_loopback() || v4.is_private() || v4.is_unspecified() || v4.is_link_local())
        }
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => true,
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_safety_rules() {
        assert!(!host_is_safe("127.0.0.1", false));
        assert!(!host_is_safe("10.1.2.3", false));
        assert!(!host_is_safe("192.168.0.9", false));
        assert!(!host_is_safe("169.254.1.1", false));
        assert!(!host_is_safe("::1", false));
        assert!(host_is_safe("203.0.113.7", false));
        assert!(host_is_safe("seed.example.org", false));
        assert!(host_is_safe("127.0.0.1", true));
    }
}
