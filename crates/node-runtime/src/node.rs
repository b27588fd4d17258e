//! # Node Wiring
//!
//! Builds every subsystem in dependency order, connects them through the
//! bus, and runs until a shutdown signal or a fatal condition. No
//! subsystem holds a reference to another; they share the bus, the
//! store, and read-only world-state snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use ember_chain::{bootstrap, ChainEngine};
use ember_mempool::{Mempool, MempoolConfig};
use ember_miner::{Miner, MinerConfig};
use ember_p2p::{DirectoryClient, NetworkError, P2pConfig, PeerManager, PeerReputationStore, SyncManager};
use ember_state::WorldState;
use ember_storage::{BlockStore, KeyValueStore};
use shared_bus::{ChainEvent, EventBus, EventFilter, EventSink, EventTopic};
use shared_crypto::{CpuPowHasher, NodeIdentity, PowHasher};
use shared_types::{Address, NetworkSettings};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::adapters::RocksDbStore;
use crate::config::NodeConfig;
use crate::exit_codes;
use crate::genesis::genesis_for;

/// Mempool expiry sweep cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A fully wired, running node.
pub struct Node {
    engine: Arc<ChainEngine>,
    mempool: Arc<Mempool>,
    manager: Arc<PeerManager>,
    miner_stop: Option<Arc<AtomicBool>>,
    miner_handle: Option<std::thread::JoinHandle<()>>,
    fatal_rx: mpsc::Receiver<i32>,
}

impl Node {
    /// Start from configuration and run to completion; the return value
    /// is the process exit code.
    pub async fn run(config: NodeConfig) -> i32 {
        match Self::start(config).await {
            Ok(node) => node.wait_for_shutdown().await,
            Err(e) => {
                error!(error = %e, "initialization failed");
                exit_codes::INIT_FAILURE
            }
        }
    }

    /// Build and launch every subsystem.
    pub async fn start(config: NodeConfig) -> anyhow::Result<Node> {
        config.validate()?;
        let settings = Arc::new(
            NetworkSettings::by_name(&config.network)
                .ok_or_else(|| anyhow!("unknown network {:?}", config.network))?,
        );
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        check_disk_space(&config);

        let identity = Arc::new(
            NodeIdentity::load_or_create(&config.identity_path())
                .context("loading node identity")?,
        );
        info!(identity = %identity.address(), network = %config.network, "node identity ready");

        let kv: Arc<dyn KeyValueStore> =
            RocksDbStore::open_at(config.data_dir.join("db")).context("opening database")?;
        let store = Arc::new(BlockStore::open(kv.clone()));

        let genesis_hash = bootstrap(&store, &genesis_for(&config.network), &settings)
            .context("genesis bootstrap")?;
        info!(genesis = %genesis_hash, "chain store ready");

        let bus = Arc::new(EventBus::new());
        // The memory-hard production hasher is supplied by the embedder;
        // the CPU reference hasher backs development networks.
        let pow: Arc<dyn PowHasher> = Arc::new(CpuPowHasher);

        let engine = Arc::new(ChainEngine::new(
            store.clone(),
            settings.clone(),
            pow.clone(),
            bus.clone() as Arc<dyn EventSink>,
        )?);
        let mempool = Arc::new(Mempool::new(
            settings.clone(),
            MempoolConfig {
                max_bytes: config.mempool.max_bytes,
                max_count: config.mempool.max_count,
                ttl_ms: config.mempool.ttl_ms,
                min_acceptable_fee: config.mempool.min_acceptable_fee,
            },
            bus.clone() as Arc<dyn EventSink>,
        ));
        let reputation = Arc::new(PeerReputationStore::new(kv));

        let p2p_config = P2pConfig {
            host: config.p2p.host.clone(),
            port: config.p2p.port,
            max_peers: config.p2p.max_peers,
            directory_host: config.directory.host.clone(),
            directory_ping_interval_ms: config.directory.ping_interval_ms,
            directory_disabled: config.directory.disable,
            manual_peers: config.directory.manual_peers.clone(),
            allow_private_addresses: config.p2p.allow_private_addresses,
            ..P2pConfig::default()
        };
        let manager = PeerManager::new(
            settings.clone(),
            p2p_config.clone(),
            identity.clone(),
            engine.clone(),
            mempool.clone(),
            reputation,
            bus.clone(),
        );
        manager.start().await.context("starting p2p listener")?;

        let sync = SyncManager::new(manager.clone());
        tokio::spawn(sync.run());

        spawn_mempool_maintenance(bus.clone(), engine.clone(), mempool.clone());
        spawn_sweep_timer(mempool.clone());

        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        if !config.directory.disable && !config.directory.host.is_empty() {
            let directory_identity = parse_address(&config.directory.identity)
                .context("directory.identity")?;
            let client = DirectoryClient::new(
                manager.clone(),
                identity.clone(),
                settings.clone(),
                p2p_config,
                directory_identity,
            );
            let fatal = fatal_tx.clone();
            tokio::spawn(async move {
                if let Err(NetworkError::VersionTooOld) = client.run().await {
                    let _ = fatal.send(exit_codes::VERSION_TOO_OLD).await;
                }
            });
        }

        let (miner_stop, miner_handle) = if config.mining.enabled {
            let coinbase = if config.mining.coinbase.is_empty() {
                None
            } else {
                Some(parse_address(&config.mining.coinbase).context("mining.coinbase")?)
            };
            let miner = Miner::new(
                engine.clone(),
                mempool.clone(),
                settings.clone(),
                identity.clone(),
                pow,
                MinerConfig {
                    enabled: true,
                    threads: config.mining.threads,
                    coinbase,
                },
            );
            let stop = miner.stop_handle();
            (Some(stop), Some(miner.spawn()))
        } else {
            (None, None)
        };

        info!("node started");
        Ok(Node {
            engine,
            mempool,
            manager,
            miner_stop,
            miner_handle,
            fatal_rx,
        })
    }

    /// Block until ctrl-c or a fatal task condition, then shut down
    /// gracefully: the miner finishes its current attempt, in-flight
    /// chain work completes, pending peer writes may be dropped.
    pub async fn wait_for_shutdown(mut self) -> i32 {
        let code = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                exit_codes::OK
            }
            Some(code) = self.fatal_rx.recv() => code,
        };

        if let Some(stop) = &self.miner_stop {
            stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.miner_handle.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        let tip = self.engine.tip();
        info!(
            tip = %tip.hash,
            height = tip.height,
            pooled = self.mempool.len(),
            peers = self.manager.peer_count(),
            "node stopped"
        );
        code
    }

    #[must_use]
    pub fn engine(&self) -> Arc<ChainEngine> {
        self.engine.clone()
    }

    #[must_use]
    pub fn mempool(&self) -> Arc<Mempool> {
        self.mempool.clone()
    }
}

/// Keep the mempool aligned with tip movement: drop mined and stale
/// transactions on connect, re-admit on disconnect. Disconnect events of
/// a swap arrive before its connect events, in publication order.
fn spawn_mempool_maintenance(
    bus: Arc<EventBus>,
    engine: Arc<ChainEngine>,
    mempool: Arc<Mempool>,
) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Chain]));
        while let Some(event) = sub.recv().await {
            let tip = engine.tip();
            let state =
                WorldState::create_for_validation(engine.store().trie_store(), tip.state_root);
            match event {
                ChainEvent::BlockConnected { block, .. } => {
                    mempool.on_block_connected(&block, &state);
                }
                ChainEvent::BlockDisconnected { block } => {
                    mempool.on_block_disconnected(&block, &state);
                }
                ChainEvent::Reorg {
                    old_height,
                    new_height,
                    ..
                } => {
                    info!(old_height, new_height, "reorg completed");
                }
                _ => {}
            }
        }
    });
}

fn spawn_sweep_timer(mempool: Arc<Mempool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            mempool.sweep_expired();
        }
    });
}

fn parse_address(hex_str: &str) -> anyhow::Result<Address> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| anyhow!("invalid hex address: {e}"))?;
    Address::from_slice(&bytes).ok_or_else(|| anyhow!("address must be 20 bytes"))
}

fn check_disk_space(config: &NodeConfig) {
    match fs2::available_space(&config.data_dir) {
        Ok(available) if available < 1024 * 1024 * 1024 => {
            warn!(available, "less than 1 GiB of disk space available");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "cannot determine available disk space"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = parse_address("00112233445566778899aabbccddeeff00112233").unwrap();
        assert_eq!(addr.as_bytes()[0], 0x00);
        assert_eq!(addr.as_bytes()[19], 0x33);
        assert!(parse_address("0x00112233445566778899aabbccddeeff00112233").is_ok());
        assert!(parse_address("abcd").is_err());
        assert!(parse_address("zz112233445566778899aabbccddeeff00112233").is_err());
    }
}
