//! # P2P Configuration

use crate::REQUEST_TIMEOUT_MS;

/// Transport and directory settings.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Bind host for the listener.
    pub host: String,
    /// Bind port for the listener.
    pub port: u16,
    /// Outbound connection cap.
    pub max_peers: usize,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Outbound queue length per peer before shedding.
    pub outbound_queue: usize,
    /// Directory endpoint, e.g. `https://directory.example.org`.
    /// Empty when the directory is disabled.
    pub directory_host: String,
    pub directory_ping_interval_ms: u64,
    pub directory_disabled: bool,
    /// Fixed peer list used instead of (or in addition to) the directory,
    /// as `host:port` strings.
    pub manual_peers: Vec<String>,
    /// Accept non-routable peer addresses; development only.
    pub allow_private_addresses: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 30_384,
            max_peers: 32,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            outbound_queue: 512,
            directory_host: String::new(),
            directory_ping_interval_ms: 30_000,
            directory_disabled: false,
            manual_peers: Vec::new(),
            allow_private_addresses: false,
        }
    }
}
