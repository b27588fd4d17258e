//! # Node Runtime
//!
//! Everything that turns the subsystem crates into a running node:
//! configuration loading, the RocksDB storage adapter, genesis selection,
//! wiring, and the shutdown path. The binary in `main.rs` is a thin shell
//! over [`node::Node`].

pub mod adapters;
pub mod config;
pub mod genesis;
pub mod node;

pub use config::NodeConfig;
pub use node::Node;

/// Process exit codes.
pub mod exit_codes {
    /// Clean shutdown.
    pub const OK: i32 = 0;
    /// Fatal initialization failure: database corruption, genesis
    /// mismatch, unreadable identity.
    pub const INIT_FAILURE: i32 = 1;
    /// The directory rejected our software version.
    pub const VERSION_TOO_OLD: i32 = 2;
}
