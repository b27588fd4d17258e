//! # Ember Chain Crate
//!
//! The consensus core. Blocks from the miner, peer broadcast, sync, or a
//! reorg path all funnel into [`ChainEngine::import_block`], which holds
//! the master chain lock, validates against a world state positioned at
//! the parent's root, applies atomically, and publishes events only after
//! the owning batch committed.
//!
//! ## Modules
//!
//! - [`validation`]: stateless and stateful transaction checks.
//! - [`difficulty`]: the ASERT per-block retarget rule.
//! - [`apply`]: transaction and proposal application to a world state.
//! - [`engine`]: connect, disconnect, and the atomic reorg swap.
//! - [`genesis`]: deterministic genesis construction and bootstrap.

pub mod apply;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod validation;

pub use engine::{ChainEngine, ImportOutcome, TipInfo};
pub use error::{ChainError, InvalidBlockReason, InvalidTxReason};
pub use genesis::{bootstrap, build_genesis, GenesisSpec};
pub use validation::{validate_stateful, validate_stateless, NonceRule};
