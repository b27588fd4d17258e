//! # Ember Miner Crate
//!
//! One orchestration thread assembles candidates and submits solved
//! blocks; N worker threads grind the nonce space. The proof-of-work
//! function itself sits behind `shared_crypto::PowHasher`; the bundled
//! CPU hasher only serves development networks.
//!
//! A candidate is built on a lazy-diff world state: most candidates are
//! discarded when the tip moves, and their diffs are never materialized.

pub mod miner;

pub use miner::{Miner, MinerConfig};
