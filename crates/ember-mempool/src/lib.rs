//! # Ember Mempool Crate
//!
//! The in-memory queue of validated but unincluded transactions.
//!
//! ## Indices
//!
//! - `by_hash`: O(1) lookup and duplicate detection.
//! - `by_sender`: nonce-ordered transactions per account, the unit of
//!   selection and of replace-by-fee.
//! - `by_price`: fee-per-byte order for selection and eviction.
//!
//! ## Admission
//!
//! Stateless validation, stateful validation with the nonce rule relaxed
//! to a bounded future window, the fee floor, then replace-by-fee for a
//! nonce collision. Every add and remove is announced on the bus.

pub mod config;
pub mod error;
pub mod pool;
pub mod service;

pub use config::MempoolConfig;
pub use error::MempoolError;
pub use service::{FeeStatistics, Mempool};
