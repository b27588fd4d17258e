//! # Shared Types Crate
//!
//! This crate contains all cross-subsystem domain entities for the Ember
//! node: hashes, addresses, signatures, transactions, blocks, world-state
//! entities, block events, and the immutable network settings value.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a subsystem
//!   boundary is defined here.
//! - **Data only**: no I/O, no cryptography, no encoding. Canonical
//!   serialization lives in `ember-codec`, hashing and signatures in
//!   `shared-crypto`.
//! - **Explicit settings**: network parameters are threaded through
//!   constructors as a shared [`NetworkSettings`] value, never read from
//!   process-wide mutable state.

pub mod block;
pub mod events;
pub mod primitives;
pub mod settings;
pub mod state;
pub mod transaction;

pub use block::*;
pub use events::*;
pub use primitives::*;
pub use settings::NetworkSettings;
pub use state::*;
pub use transaction::*;
