//! # Shared Crypto Crate
//!
//! The cryptographic boundary of the node: Keccak-256 content hashing,
//! the recoverable ECDSA signature scheme, node identity keys, and the
//! proof-of-work hasher trait.
//!
//! Consensus code never touches curve or digest types directly; it works
//! with `shared-types` primitives and the functions and traits exported
//! here. The production memory-hard proof-of-work function is supplied by
//! the embedder through [`PowHasher`]; the bundled CPU hasher exists for
//! development mining and tests.

pub mod hashing;
pub mod identity;
pub mod signature;

pub use hashing::{keccak256, CpuPowHasher, PowHasher};
pub use identity::NodeIdentity;
pub use signature::{recover_signer, sign_hash, CryptoError};
