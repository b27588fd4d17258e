//! # Runtime Adapters
//!
//! Production implementations of the storage ports.

pub mod rocksdb_store;

pub use rocksdb_store::{RocksDbConfig, RocksDbStore};
