//! # RocksDB Storage Adapter
//!
//! Production implementation of the column-family key/value port.
//!
//! ## Features
//!
//! - Atomic multi-family batches through `WriteBatch`
//! - One column family per logical family
//! - Snappy compression
//! - Bloom filters for read-heavy hash lookups
//!
//! Tuned for blockchain workloads: a large block cache, level
//! compaction, and synced writes so a committed batch survives power
//! loss.

use std::path::Path;
use std::sync::Arc;

use ember_storage::{BatchOp, Family, KeyValueStore, StoreError};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};

/// RocksDB tuning knobs.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: String,
    /// Block cache size in bytes.
    pub block_cache_size: usize,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    /// fsync after each batch.
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/db".to_string(),
            block_cache_size: 256 * 1024 * 1024,
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 3,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Smaller buffers, no sync; test and dev databases.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed `KeyValueStore`.
pub struct RocksDbStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbStore {
    /// Open or create the database with every column family.
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let descriptors: Vec<ColumnFamilyDescriptor> = Family::all()
            .iter()
            .map(|family| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(family.name(), cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, descriptors)
            .map_err(|e| StoreError::Io(format!("open rocksdb: {e}")))?;

        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    /// Open at a path with defaults.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Arc<Self>, StoreError> {
        let config = RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..RocksDbConfig::default()
        };
        Ok(Arc::new(Self::open(config)?))
    }

    fn cf(&self, family: Family) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(family.name())
            .ok_or_else(|| StoreError::Io(format!("missing column family {}", family.name())))
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, family: Family, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(family)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Io(format!("rocksdb get: {e}")))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { family, key, value } => {
                    batch.put_cf(self.cf(family)?, key, value);
                }
                BatchOp::Delete { family, key } => {
                    batch.delete_cf(self.cf(family)?, key);
                }
            }
        }
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StoreError::Io(format!("rocksdb batch write: {e}")))
    }

    fn scan_prefix(
        &self,
        family: Family,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf(family)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Io(format!("rocksdb scan: {e}")))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksDbStore) {
        let dir = TempDir::new().unwrap();
        let store =
            RocksDbStore::open(RocksDbConfig::for_testing(dir.path().to_string_lossy())).unwrap();
        (dir, store)
    }

    #[test]
    fn test_basic_operations() {
        let (_dir, store) = open_temp();
        store
            .write_batch(vec![BatchOp::Put {
                family: Family::Blocks,
                key: b"key".to_vec(),
                value: b"value".to_vec(),
            }])
            .unwrap();
        assert_eq!(
            store.get(Family::Blocks, b"key").unwrap(),
            Some(b"value".to_vec())
        );
        // Families are isolated.
        assert_eq!(store.get(Family::Headers, b"key").unwrap(), None);
    }

    #[test]
    fn test_atomic_multi_family_batch() {
        let (_dir, store) = open_temp();
        store
            .write_batch(vec![
                BatchOp::Put {
                    family: Family::MainChain,
                    key: 0u64.to_be_bytes().to_vec(),
                    value: vec![1; 32],
                },
                BatchOp::Put {
                    family: Family::Metadata,
                    key: b"tip".to_vec(),
                    value: vec![1; 32],
                },
            ])
            .unwrap();
        assert!(store
            .get(Family::MainChain, &0u64.to_be_bytes())
            .unwrap()
            .is_some());
        assert!(store.get(Family::Metadata, b"tip").unwrap().is_some());
    }

    #[test]
    fn test_prefix_scan_stays_in_prefix() {
        let (_dir, store) = open_temp();
        store
            .write_batch(vec![
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![1, 0],
                    value: vec![1],
                },
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![1, 1],
                    value: vec![2],
                },
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![2, 0],
                    value: vec![3],
                },
            ])
            .unwrap();
        let hits = store.scan_prefix(Family::AddrTxIndex, &[1]).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        {
            let store = RocksDbStore::open(RocksDbConfig::for_testing(path.clone())).unwrap();
            store
                .write_batch(vec![BatchOp::Put {
                    family: Family::Metadata,
                    key: b"tip".to_vec(),
                    value: vec![7; 32],
                }])
                .unwrap();
        }
        let store = RocksDbStore::open(RocksDbConfig::for_testing(path)).unwrap();
        assert_eq!(
            store.get(Family::Metadata, b"tip").unwrap(),
            Some(vec![7; 32])
        );
    }
}
