//! # In-Memory Store Adapter
//!
//! Mirrors the RocksDB adapter for unit and scenario tests: the same
//! column families, the same atomic batch semantics, no disk.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::ports::{BatchOp, Family, KeyValueStore};

/// A `KeyValueStore` over per-family ordered maps.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    families: Mutex<HashMap<Family, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all families.
    #[must_use]
    pub fn total_keys(&self) -> usize {
        self.families.lock().values().map(BTreeMap::len).sum()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, family: Family, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .families
            .lock()
            .get(&family)
            .and_then(|map| map.get(key).cloned()))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        // One lock span makes the whole batch atomic for readers.
        let mut families = self.families.lock();
        for op in ops {
            match op {
                BatchOp::Put { family, key, value } => {
                    families.entry(family).or_default().insert(key, value);
                }
                BatchOp::Delete { family, key } => {
                    if let Some(map) = families.get_mut(&family) {
                        map.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(
        &self,
        family: Family,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let families = self.families.lock();
        let Some(map) = families.get(&family) else {
            return Ok(Vec::new());
        };
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_is_applied_whole() {
        let store = MemoryKeyValueStore::new();
        store
            .write_batch(vec![
                BatchOp::Put {
                    family: Family::Blocks,
                    key: vec![1],
                    value: vec![10],
                },
                BatchOp::Put {
                    family: Family::Headers,
                    key: vec![1],
                    value: vec![20],
                },
            ])
            .unwrap();

        assert_eq!(store.get(Family::Blocks, &[1]).unwrap(), Some(vec![10]));
        assert_eq!(store.get(Family::Headers, &[1]).unwrap(), Some(vec![20]));
        assert_eq!(store.get(Family::Blocks, &[2]).unwrap(), None);
    }

    #[test]
    fn test_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryKeyValueStore::new();
        store
            .write_batch(vec![
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![1, 0],
                    value: vec![0],
                },
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![1, 1],
                    value: vec![1],
                },
                BatchOp::Put {
                    family: Family::AddrTxIndex,
                    key: vec![2, 0],
                    value: vec![2],
                },
            ])
            .unwrap();

        let hits = store.scan_prefix(Family::AddrTxIndex, &[1]).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, vec![1, 0]);
        assert_eq!(hits[1].0, vec![1, 1]);
    }

    #[test]
    fn test_delete_in_batch() {
        let store = MemoryKeyValueStore::new();
        store
            .write_batch(vec![BatchOp::Put {
                family: Family::Metadata,
                key: b"tip".to_vec(),
                value: vec![1],
            }])
            .unwrap();
        store
            .write_batch(vec![BatchOp::Delete {
                family: Family::Metadata,
                key: b"tip".to_vec(),
            }])
            .unwrap();
        assert_eq!(store.get(Family::Metadata, b"tip").unwrap(), None);
    }
}
