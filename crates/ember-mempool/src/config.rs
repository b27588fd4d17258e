//! # Mempool Configuration

/// Bounds and floors for the pending-transaction store.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Total serialized bytes the pool may hold.
    pub max_bytes: u64,
    /// Total transaction count the pool may hold.
    pub max_count: usize,
    /// Transactions older than this are swept out.
    pub ttl_ms: u64,
    /// Node-local fee floor in smallest native units; the effective floor
    /// is the maximum of this and the network minimum for the size.
    pub min_acceptable_fee: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 32 * 1024 * 1024,
            max_count: 50_000,
            ttl_ms: 6 * 60 * 60 * 1000,
            min_acceptable_fee: 0,
        }
    }
}
