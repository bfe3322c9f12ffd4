use serde::Serialize;

/// Point-in-time counters for both series.
/// Serialized straight into the simulator's summary log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub max_buckets: usize,

    pub throughput_len: usize,
    pub throughput_inserted: u64,
    pub throughput_evicted: u64,

    pub snapshots_len: usize,
    pub snapshots_inserted: u64,
    pub snapshots_evicted: u64,
}

impl StoreStats {
    /// Convenience: has either series ever dropped an entry?
    pub fn has_evicted(&self) -> bool {
        self.throughput_evicted > 0 || self.snapshots_evicted > 0
    }
}
