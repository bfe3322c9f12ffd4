pub mod memory;
pub mod stats;

pub use memory::MemorySamplingStore;
pub use stats::StoreStats;

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::model::{
    HostProbabilitiesAndQPS, ServiceOperationProbabilities, ServiceOperationQPS, Throughput,
};

/// Storage for adaptive-sampling throughput and probability history.
///
/// Collectors push throughput and computed probabilities in; the strategy
/// calculator reads them back by time window. Ranges are half-open:
/// an entry stamped at `t` is returned when `start <= t < end`.
pub trait SamplingStore: Send + Sync {
    /// Append a batch of throughput observations, stamped with the current time.
    fn insert_throughput(&self, throughput: Vec<Throughput>) -> StoreResult<()>;

    /// Throughput observed in `[start, end)`, oldest first.
    fn get_throughput(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Throughput>>;

    /// Append one host's probabilities and QPS, stamped with the current time.
    fn insert_probabilities_and_qps(
        &self,
        hostname: &str,
        probabilities: ServiceOperationProbabilities,
        qps: ServiceOperationQPS,
    ) -> StoreResult<()>;

    /// Probabilities from the most recently inserted snapshot, or an empty map.
    fn get_latest_probabilities(&self) -> StoreResult<ServiceOperationProbabilities>;

    /// Snapshots in `[start, end)` grouped by hostname, each host's entries oldest first.
    fn get_probabilities_and_qps(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<HostProbabilitiesAndQPS>;
}
