//! Bounded in-memory history of adaptive-sampling telemetry.
//!
//! Keeps two independent series, per service/operation throughput counts and
//! per-host probability/QPS snapshots, each capped at a fixed number of
//! entries with oldest-first eviction.

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{Series, StoreError, StoreResult};
pub use model::{
    HostProbabilitiesAndQPS, ProbabilitiesAndQPSSnapshot, ProbabilityAndQPS,
    ServiceOperationData, ServiceOperationProbabilities, ServiceOperationQPS, Throughput,
};
pub use store::{MemorySamplingStore, SamplingStore, StoreStats};
