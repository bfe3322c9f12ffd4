use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Probability / QPS maps ──────────────────────────────────────

/// service → operation → sampling probability.
pub type ServiceOperationProbabilities = BTreeMap<String, BTreeMap<String, f64>>;

/// service → operation → observed queries per second.
pub type ServiceOperationQPS = BTreeMap<String, BTreeMap<String, f64>>;

/// service → operation → probability paired with QPS, for one snapshot.
pub type ServiceOperationData = BTreeMap<String, BTreeMap<String, ProbabilityAndQPS>>;

/// hostname → that host's snapshots in the requested window, oldest first.
pub type HostProbabilitiesAndQPS = BTreeMap<String, Vec<ServiceOperationData>>;

// ─── Throughput ──────────────────────────────────────────────────

/// A single throughput observation reported by a collector.
/// This is the "write" side: reporters create these and push them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub service: String,
    /// Empty means "all operations of the service".
    pub operation: String,
    /// Requests seen during the reporting interval
    pub count: u64,
    /// Probabilities that were in effect while `count` was collected
    #[serde(default)]
    pub probabilities: BTreeSet<String>,
    /// Stamped by the store on insert; whatever the caller puts here is replaced.
    #[serde(default = "unset_timestamp")]
    pub observed_at: DateTime<Utc>,
}

fn unset_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

impl Throughput {
    pub fn new(service: impl Into<String>, operation: impl Into<String>, count: u64) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            count,
            probabilities: BTreeSet::new(),
            observed_at: unset_timestamp(),
        }
    }

    /// Attach the probabilities that were active for this interval.
    pub fn with_probabilities<I, S>(mut self, probabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.probabilities = probabilities.into_iter().map(Into::into).collect();
        self
    }
}

// ─── Probabilities + QPS ─────────────────────────────────────────

/// Probability and QPS observed for one service/operation on one host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityAndQPS {
    pub probability: f64,
    pub qps: f64,
}

/// One host's probability and QPS maps at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilitiesAndQPSSnapshot {
    pub hostname: String,
    pub probabilities: ServiceOperationProbabilities,
    pub qps: ServiceOperationQPS,
    pub observed_at: DateTime<Utc>,
}

impl ProbabilitiesAndQPSSnapshot {
    /// Pair every probability with the QPS recorded for the same key.
    /// QPS entries without a probability are dropped; missing QPS reads as zero.
    pub fn combined(&self) -> ServiceOperationData {
        self.probabilities
            .iter()
            .map(|(service, operations)| {
                let service_qps = self.qps.get(service);
                let combined = operations
                    .iter()
                    .map(|(operation, &probability)| {
                        let qps = service_qps
                            .and_then(|ops| ops.get(operation))
                            .copied()
                            .unwrap_or(0.0);
                        (operation.clone(), ProbabilityAndQPS { probability, qps })
                    })
                    .collect();
                (service.clone(), combined)
            })
            .collect()
    }
}
