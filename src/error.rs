//! Error types for the sampling store

/// The two retained series, named in errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Throughput,
    ProbabilitiesAndQPS,
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Throughput => f.write_str("throughput"),
            Self::ProbabilitiesAndQPS => f.write_str("probabilities/qps"),
        }
    }
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot grow {series} series by {requested} entries: allocation refused")]
    ResourceExhausted { series: Series, requested: usize },

    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Result type alias
pub type StoreResult<T> = Result<T, StoreError>;
