use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use chrono::Utc;
use sampling_store::{
    MemorySamplingStore, SamplingStore, ServiceOperationProbabilities, ServiceOperationQPS,
    StoreConfig, StoreError, Throughput,
};

use crate::mock_data;

// ─── Configuration ───────────────────────────────────────────────

/// Samples per second each host aims to keep per operation.
const TARGET_SAMPLES_PER_SEC: f64 = 1.0;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Number of reporting hosts (one Tokio task each)
    #[serde(default = "default_hosts")]
    pub hosts: usize,

    /// Services reported by every host
    #[serde(default = "default_services")]
    pub services: usize,

    /// Operations reported per service
    #[serde(default = "default_operations")]
    pub operations_per_service: usize,

    /// Delay between two reports from the same host
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,

    /// How long the simulation runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    #[serde(default)]
    pub store: StoreConfig,
}

fn default_hosts() -> usize {
    3
}
fn default_services() -> usize {
    4
}
fn default_operations() -> usize {
    3
}
fn default_report_interval_ms() -> u64 {
    500
}
fn default_duration() -> u64 {
    10
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            services: default_services(),
            operations_per_service: default_operations(),
            report_interval_ms: default_report_interval_ms(),
            duration_secs: default_duration(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed simulation config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    OutOfRange(&'static str),
}

impl SimulationConfig {
    /// Read a JSON config file, or fall back to defaults plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str::<Self>(&raw)?
            }
            None => Self {
                store: StoreConfig::from_env()?,
                ..Self::default()
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts == 0 || self.hosts > 500 {
            return Err(ConfigError::OutOfRange("hosts must be between 1 and 500"));
        }
        if self.services == 0 || self.operations_per_service == 0 {
            return Err(ConfigError::OutOfRange(
                "services and operations_per_service must be at least 1",
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::OutOfRange("report_interval_ms must be at least 1"));
        }
        if self.duration_secs == 0 || self.duration_secs > 3600 {
            return Err(ConfigError::OutOfRange("duration_secs must be between 1 and 3600"));
        }
        self.store.validate()?;
        Ok(())
    }

    fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns one reporter task per host plus an observer that reads the
/// store the way a strategy calculator would, until the deadline.
pub async fn run(store: Arc<MemorySamplingStore>, config: &SimulationConfig) {
    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);
    let interval = config.report_interval();

    let mut handles = Vec::with_capacity(config.hosts + 1);

    for host_id in 0..config.hosts {
        let store: Arc<dyn SamplingStore> = store.clone();
        let hostname = mock_data::hostname(host_id);
        // Each host gets its own deterministic RNG seeded uniquely.
        let mut rng = StdRng::seed_from_u64(1000 + host_id as u64);
        let catalog = mock_data::catalog(&mut rng, config.services, config.operations_per_service);

        handles.push(tokio::spawn(async move {
            reporter(hostname, store, catalog, rng, deadline, interval).await;
        }));
    }

    {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            observer(store, deadline, interval * 4).await;
        }));
    }

    // Wait for all tasks to finish
    for h in handles {
        if let Err(e) = h.await {
            tracing::error!(error = %e, "simulation task failed");
        }
    }
}

// ─── Reporter loop ───────────────────────────────────────────────

async fn reporter(
    hostname: String,
    store: Arc<dyn SamplingStore>,
    catalog: Vec<(String, String)>,
    mut rng: StdRng,
    deadline: Instant,
    interval: Duration,
) {
    tracing::info!(%hostname, pairs = catalog.len(), "reporter started");

    let interval_secs = interval.as_secs_f64();
    let mut probabilities = ServiceOperationProbabilities::new();
    let mut ticker = tokio::time::interval(interval);

    while Instant::now() < deadline {
        ticker.tick().await;

        let mut batch = Vec::with_capacity(catalog.len());
        let mut qps = ServiceOperationQPS::new();

        for (service, operation) in &catalog {
            let count = rng.gen_range(0..=200u64);
            let in_effect = probabilities
                .get(service)
                .and_then(|ops| ops.get(operation))
                .map(|p| format!("{p:.6}"));

            batch.push(
                Throughput::new(service.as_str(), operation.as_str(), count)
                    .with_probabilities(in_effect),
            );
            qps.entry(service.clone())
                .or_default()
                .insert(operation.clone(), count as f64 / interval_secs);
        }

        // ── Recompute probabilities from the QPS just observed ──
        for (service, operations) in &qps {
            let per_service = probabilities.entry(service.clone()).or_default();
            for (operation, &observed) in operations {
                per_service.insert(operation.clone(), probability_for(observed));
            }
        }

        if let Err(e) = store.insert_throughput(batch) {
            tracing::warn!(%hostname, error = %e, "dropping throughput report");
            continue;
        }
        if let Err(e) = store.insert_probabilities_and_qps(&hostname, probabilities.clone(), qps) {
            tracing::warn!(%hostname, error = %e, "dropping probabilities report");
        }
    }

    tracing::info!(%hostname, "reporter finished");
}

/// Probability that keeps roughly `TARGET_SAMPLES_PER_SEC` traces per second.
fn probability_for(qps: f64) -> f64 {
    if qps <= TARGET_SAMPLES_PER_SEC {
        1.0
    } else {
        TARGET_SAMPLES_PER_SEC / qps
    }
}

// ─── Observer loop ───────────────────────────────────────────────

async fn observer(store: Arc<MemorySamplingStore>, deadline: Instant, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; nothing has been reported yet.
    ticker.tick().await;

    while Instant::now() < deadline {
        ticker.tick().await;

        let end = Utc::now();
        let start = end - chrono::Duration::milliseconds(every.as_millis() as i64);

        let recent = match store.get_throughput(start, end) {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!(error = %e, "throughput query failed");
                continue;
            }
        };
        let total: u64 = recent.iter().map(|t| t.count).sum();

        let by_host = store.get_probabilities_and_qps(start, end).unwrap_or_default();
        let latest = store.get_latest_probabilities().unwrap_or_default();
        let latest_ops: usize = latest.values().map(|ops| ops.len()).sum();

        tracing::info!(
            window_records = recent.len(),
            window_requests = total,
            reporting_hosts = by_host.len(),
            latest_operations = latest_ops,
            "window summary"
        );
        let stats = store.stats();
        tracing::debug!(?stats, "store stats");
    }
}
