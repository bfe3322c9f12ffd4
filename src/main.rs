use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use sampling_store::MemorySamplingStore;
use tracing_subscriber::EnvFilter;

mod mock_data;
mod reporter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ── 1. Load configuration ────────────────────────────────────
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match reporter::SimulationConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── 2. Build the store ───────────────────────────────────────
    let store = match MemorySamplingStore::new(config.store.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        hosts = config.hosts,
        max_buckets = store.max_buckets(),
        duration_secs = config.duration_secs,
        "starting sampling simulation"
    );

    // ── 3. Run reporters until the deadline ──────────────────────
    reporter::run(store.clone(), &config).await;

    // ── 4. Summary ───────────────────────────────────────────────
    match serde_json::to_string(&store.stats()) {
        Ok(json) => tracing::info!(stats = %json, "simulation finished"),
        Err(e) => tracing::warn!(error = %e, "cannot encode store stats"),
    }

    ExitCode::SUCCESS
}
