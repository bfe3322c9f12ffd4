use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// ─── Configuration ───────────────────────────────────────────────

/// Environment variable overriding [`StoreConfig::max_buckets`].
pub const MAX_BUCKETS_ENV: &str = "SAMPLING_STORE_MAX_BUCKETS";

/// Entries retained per series when nothing else is configured.
pub const DEFAULT_MAX_BUCKETS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How many entries each series keeps before evicting the oldest
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

fn default_max_buckets() -> usize {
    DEFAULT_MAX_BUCKETS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_buckets: default_max_buckets(),
        }
    }
}

impl StoreConfig {
    pub fn with_max_buckets(max_buckets: usize) -> Self {
        Self { max_buckets }
    }

    /// Defaults, overridden by `SAMPLING_STORE_MAX_BUCKETS` when set.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(MAX_BUCKETS_ENV) {
            config.max_buckets =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|e| StoreError::InvalidConfig {
                        field: "max_buckets",
                        reason: format!("{MAX_BUCKETS_ENV}={raw:?}: {e}"),
                    })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_buckets == 0 {
            return Err(StoreError::InvalidConfig {
                field: "max_buckets",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
