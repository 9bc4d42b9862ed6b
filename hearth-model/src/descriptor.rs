use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// Default number of rows per multi-row INSERT in bulk creation.
pub const DEFAULT_MAX_BULK_BATCH_SIZE: usize = 1000;

/// Describes one entity type: its table, key column and feature flags.
///
/// Descriptors are immutable once an engine is built from them. They can be
/// written in code with the `with_*` setters or loaded from TOML:
///
/// ```
/// use hearth_model::EntityDescriptor;
///
/// let desc = EntityDescriptor::from_toml_str(r#"
///     table = "donations"
///     soft_delete = true
///     cache_ttl_secs = 120
/// "#).unwrap();
/// assert_eq!(desc.primary_key, "id");
/// assert!(desc.soft_delete);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Time-to-live of cache entries, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Period of the background expiry sweep, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub cache_sweep_interval_secs: u64,
    #[serde(default = "default_true")]
    pub validation: bool,
    #[serde(default = "default_bulk_batch")]
    pub max_bulk_batch_size: usize,
    /// Extra attempts for a failed statement (0 disables retry).
    #[serde(default)]
    pub retry: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_bulk_batch() -> usize {
    DEFAULT_MAX_BULK_BATCH_SIZE
}

fn default_retry_delay() -> u64 {
    1000
}

impl EntityDescriptor {
    /// Creates a descriptor for `table` with default flags.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: default_primary_key(),
            soft_delete: false,
            timestamps: true,
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl(),
            cache_sweep_interval_secs: default_sweep_interval(),
            validation: true,
            max_bulk_batch_size: DEFAULT_MAX_BULK_BATCH_SIZE,
            retry: 0,
            retry_delay_ms: default_retry_delay(),
        }
    }

    /// Parses a descriptor from a TOML document.
    pub fn from_toml_str(source: &str) -> ModelResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn with_soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn with_cache(mut self, enabled: bool, ttl_secs: u64) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl_secs = ttl_secs;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    pub fn with_max_bulk_batch_size(mut self, size: usize) -> Self {
        self.max_bulk_batch_size = size.max(1);
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.retry = attempts;
        self.retry_delay_ms = delay_ms;
        self
    }
}
