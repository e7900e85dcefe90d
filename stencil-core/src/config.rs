//! Configuration types

use crate::error::{ConfigError, StencilResult};
use serde::{Deserialize, Serialize};

/// Configuration for the adapter cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shard count for the concurrent maps. `None` lets the map pick one
    /// from the number of CPUs.
    pub shard_amount: Option<usize>,
    /// Initial slot capacity of each domain partition.
    pub partition_capacity: usize,
    /// Initial cell capacity of each adapter's member table.
    pub member_capacity: usize,
    /// Reclaim partitions of dropped domains as new domains are seen.
    pub sweep_on_new_domain: bool,
    /// With `sweep_on_new_domain`, sweep on every `sweep_interval`-th new
    /// domain. A sweep visits every partition and write-locks each shard in
    /// turn, so an interval of 1 makes domain creation O(domains) and
    /// briefly stalls lookups in unrelated domains.
    pub sweep_interval: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_amount: None,
            partition_capacity: 16,
            member_capacity: 8,
            sweep_on_new_domain: true,
            sweep_interval: 32,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shard count.
    pub fn with_shard_amount(mut self, shards: usize) -> Self {
        self.shard_amount = Some(shards);
        self
    }

    /// Set the initial partition capacity.
    pub fn with_partition_capacity(mut self, capacity: usize) -> Self {
        self.partition_capacity = capacity;
        self
    }

    /// Set the initial member table capacity.
    pub fn with_member_capacity(mut self, capacity: usize) -> Self {
        self.member_capacity = capacity;
        self
    }

    /// Enable or disable sweeping on new domains.
    pub fn with_sweep_on_new_domain(mut self, enabled: bool) -> Self {
        self.sweep_on_new_domain = enabled;
        self
    }

    /// Set how many new domains pass between automatic sweeps.
    pub fn with_sweep_interval(mut self, interval: usize) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Parse a config from TOML. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> StencilResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The shard amount, when set, must be a power of two greater than one.
    /// The sweep interval must be at least one.
    pub fn validate(&self) -> StencilResult<()> {
        if self.sweep_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if let Some(shards) = self.shard_amount {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(ConfigError::InvalidValue {
                    field: "shard_amount".to_string(),
                    value: shards.to_string(),
                    reason: "must be a power of two greater than 1".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
