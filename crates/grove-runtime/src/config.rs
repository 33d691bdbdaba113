//! Cache configuration (grove.toml `[runtime]` table)

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Number of lock stripes; must be a power of two
    pub segments: usize,

    /// Upper bound on live class entries across all segments
    pub capacity: usize,

    /// Period of the background maintenance pass
    pub collector_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            segments: 16,
            capacity: 4096,
            collector_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    runtime: CacheConfig,
}

impl CacheConfig {
    pub fn from_file(path: &Path) -> CacheResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> CacheResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.runtime.validate()?;
        Ok(file.runtime)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.segments == 0 || !self.segments.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "segments must be a power of two, got {}",
                self.segments
            )));
        }
        if self.capacity < self.segments {
            return Err(CacheError::InvalidConfig(format!(
                "capacity {} is smaller than the segment count {}",
                self.capacity, self.segments
            )));
        }
        if self.collector_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "collector-interval-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn collector_interval(&self) -> Duration {
        Duration::from_millis(self.collector_interval_ms)
    }

    /// Entries one segment may hold before it evicts
    pub(crate) fn segment_capacity(&self) -> usize {
        self.capacity.div_ceil(self.segments)
    }
}
