//! Cache errors

use crate::key::ClassKey;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The class source could not describe a class
    #[error("Cannot describe class {key}: {reason}")]
    Describe { key: ClassKey, reason: String },

    /// A `ClassInfo` was used after its class was unloaded or redefined
    #[error("Class {key} is stale (generation {stamp}, current {current})")]
    Stale { key: ClassKey, stamp: u64, current: u64 },

    #[error("The global class info cache is already installed")]
    GlobalInstalled,

    /// The maintenance thread is gone
    #[error("Cache collector is not running")]
    CollectorStopped,

    #[error("Failed to spawn the cache collector: {0}")]
    Spawn(std::io::Error),
}
