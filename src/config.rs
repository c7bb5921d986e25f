//! Configuration System
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `SWEEPQ__*` environment overrides (`SWEEPQ__QUEUE__NUM_SHARDS=16`).

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::types::MAX_SHARDS;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shape of the sweep queue. Both values are baked into persisted keys, so
/// changing them for an existing database strands queued writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,

    /// Width, in timestamps, of a coarse index partition.
    #[serde(default = "default_coarse_partition_size")]
    pub coarse_partition_size: u64,
}

fn default_num_shards() -> u32 {
    8
}

fn default_coarse_partition_size() -> u64 {
    10_000_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_shards: default_num_shards(),
            coarse_partition_size: default_coarse_partition_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "sweepq")
}

fn default_db_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from(".sweepq/db"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Queue(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Queue(msg) => write!(f, "Queue: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SweepConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.queue.num_shards == 0 || self.queue.num_shards > MAX_SHARDS {
            errors.push(ValidationError::Queue(format!(
                "num_shards must be in 1..={}, got {}",
                MAX_SHARDS, self.queue.num_shards
            )));
        }
        if self.queue.coarse_partition_size == 0 {
            errors.push(ValidationError::Queue(
                "coarse_partition_size must be positive".to_string(),
            ));
        }
        if self.storage.db_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "db_path cannot be empty".to_string(),
            ));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`SweepConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config file location, `$XDG_CONFIG_HOME/sweepq/config.toml` on Linux.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from an explicit file, or the default location if
    /// `path` is `None` (the default file may be absent).
    pub fn load(path: Option<&Path>) -> Result<SweepConfig, ApiError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ApiError::ConfigError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_config_path() {
                    debug!(config_path = %default_path.display(), "Using default config location");
                    builder = builder.add_source(File::from(default_path).required(false));
                }
            }
        }
        builder = builder.add_source(Environment::with_prefix("SWEEPQ").separator("__"));

        let config: SweepConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
