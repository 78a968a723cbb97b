//! phaseloop configuration
//!
//! Configuration is fixed before the loop first runs.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (PHASELOOP_WORKERS)
//! 2. Config file (phaseloop.toml)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use phaseloop::util::config::LoopConfig;
//!
//! let config: LoopConfig = toml::from_str("worker_pool_size = 2").unwrap();
//! assert_eq!(config.worker_pool_size, 2);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the worker pool size.
pub const WORKERS_ENV: &str = "PHASELOOP_WORKERS";

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "phaseloop.toml";

/// Event loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Number of worker threads (at least 1)
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Stack size of worker threads, platform default when unset
    #[serde(default)]
    pub worker_stack_size: Option<usize>,
    /// Worker thread name prefix
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_worker_name_prefix() -> String {
    "phaseloop-worker".to_string()
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            worker_stack_size: None,
            worker_name_prefix: default_worker_name_prefix(),
        }
    }
}

impl LoopConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.worker_name_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "worker_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var(WORKERS_ENV) {
            self.worker_pool_size = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a number: {:?}", WORKERS_ENV, value))
            })?;
        }
        Ok(self)
    }
}

/// Path of the default config file in the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

/// Load and validate a config file
pub fn load_config(path: &Path) -> Result<LoopConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: LoopConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load the config file if it exists (defaults otherwise), then apply
/// environment overrides
pub fn load_effective_config(path: Option<&Path>) -> Result<LoopConfig, ConfigError> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config(&path)?
            } else {
                LoopConfig::default()
            }
        }
    };

    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Save a config file
pub fn save_config(
    config: &LoopConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
