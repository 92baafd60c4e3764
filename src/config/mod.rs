//! Configuration for fold_kv
//!
//! Settings are read from TOML:
//!
//! ```toml
//! [atomic]
//! max_retries = 3
//! snapshot_timeout_ms = 60000
//!
//! [simple]
//! max_history = 1024
//!
//! [logging]
//! default_level = "info"
//!
//! [logging.modules]
//! "fold_kv::kv::atomic" = "debug"
//! ```
//!
//! Every section and key is optional and falls back to its default.

pub mod error;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kv::{AtomicConfig, SimpleKvConfig};
use crate::logging::LogConfig;

pub use error::{ConfigError, ConfigResult};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Atomic store retry and snapshot settings
    pub atomic: AtomicConfig,
    /// In-memory database settings
    pub simple: SimpleKvConfig,
    /// Log levels
    pub logging: LogConfig,
}

impl Config {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.atomic.snapshot_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "atomic.snapshot_timeout_ms must be greater than zero",
            ));
        }
        if self.simple.max_history == 0 {
            return Err(ConfigError::validation(
                "simple.max_history must be greater than zero",
            ));
        }
        self.logging.validate()
    }
}
