//! Log level configuration
//!
//! A default level plus per-module overrides, loaded from the `[logging]`
//! section of the configuration file.

use std::collections::BTreeMap;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};

/// Level names accepted in configuration, case-insensitively.
pub const VALID_LEVELS: &[&str] = &["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Level for every module without an override
    pub default_level: String,
    /// Module path prefix to level, e.g. `"fold_kv::kv::atomic" = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            modules: BTreeMap::new(),
        }
    }
}

/// Parse a level name such as `"warn"` or `"DEBUG"`
pub fn parse_level(level: &str) -> ConfigResult<LevelFilter> {
    match level.to_uppercase().as_str() {
        "OFF" => Ok(LevelFilter::Off),
        "ERROR" => Ok(LevelFilter::Error),
        "WARN" => Ok(LevelFilter::Warn),
        "INFO" => Ok(LevelFilter::Info),
        "DEBUG" => Ok(LevelFilter::Debug),
        "TRACE" => Ok(LevelFilter::Trace),
        _ => Err(ConfigError::validation(format!(
            "Invalid log level '{}', expected one of {:?}",
            level, VALID_LEVELS
        ))),
    }
}

impl LogConfig {
    pub fn default_filter(&self) -> ConfigResult<LevelFilter> {
        parse_level(&self.default_level)
    }

    /// Per-module filters, in module path order
    pub fn module_filters(&self) -> ConfigResult<Vec<(&str, LevelFilter)>> {
        self.modules
            .iter()
            .map(|(module, level)| Ok((module.as_str(), parse_level(level)?)))
            .collect()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.default_filter()?;
        for module in self.modules.keys() {
            if module.trim().is_empty() {
                return Err(ConfigError::validation("Empty module name in logging.modules"));
            }
        }
        self.module_filters()?;
        Ok(())
    }
}
