//! Logging setup
//!
//! The crate logs through the `log` facade. [`init_logging`] installs an
//! `env_logger` backend configured from a [`LogConfig`]; `RUST_LOG`, when
//! set, is applied on top of the configured levels.

pub mod config;

use env_logger::Builder;
use log::info;

use crate::config::{ConfigError, ConfigResult};

pub use config::{parse_level, LogConfig};

/// Build a logger from `config` without installing it
pub fn builder(config: &LogConfig) -> ConfigResult<Builder> {
    let mut builder = Builder::new();
    builder.filter_level(config.default_filter()?);
    for (module, level) in config.module_filters()? {
        builder.filter_module(module, level);
    }
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    Ok(builder)
}

/// Install the global logger. Fails if a logger is already installed.
pub fn init_logging(config: &LogConfig) -> ConfigResult<()> {
    builder(config)?
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    info!(
        "Logging initialized at level {} with {} module overrides",
        config.default_level,
        config.modules.len()
    );
    Ok(())
}
