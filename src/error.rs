use crate::config::ConfigError;
use crate::kv::KvError;
use crate::schema::{Diffs, SchemaError};

/// Unified error type for the crate.
///
/// Each layer has its own error type; this one wraps them for callers that
/// cross layers, and adds the errors raised when a schema is applied to a
/// database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Errors related to schema validation and serialization
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Errors raised by the key-value layer
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A schema version is already recorded with a structurally different
    /// schema.
    #[error("Schema version {version} is already recorded with an incompatible schema:\n{diffs}")]
    SchemaMismatch { version: u32, diffs: Diffs },

    /// The schema version is not recorded and recording was not allowed
    #[error("Schema version {0} is not recorded in the database")]
    UnknownVersion(u32),
}

impl Error {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Kv(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
