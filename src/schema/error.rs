use super::field::StorageId;

/// Errors raised while validating, comparing, reading or writing schemas.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Incompatible duplicate use of storage ID {storage_id} by both {existing} and {conflicting}")]
    StorageIdConflict {
        storage_id: StorageId,
        existing: String,
        conflicting: String,
    },

    #[error("Unsupported schema format version {0}")]
    UnsupportedFormatVersion(u64),

    #[error("Invalid schema document: {0}")]
    Format(#[from] serde_json::Error),

    #[error("I/O error reading or writing schema {source_id}: {source}")]
    Io {
        source_id: String,
        #[source]
        source: std::io::Error,
    },
}

impl SchemaError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSchema(msg.into())
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;
