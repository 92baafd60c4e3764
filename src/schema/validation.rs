//! Name and storage-id checks shared by every schema item.

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::{SchemaError, SchemaResult};
use super::field::{StorageId, MAX_STORAGE_ID};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("name pattern compiles"));

pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Fails unless `name` is a valid item name; `what` describes the item.
pub fn check_name(name: &str, what: &str) -> SchemaResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(SchemaError::invalid(format!(
            "invalid name {name:?} for {what}: names must match {}",
            NAME_PATTERN.as_str()
        )))
    }
}

/// Fails unless `storage_id` lies in `1..=MAX_STORAGE_ID`.
pub fn check_storage_id(storage_id: StorageId, what: &str) -> SchemaResult<()> {
    if (1..=MAX_STORAGE_ID).contains(&storage_id) {
        Ok(())
    } else {
        Err(SchemaError::invalid(format!(
            "invalid storage ID {storage_id} for {what}: storage IDs must be between 1 and {MAX_STORAGE_ID}"
        )))
    }
}
