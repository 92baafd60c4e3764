use std::collections::BTreeSet;
use std::fmt;

use super::compat::Compatible;
use super::diff::{DiffGenerating, Diffs};
use super::error::{SchemaError, SchemaResult};
use super::field::StorageId;
use super::hash::CompatibilityHasher;
use super::validation::{check_name, check_storage_id};

/// Smallest number of fields in a composite index.
pub const MIN_INDEX_FIELDS: usize = 2;
/// Largest number of fields in a composite index.
pub const MAX_INDEX_FIELDS: usize = 4;

/// An index over several simple fields of one object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCompositeIndex {
    pub name: String,
    pub storage_id: StorageId,
    /// Storage ids of the indexed fields, in index key order.
    pub fields: Vec<StorageId>,
}

impl SchemaCompositeIndex {
    pub fn new<I: IntoIterator<Item = StorageId>>(
        name: impl Into<String>,
        storage_id: StorageId,
        fields: I,
    ) -> Self {
        Self {
            name: name.into(),
            storage_id,
            fields: fields.into_iter().collect(),
        }
    }

    /// Checks the index in isolation. Whether the fields exist on the
    /// object type is checked by the object type.
    pub fn validate(&self) -> SchemaResult<()> {
        let what = format!("composite index \"{}\"", self.name);
        check_name(&self.name, &what)?;
        check_storage_id(self.storage_id, &what)?;
        if !(MIN_INDEX_FIELDS..=MAX_INDEX_FIELDS).contains(&self.fields.len()) {
            return Err(SchemaError::invalid(format!(
                "{what} has {} fields but composite indexes must have between {MIN_INDEX_FIELDS} and {MAX_INDEX_FIELDS}",
                self.fields.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for id in &self.fields {
            if !seen.insert(*id) {
                return Err(SchemaError::invalid(format!(
                    "{what} indexes field #{id} more than once"
                )));
            }
        }
        Ok(())
    }
}

impl Compatible for SchemaCompositeIndex {
    fn is_compatible_with(&self, other: &Self) -> bool {
        self.storage_id == other.storage_id && self.fields == other.fields
    }

    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher) {
        hasher.write_u32(self.storage_id);
        hasher.write_u32(self.fields.len() as u32);
        for id in &self.fields {
            hasher.write_u32(*id);
        }
    }
}

impl DiffGenerating for SchemaCompositeIndex {
    fn differences_from(&self, that: &Self) -> Diffs {
        let mut diffs = Diffs::new();
        diffs.add_if_changed("name", &self.name, &that.name);
        diffs.add_if_changed("indexed fields", &self.fields, &that.fields);
        diffs
    }
}

impl fmt::Display for SchemaCompositeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite index \"{}\" (#{})", self.name, self.storage_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_bounds() {
        assert!(SchemaCompositeIndex::new("one", 20, [11]).validate().is_err());
        assert!(SchemaCompositeIndex::new("two", 20, [11, 12]).validate().is_ok());
        assert!(SchemaCompositeIndex::new("four", 20, [11, 12, 13, 14]).validate().is_ok());
        assert!(SchemaCompositeIndex::new("five", 20, [11, 12, 13, 14, 15])
            .validate()
            .is_err());
    }

    #[test]
    fn test_repeated_field_rejected() {
        let err = SchemaCompositeIndex::new("dup", 20, [11, 11]).validate().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }

    #[test]
    fn test_field_order_is_structural() {
        let a = SchemaCompositeIndex::new("ab", 20, [11, 12]);
        let b = SchemaCompositeIndex::new("ba", 20, [12, 11]);
        assert!(!a.is_compatible_with(&b));
        assert!(a.is_compatible_with(&SchemaCompositeIndex::new("renamed", 20, [11, 12])));
    }
}
