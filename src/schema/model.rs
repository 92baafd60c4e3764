use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::compat::{all_compatible, hash_all, Compatible};
use super::diff::{diff_maps, DiffGenerating, Diffs};
use super::error::{SchemaError, SchemaResult};
use super::field::StorageId;
use super::hash::CompatibilityHasher;
use super::object_type::SchemaObjectType;
use super::registry::StorageIdRegistry;

/// A complete schema version: every object type keyed by storage id.
///
/// `Clone` is a deep copy and `PartialEq` is structural equality including
/// names. Compatibility, which ignores names, is a weaker relation given by
/// [`Compatible::is_compatible_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaModel {
    pub object_types: BTreeMap<StorageId, SchemaObjectType>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_type(mut self, object_type: SchemaObjectType) -> Self {
        self.add_object_type(object_type);
        self
    }

    pub fn add_object_type(&mut self, object_type: SchemaObjectType) {
        self.object_types.insert(object_type.storage_id, object_type);
    }

    pub fn object_type(&self, storage_id: StorageId) -> Option<&SchemaObjectType> {
        self.object_types.get(&storage_id)
    }

    pub fn object_type_by_name(&self, name: &str) -> Option<&SchemaObjectType> {
        self.object_types.values().find(|ot| ot.name == name)
    }

    /// Checks every object type, object type name uniqueness and storage id
    /// usage across the whole schema. Invalid schemas are never corrected.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut names = BTreeSet::new();
        for (id, object_type) in &self.object_types {
            if *id != object_type.storage_id {
                return Err(SchemaError::invalid(format!(
                    "{object_type} is keyed under storage ID {id}"
                )));
            }
            object_type.validate()?;
            if !names.insert(object_type.name.as_str()) {
                return Err(SchemaError::DuplicateName(format!(
                    "more than one object type is named \"{}\"",
                    object_type.name
                )));
            }
        }
        let registry = StorageIdRegistry::build(self)?;
        debug!(
            "Validated schema with {} object types and {} storage IDs",
            self.object_types.len(),
            registry.len()
        );
        Ok(())
    }

    /// Hash of the structural content of this schema. Compatible schemas
    /// always hash equally; incompatible ones almost never do.
    pub fn compatibility_hash(&self) -> i64 {
        let mut hasher = CompatibilityHasher::new();
        self.write_compatibility_hash(&mut hasher);
        hasher.finish()
    }

    /// A positive schema version number derived from the compatibility hash.
    pub fn autogenerate_version(&self) -> u32 {
        let version = ((self.compatibility_hash() as u64) >> 33) as u32;
        version.max(1)
    }
}

impl Compatible for SchemaModel {
    fn is_compatible_with(&self, other: &Self) -> bool {
        all_compatible(&self.object_types, &other.object_types)
    }

    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher) {
        hash_all(&self.object_types, hasher);
    }
}

impl DiffGenerating for SchemaModel {
    fn differences_from(&self, that: &Self) -> Diffs {
        let mut diffs = Diffs::new();
        diff_maps(&mut diffs, &self.object_types, &that.object_types, |ot| ot.to_string());
        diffs
    }
}
