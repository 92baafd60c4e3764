use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::compat::{all_compatible, hash_all, Compatible};
use super::composite_index::SchemaCompositeIndex;
use super::diff::{diff_maps, DiffGenerating, Diffs};
use super::error::{SchemaError, SchemaResult};
use super::field::{SchemaField, StorageId};
use super::hash::CompatibilityHasher;
use super::validation::{check_name, check_storage_id};

/// An object type: a named, id-keyed set of fields and composite indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObjectType {
    pub name: String,
    pub storage_id: StorageId,
    pub fields: BTreeMap<StorageId, SchemaField>,
    pub composite_indexes: BTreeMap<StorageId, SchemaCompositeIndex>,
}

impl SchemaObjectType {
    pub fn new(name: impl Into<String>, storage_id: StorageId) -> Self {
        Self {
            name: name.into(),
            storage_id,
            fields: BTreeMap::new(),
            composite_indexes: BTreeMap::new(),
        }
    }

    /// Adds `field` keyed by its storage id, replacing any field with that id.
    pub fn with_field(mut self, field: impl Into<SchemaField>) -> Self {
        self.add_field(field);
        self
    }

    pub fn add_field(&mut self, field: impl Into<SchemaField>) {
        let field = field.into();
        self.fields.insert(field.storage_id(), field);
    }

    pub fn with_composite_index(mut self, index: SchemaCompositeIndex) -> Self {
        self.composite_indexes.insert(index.storage_id, index);
        self
    }

    pub fn field(&self, storage_id: StorageId) -> Option<&SchemaField> {
        self.fields.get(&storage_id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&SchemaField> {
        self.fields.values().find(|f| f.name() == name)
    }

    pub fn composite_index_by_name(&self, name: &str) -> Option<&SchemaCompositeIndex> {
        self.composite_indexes.values().find(|i| i.name == name)
    }

    /// Checks this object type on its own: names, storage ids, map keys
    /// and name uniqueness among its fields and among its indexes.
    pub fn validate(&self) -> SchemaResult<()> {
        let what = format!("object type \"{}\"", self.name);
        check_name(&self.name, &what)?;
        check_storage_id(self.storage_id, &what)?;

        let mut field_names = BTreeSet::new();
        for (id, field) in &self.fields {
            if *id != field.storage_id() {
                return Err(SchemaError::invalid(format!(
                    "{field} of {what} is keyed under storage ID {id}"
                )));
            }
            field.validate()?;
            if !field_names.insert(field.name()) {
                return Err(SchemaError::DuplicateName(format!(
                    "{what} has more than one field named \"{}\"",
                    field.name()
                )));
            }
        }

        let mut index_names = BTreeSet::new();
        for (id, index) in &self.composite_indexes {
            if *id != index.storage_id {
                return Err(SchemaError::invalid(format!(
                    "{index} of {what} is keyed under storage ID {id}"
                )));
            }
            index.validate()?;
            if !index_names.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateName(format!(
                    "{what} has more than one composite index named \"{}\"",
                    index.name
                )));
            }
        }
        Ok(())
    }
}

impl Compatible for SchemaObjectType {
    fn is_compatible_with(&self, other: &Self) -> bool {
        self.storage_id == other.storage_id
            && all_compatible(&self.fields, &other.fields)
            && all_compatible(&self.composite_indexes, &other.composite_indexes)
    }

    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher) {
        hasher.write_u32(self.storage_id);
        hash_all(&self.fields, hasher);
        hash_all(&self.composite_indexes, hasher);
    }
}

impl DiffGenerating for SchemaObjectType {
    fn differences_from(&self, that: &Self) -> Diffs {
        let mut diffs = Diffs::new();
        diffs.add_if_changed("name", &self.name, &that.name);
        diff_maps(&mut diffs, &self.fields, &that.fields, |field| field.to_string());
        diff_maps(
            &mut diffs,
            &self.composite_indexes,
            &that.composite_indexes,
            |index| index.to_string(),
        );
        diffs
    }
}

impl fmt::Display for SchemaObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object type \"{}\" (#{})", self.name, self.storage_id)
    }
}
