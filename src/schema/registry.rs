use std::collections::BTreeMap;
use std::fmt;

use super::compat::Compatible;
use super::composite_index::SchemaCompositeIndex;
use super::error::{SchemaError, SchemaResult};
use super::field::{ComplexSchemaField, SchemaField, SimpleSchemaField, StorageId};
use super::model::SchemaModel;
use super::object_type::SchemaObjectType;

/// A borrowed reference to any schema item that owns a storage id.
#[derive(Debug, Clone, Copy)]
pub enum SchemaItem<'a> {
    ObjectType(&'a SchemaObjectType),
    Field {
        object_type: &'a SchemaObjectType,
        field: &'a SchemaField,
    },
    SubField {
        object_type: &'a SchemaObjectType,
        parent: &'a ComplexSchemaField,
        field: &'a SimpleSchemaField,
    },
    CompositeIndex {
        object_type: &'a SchemaObjectType,
        index: &'a SchemaCompositeIndex,
    },
}

impl<'a> SchemaItem<'a> {
    /// The simple field behind this item, if it is a simple field or a
    /// sub-field.
    fn as_simple_field(&self) -> Option<&'a SimpleSchemaField> {
        match *self {
            SchemaItem::Field { field, .. } => field.as_simple(),
            SchemaItem::SubField { field, .. } => Some(field),
            _ => None,
        }
    }

    /// True if both references describe the same item, i.e. sharing a
    /// storage id between them within one schema is allowed.
    pub fn same_item(&self, other: &SchemaItem<'_>) -> bool {
        match (*self, *other) {
            (SchemaItem::ObjectType(a), SchemaItem::ObjectType(b)) => a == b,
            (SchemaItem::Field { field: a, .. }, SchemaItem::Field { field: b, .. }) => a == b,
            (SchemaItem::CompositeIndex { index: a, .. }, SchemaItem::CompositeIndex { index: b, .. }) => {
                a == b
            }
            _ => match (self.as_simple_field(), other.as_simple_field()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// True if two schema versions may both use the same storage id for
    /// these items. Object types may evolve freely between versions; every
    /// other item must stay structurally compatible.
    pub fn is_consistent_with(&self, other: &SchemaItem<'_>) -> bool {
        match (*self, *other) {
            (SchemaItem::ObjectType(_), SchemaItem::ObjectType(_)) => true,
            (SchemaItem::Field { field: a, .. }, SchemaItem::Field { field: b, .. }) => {
                a.is_compatible_with(b)
            }
            (SchemaItem::CompositeIndex { index: a, .. }, SchemaItem::CompositeIndex { index: b, .. }) => {
                a.is_compatible_with(b)
            }
            _ => match (self.as_simple_field(), other.as_simple_field()) {
                (Some(a), Some(b)) => a.is_compatible_with(b),
                _ => false,
            },
        }
    }
}

impl fmt::Display for SchemaItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaItem::ObjectType(ot) => write!(f, "{ot}"),
            SchemaItem::Field { object_type, field } => write!(f, "{field} of {object_type}"),
            SchemaItem::SubField {
                object_type,
                parent,
                field,
            } => write!(
                f,
                "sub-field \"{}\" (#{}) of field \"{}\" of {object_type}",
                field.name, field.storage_id, parent.name
            ),
            SchemaItem::CompositeIndex { object_type, index } => {
                write!(f, "{index} of {object_type}")
            }
        }
    }
}

/// Every storage id used by a schema, mapped to the item that uses it.
///
/// Building the registry validates storage-id usage: ids may only be shared
/// by identical items, and composite indexes must refer to simple fields of
/// their own object type.
#[derive(Debug)]
pub struct StorageIdRegistry<'a> {
    items: BTreeMap<StorageId, SchemaItem<'a>>,
}

impl<'a> StorageIdRegistry<'a> {
    pub fn build(model: &'a SchemaModel) -> SchemaResult<Self> {
        let mut registry = Self {
            items: BTreeMap::new(),
        };

        // Pass 1: collect ids in walking order
        for object_type in model.object_types.values() {
            registry.register(object_type.storage_id, SchemaItem::ObjectType(object_type))?;
            for field in object_type.fields.values() {
                registry.register(field.storage_id(), SchemaItem::Field { object_type, field })?;
                if let SchemaField::Complex(parent) = field {
                    for sub_field in &parent.sub_fields {
                        registry.register(
                            sub_field.storage_id,
                            SchemaItem::SubField {
                                object_type,
                                parent,
                                field: sub_field,
                            },
                        )?;
                    }
                }
            }
            for index in object_type.composite_indexes.values() {
                registry.register(index.storage_id, SchemaItem::CompositeIndex { object_type, index })?;
            }
        }

        // Pass 2: cross references
        for object_type in model.object_types.values() {
            for index in object_type.composite_indexes.values() {
                for field_id in &index.fields {
                    match object_type.field(*field_id) {
                        Some(SchemaField::Simple(_)) => {}
                        Some(other) => {
                            return Err(SchemaError::invalid(format!(
                                "{index} of {object_type} refers to {other}, but composite indexes may only refer to simple fields"
                            )))
                        }
                        None => {
                            return Err(SchemaError::invalid(format!(
                                "{index} of {object_type} refers to field #{field_id}, which does not exist in {object_type}"
                            )))
                        }
                    }
                }
            }
        }

        Ok(registry)
    }

    fn register(&mut self, storage_id: StorageId, item: SchemaItem<'a>) -> SchemaResult<()> {
        if let Some(existing) = self.items.get(&storage_id) {
            if existing.same_item(&item) {
                return Ok(());
            }
            return Err(SchemaError::StorageIdConflict {
                storage_id,
                existing: existing.to_string(),
                conflicting: item.to_string(),
            });
        }
        self.items.insert(storage_id, item);
        Ok(())
    }

    /// Checks that every storage id used by both registries is used
    /// consistently, as required when two schema versions share a database.
    pub fn check_consistent_with(&self, other: &StorageIdRegistry<'_>) -> SchemaResult<()> {
        for (storage_id, item) in &self.items {
            if let Some(existing) = other.get(*storage_id) {
                if !item.is_consistent_with(existing) {
                    return Err(SchemaError::StorageIdConflict {
                        storage_id: *storage_id,
                        existing: existing.to_string(),
                        conflicting: item.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, storage_id: StorageId) -> Option<&SchemaItem<'a>> {
        self.items.get(&storage_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StorageId, &SchemaItem<'a>)> {
        self.items.iter().map(|(id, item)| (*id, item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
