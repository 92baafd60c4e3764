use std::fmt;

use log::debug;

use super::columns::IndexColumns;
use super::composite::CompositeIndex;
use crate::kv::KvRead;
use crate::schema::composite_index::{MAX_INDEX_FIELDS, MIN_INDEX_FIELDS};
use crate::schema::{
    SchemaCompositeIndex, SchemaError, SchemaObjectType, SchemaResult, SimpleSchemaField,
    StorageId,
};

/// Storage details of one simple field taking part in an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFieldStorageInfo {
    pub storage_id: StorageId,
    pub name: String,
    pub type_name: String,
}

impl SimpleFieldStorageInfo {
    pub fn new(field: &SimpleSchemaField) -> Self {
        Self {
            storage_id: field.storage_id,
            name: field.name.clone(),
            type_name: field.type_name().to_string(),
        }
    }
}

/// A composite index resolved against its object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeIndexStorageInfo {
    pub storage_id: StorageId,
    pub name: String,
    pub object_type: StorageId,
    pub fields: Vec<SimpleFieldStorageInfo>,
}

impl CompositeIndexStorageInfo {
    /// Resolves the fields of `index` in `object_type`.
    pub fn new(object_type: &SchemaObjectType, index: &SchemaCompositeIndex) -> SchemaResult<Self> {
        let arity = index.fields.len();
        if !(MIN_INDEX_FIELDS..=MAX_INDEX_FIELDS).contains(&arity) {
            return Err(SchemaError::invalid(format!(
                "{index} of {object_type} has {arity} fields; composite indexes need {} to {}",
                MIN_INDEX_FIELDS,
                MAX_INDEX_FIELDS
            )));
        }
        let fields = index
            .fields
            .iter()
            .map(|id| match object_type.field(*id).and_then(|f| f.as_simple()) {
                Some(field) => Ok(SimpleFieldStorageInfo::new(field)),
                None => Err(SchemaError::invalid(format!(
                    "{index} of {object_type} refers to #{id}, which is not a simple field of {object_type}"
                ))),
            })
            .collect::<SchemaResult<Vec<_>>>()?;
        Ok(Self {
            storage_id: index.storage_id,
            name: index.name.clone(),
            object_type: object_type.storage_id,
            fields,
        })
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Common prefix of every key of this index.
    pub fn key_prefix(&self) -> Vec<u8> {
        self.storage_id.to_be_bytes().to_vec()
    }

    /// Binds this index to a store with concrete column types, which must
    /// match the declared field types in number and order.
    pub fn build_index<'a, S, C>(&'a self, store: &'a S, columns: C) -> SchemaResult<CompositeIndex<'a, S, C>>
    where
        S: KvRead + ?Sized,
        C: IndexColumns,
    {
        if C::ARITY != self.arity() {
            return Err(SchemaError::invalid(format!(
                "{self} has {} fields but {} columns were supplied",
                self.arity(),
                C::ARITY
            )));
        }
        let declared: Vec<&str> = self.fields.iter().map(|f| f.type_name.as_str()).collect();
        let supplied = columns.type_names();
        if declared != supplied {
            return Err(SchemaError::invalid(format!(
                "{self} has field types {declared:?} but columns of types {supplied:?} were supplied"
            )));
        }
        debug!("Opened {self} with columns {supplied:?}");
        Ok(CompositeIndex::new(self, store, columns))
    }
}

impl fmt::Display for CompositeIndexStorageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite index \"{}\" (#{})", self.name, self.storage_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field_type::{I64Type, StringType};
    use crate::kv::MemoryKvStore;
    use crate::schema::CounterSchemaField;

    fn person() -> SchemaObjectType {
        SchemaObjectType::new("Person", 10)
            .with_field(SimpleSchemaField::value("name", 11, "string"))
            .with_field(SimpleSchemaField::value("age", 12, "long"))
            .with_field(SimpleSchemaField::value("zip", 13, "string"))
            .with_field(SimpleSchemaField::value("city", 14, "string"))
            .with_field(SimpleSchemaField::value("rank", 15, "long"))
            .with_field(CounterSchemaField::new("visits", 16))
    }

    #[test]
    fn test_resolves_fields_in_declared_order() {
        let info =
            CompositeIndexStorageInfo::new(&person(), &SchemaCompositeIndex::new("ix", 20, [12, 11]))
                .unwrap();
        let names: Vec<&str> = info.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["age", "name"]);
        assert_eq!(info.object_type, 10);
        assert_eq!(info.key_prefix(), vec![0, 0, 0, 20]);
    }

    #[test]
    fn test_arity_outside_range_rejected() {
        for fields in [vec![11], vec![11, 12, 13, 14, 15]] {
            let index = SchemaCompositeIndex::new("ix", 20, fields);
            assert!(matches!(
                CompositeIndexStorageInfo::new(&person(), &index),
                Err(SchemaError::InvalidSchema(_))
            ));
        }
        let four = SchemaCompositeIndex::new("ix", 20, [11, 12, 13, 14]);
        assert_eq!(CompositeIndexStorageInfo::new(&person(), &four).unwrap().arity(), 4);
    }

    #[test]
    fn test_non_simple_field_rejected() {
        let index = SchemaCompositeIndex::new("ix", 20, [11, 16]);
        assert!(CompositeIndexStorageInfo::new(&person(), &index).is_err());
    }

    #[test]
    fn test_column_types_must_match() {
        let store = MemoryKvStore::new();
        let info =
            CompositeIndexStorageInfo::new(&person(), &SchemaCompositeIndex::new("ix", 20, [11, 12]))
                .unwrap();
        assert!(info.build_index(&store, (StringType, I64Type)).is_ok());
        assert!(info.build_index(&store, (I64Type, StringType)).is_err());
        assert!(info.build_index(&store, (StringType, I64Type, I64Type)).is_err());
    }
}
