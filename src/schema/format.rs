//! Durable JSON form of a [`SchemaModel`].
//!
//! ```json
//! {
//!   "SchemaModel": {
//!     "formatVersion": 2,
//!     "ObjectType": [
//!       {
//!         "name": "Person",
//!         "storageId": 10,
//!         "fields": [
//!           { "SimpleField": { "name": "age", "storageId": 11, "type": "int", "indexed": true } }
//!         ],
//!         "compositeIndexes": [ { "name": "byAgeName", "storageId": 20, "fields": [11, 12] } ]
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Readers accept format versions 0 through 2. Version 0 documents (with no
//! `formatVersion`) list object types under `Object`, later versions under
//! `ObjectType`, and only version 2 may declare `compositeIndexes`. Writers
//! always produce version 2 with object types sorted by name, so the output
//! for a given schema is deterministic.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use super::composite_index::SchemaCompositeIndex;
use super::error::{SchemaError, SchemaResult};
use super::field::{
    CollectionKind, ComplexSchemaField, CounterSchemaField, DeleteAction, SchemaField,
    SimpleFieldKind, SimpleSchemaField, StorageId, ELEMENT_FIELD_NAME, KEY_FIELD_NAME,
    VALUE_FIELD_NAME,
};
use super::model::SchemaModel;
use super::object_type::SchemaObjectType;

/// Format version written by this crate.
pub const CURRENT_FORMAT_VERSION: u64 = 2;

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(rename = "SchemaModel")]
    model: ModelElement,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ModelElement {
    #[serde(default)]
    format_version: u64,
    #[serde(rename = "ObjectType", default, skip_serializing_if = "Option::is_none")]
    object_types: Option<Vec<ObjectTypeElement>>,
    #[serde(rename = "Object", default, skip_serializing_if = "Option::is_none")]
    legacy_object_types: Option<Vec<ObjectTypeElement>>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ObjectTypeElement {
    name: String,
    storage_id: StorageId,
    #[serde(default)]
    fields: Vec<FieldElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    composite_indexes: Option<Vec<CompositeIndexElement>>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CompositeIndexElement {
    name: String,
    storage_id: StorageId,
    fields: Vec<StorageId>,
}

#[derive(Serialize, Deserialize)]
enum FieldElement {
    SimpleField(SimpleFieldElement),
    ReferenceField(ReferenceFieldElement),
    EnumField(EnumFieldElement),
    CounterField(CounterFieldElement),
    ListField(CollectionFieldElement),
    SetField(CollectionFieldElement),
    MapField(MapFieldElement),
}

/// The simple field variants that may appear as sub-fields.
#[derive(Serialize, Deserialize)]
enum SubFieldElement {
    SimpleField(SimpleFieldElement),
    ReferenceField(ReferenceFieldElement),
    EnumField(EnumFieldElement),
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

fn is_default_action(value: &DeleteAction) -> bool {
    *value == DeleteAction::default()
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SimpleFieldElement {
    // Sub-fields take their names from their position and omit this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    storage_id: StorageId,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    encoding_signature: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    indexed: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ReferenceFieldElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    storage_id: StorageId,
    #[serde(default, skip_serializing_if = "is_false")]
    indexed: bool,
    #[serde(default, skip_serializing_if = "is_default_action")]
    on_delete: DeleteAction,
    #[serde(default, skip_serializing_if = "is_false")]
    cascade_delete: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    allow_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_types: Option<BTreeSet<StorageId>>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct EnumFieldElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    storage_id: StorageId,
    #[serde(default, skip_serializing_if = "is_false")]
    indexed: bool,
    identifiers: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CounterFieldElement {
    name: String,
    storage_id: StorageId,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct CollectionFieldElement {
    name: String,
    storage_id: StorageId,
    element: SubFieldElement,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct MapFieldElement {
    name: String,
    storage_id: StorageId,
    key: SubFieldElement,
    value: SubFieldElement,
}

fn format_error(msg: String) -> SchemaError {
    SchemaError::Format(serde_json::Error::custom(msg))
}

// Writing

impl From<&SimpleSchemaField> for SubFieldElement {
    fn from(field: &SimpleSchemaField) -> Self {
        let name = None;
        let storage_id = field.storage_id;
        let indexed = field.indexed;
        match &field.kind {
            SimpleFieldKind::Value {
                type_name,
                encoding_signature,
            } => SubFieldElement::SimpleField(SimpleFieldElement {
                name,
                storage_id,
                type_name: type_name.clone(),
                encoding_signature: *encoding_signature,
                indexed,
            }),
            SimpleFieldKind::Reference {
                on_delete,
                cascade_delete,
                allow_deleted,
                object_types,
            } => SubFieldElement::ReferenceField(ReferenceFieldElement {
                name,
                storage_id,
                indexed,
                on_delete: *on_delete,
                cascade_delete: *cascade_delete,
                allow_deleted: *allow_deleted,
                object_types: object_types.clone(),
            }),
            SimpleFieldKind::Enum { identifiers } => SubFieldElement::EnumField(EnumFieldElement {
                name,
                storage_id,
                indexed,
                identifiers: identifiers.clone(),
            }),
        }
    }
}

impl From<&SchemaField> for FieldElement {
    fn from(field: &SchemaField) -> Self {
        match field {
            SchemaField::Simple(simple) => {
                let name = Some(simple.name.clone());
                match SubFieldElement::from(simple) {
                    SubFieldElement::SimpleField(e) => {
                        FieldElement::SimpleField(SimpleFieldElement { name, ..e })
                    }
                    SubFieldElement::ReferenceField(e) => {
                        FieldElement::ReferenceField(ReferenceFieldElement { name, ..e })
                    }
                    SubFieldElement::EnumField(e) => {
                        FieldElement::EnumField(EnumFieldElement { name, ..e })
                    }
                }
            }
            SchemaField::Counter(counter) => FieldElement::CounterField(CounterFieldElement {
                name: counter.name.clone(),
                storage_id: counter.storage_id,
            }),
            SchemaField::Complex(complex) => {
                let mut subs = complex.sub_fields.iter().map(SubFieldElement::from);
                match complex.kind {
                    CollectionKind::List | CollectionKind::Set => {
                        let element = CollectionFieldElement {
                            name: complex.name.clone(),
                            storage_id: complex.storage_id,
                            element: subs.next().unwrap_or_else(placeholder_sub_field),
                        };
                        if complex.kind == CollectionKind::List {
                            FieldElement::ListField(element)
                        } else {
                            FieldElement::SetField(element)
                        }
                    }
                    CollectionKind::Map => FieldElement::MapField(MapFieldElement {
                        name: complex.name.clone(),
                        storage_id: complex.storage_id,
                        key: subs.next().unwrap_or_else(placeholder_sub_field),
                        value: subs.next().unwrap_or_else(placeholder_sub_field),
                    }),
                }
            }
        }
    }
}

/// Stands in for a missing sub-field of an unvalidated complex field; the
/// resulting document fails validation when read back.
fn placeholder_sub_field() -> SubFieldElement {
    SubFieldElement::SimpleField(SimpleFieldElement {
        name: None,
        storage_id: 0,
        type_name: String::new(),
        encoding_signature: 0,
        indexed: false,
    })
}

impl From<&SchemaObjectType> for ObjectTypeElement {
    fn from(object_type: &SchemaObjectType) -> Self {
        let composite_indexes: Vec<CompositeIndexElement> = object_type
            .composite_indexes
            .values()
            .map(|index| CompositeIndexElement {
                name: index.name.clone(),
                storage_id: index.storage_id,
                fields: index.fields.clone(),
            })
            .collect();
        Self {
            name: object_type.name.clone(),
            storage_id: object_type.storage_id,
            fields: object_type.fields.values().map(FieldElement::from).collect(),
            composite_indexes: (!composite_indexes.is_empty()).then_some(composite_indexes),
        }
    }
}

impl From<&SchemaModel> for Document {
    fn from(model: &SchemaModel) -> Self {
        let mut object_types: Vec<&SchemaObjectType> = model.object_types.values().collect();
        object_types.sort_by(|a, b| a.name.cmp(&b.name).then(a.storage_id.cmp(&b.storage_id)));
        Document {
            model: ModelElement {
                format_version: CURRENT_FORMAT_VERSION,
                object_types: Some(object_types.into_iter().map(ObjectTypeElement::from).collect()),
                legacy_object_types: None,
            },
        }
    }
}

// Reading

impl SubFieldElement {
    fn into_field(self, default_name: &str) -> SimpleSchemaField {
        match self {
            SubFieldElement::SimpleField(e) => SimpleSchemaField {
                name: e.name.unwrap_or_else(|| default_name.to_string()),
                storage_id: e.storage_id,
                indexed: e.indexed,
                kind: SimpleFieldKind::Value {
                    type_name: e.type_name,
                    encoding_signature: e.encoding_signature,
                },
            },
            SubFieldElement::ReferenceField(e) => SimpleSchemaField {
                name: e.name.unwrap_or_else(|| default_name.to_string()),
                storage_id: e.storage_id,
                indexed: e.indexed,
                kind: SimpleFieldKind::Reference {
                    on_delete: e.on_delete,
                    cascade_delete: e.cascade_delete,
                    allow_deleted: e.allow_deleted,
                    object_types: e.object_types,
                },
            },
            SubFieldElement::EnumField(e) => SimpleSchemaField {
                name: e.name.unwrap_or_else(|| default_name.to_string()),
                storage_id: e.storage_id,
                indexed: e.indexed,
                kind: SimpleFieldKind::Enum {
                    identifiers: e.identifiers,
                },
            },
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            SubFieldElement::SimpleField(e) => e.name.as_deref(),
            SubFieldElement::ReferenceField(e) => e.name.as_deref(),
            SubFieldElement::EnumField(e) => e.name.as_deref(),
        }
    }

    fn storage_id(&self) -> StorageId {
        match self {
            SubFieldElement::SimpleField(e) => e.storage_id,
            SubFieldElement::ReferenceField(e) => e.storage_id,
            SubFieldElement::EnumField(e) => e.storage_id,
        }
    }
}

impl FieldElement {
    fn into_field(self) -> SchemaResult<SchemaField> {
        let top_level = |sub: SubFieldElement| -> SchemaResult<SchemaField> {
            if sub.name().is_none() {
                return Err(format_error(format!(
                    "field with storage ID {} has no name",
                    sub.storage_id()
                )));
            }
            Ok(SchemaField::Simple(sub.into_field("")))
        };
        match self {
            FieldElement::SimpleField(e) => top_level(SubFieldElement::SimpleField(e)),
            FieldElement::ReferenceField(e) => top_level(SubFieldElement::ReferenceField(e)),
            FieldElement::EnumField(e) => top_level(SubFieldElement::EnumField(e)),
            FieldElement::CounterField(e) => {
                Ok(CounterSchemaField::new(e.name, e.storage_id).into())
            }
            FieldElement::ListField(e) => Ok(ComplexSchemaField::list(
                e.name,
                e.storage_id,
                e.element.into_field(ELEMENT_FIELD_NAME),
            )
            .into()),
            FieldElement::SetField(e) => Ok(ComplexSchemaField::set(
                e.name,
                e.storage_id,
                e.element.into_field(ELEMENT_FIELD_NAME),
            )
            .into()),
            FieldElement::MapField(e) => Ok(ComplexSchemaField::map(
                e.name,
                e.storage_id,
                e.key.into_field(KEY_FIELD_NAME),
                e.value.into_field(VALUE_FIELD_NAME),
            )
            .into()),
        }
    }
}

impl ObjectTypeElement {
    fn into_object_type(self, format_version: u64) -> SchemaResult<SchemaObjectType> {
        let mut object_type = SchemaObjectType::new(self.name, self.storage_id);
        for element in self.fields {
            let field = element.into_field()?;
            if object_type.fields.contains_key(&field.storage_id()) {
                return Err(format_error(format!(
                    "{} declares storage ID {} for more than one field",
                    object_type,
                    field.storage_id()
                )));
            }
            object_type.add_field(field);
        }
        if let Some(indexes) = self.composite_indexes {
            if format_version < 2 {
                return Err(format_error(format!(
                    "{object_type} declares composite indexes, which require format version 2 but the document is version {format_version}"
                )));
            }
            for index in indexes {
                if object_type.composite_indexes.contains_key(&index.storage_id) {
                    return Err(format_error(format!(
                        "{} declares storage ID {} for more than one composite index",
                        object_type, index.storage_id
                    )));
                }
                object_type = object_type.with_composite_index(SchemaCompositeIndex::new(
                    index.name,
                    index.storage_id,
                    index.fields,
                ));
            }
        }
        Ok(object_type)
    }
}

impl ModelElement {
    fn into_model(self) -> SchemaResult<SchemaModel> {
        let elements = match self.format_version {
            0 => {
                if self.object_types.is_some() {
                    return Err(format_error(
                        "format version 0 documents list object types under \"Object\"".to_string(),
                    ));
                }
                self.legacy_object_types
            }
            1 | 2 => {
                if self.legacy_object_types.is_some() {
                    return Err(format_error(format!(
                        "format version {} documents list object types under \"ObjectType\"",
                        self.format_version
                    )));
                }
                self.object_types
            }
            other => return Err(SchemaError::UnsupportedFormatVersion(other)),
        };

        let mut model = SchemaModel::new();
        for element in elements.unwrap_or_default() {
            let object_type = element.into_object_type(self.format_version)?;
            if let Some(existing) = model.object_type(object_type.storage_id) {
                return Err(format_error(format!(
                    "duplicate use of storage ID {} by {} and {}",
                    object_type.storage_id, existing, object_type
                )));
            }
            model.add_object_type(object_type);
        }
        Ok(model)
    }
}

impl SchemaModel {
    /// Parses and validates a schema document.
    pub fn from_bytes(bytes: &[u8]) -> SchemaResult<Self> {
        let document: Document = serde_json::from_slice(bytes)?;
        let model = document.model.into_model()?;
        model.validate()?;
        Ok(model)
    }

    /// Renders this schema as a current-version document.
    pub fn to_bytes(&self) -> SchemaResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&Document::from(self))?)
    }

    /// Reads and validates a schema document; `source` identifies the
    /// reader in error messages.
    pub fn read_from<R: Read>(mut reader: R, source: &str) -> SchemaResult<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| SchemaError::Io {
                source_id: source.to_string(),
                source: e,
            })?;
        Self::from_bytes(&bytes)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> SchemaResult<()> {
        let bytes = self.to_bytes()?;
        writer
            .write_all(&bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| SchemaError::Io {
                source_id: "schema output".to_string(),
                source: e,
            })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| SchemaError::Io {
            source_id: path.display().to_string(),
            source: e,
        })?;
        Self::read_from(file, &path.display().to_string())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SchemaResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()?).map_err(|e| SchemaError::Io {
            source_id: path.display().to_string(),
            source: e,
        })
    }
}

impl fmt::Display for SchemaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&Document::from(self)).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> SchemaResult<SchemaModel> {
        SchemaModel::from_bytes(value.to_string().as_bytes())
    }

    #[test]
    fn test_reads_version_two() {
        let model = parse(json!({
            "SchemaModel": {
                "formatVersion": 2,
                "ObjectType": [{
                    "name": "Person",
                    "storageId": 10,
                    "fields": [
                        { "SimpleField": { "name": "age", "storageId": 11, "type": "int", "indexed": true } },
                        { "SimpleField": { "name": "name", "storageId": 12, "type": "string" } },
                        { "MapField": {
                            "name": "scores", "storageId": 13,
                            "key": { "SimpleField": { "storageId": 14, "type": "string" } },
                            "value": { "SimpleField": { "storageId": 15, "type": "int" } }
                        } }
                    ],
                    "compositeIndexes": [{ "name": "byAgeName", "storageId": 20, "fields": [11, 12] }]
                }]
            }
        }))
        .unwrap();

        let person = model.object_type(10).unwrap();
        assert_eq!(person.fields.len(), 3);
        assert_eq!(person.field(13).unwrap().sub_fields()[1].name, "value");
        assert_eq!(person.composite_indexes[&20].fields, vec![11, 12]);
    }

    #[test]
    fn test_version_zero_uses_object_tag() {
        let model = parse(json!({
            "SchemaModel": {
                "Object": [{ "name": "Thing", "storageId": 1, "fields": [
                    { "CounterField": { "name": "hits", "storageId": 2 } }
                ] }]
            }
        }))
        .unwrap();
        assert!(model.object_type_by_name("Thing").is_some());

        let err = parse(json!({ "SchemaModel": { "ObjectType": [] } })).unwrap_err();
        assert!(matches!(err, SchemaError::Format(_)));
    }

    #[test]
    fn test_composite_indexes_require_version_two() {
        let err = parse(json!({
            "SchemaModel": {
                "formatVersion": 1,
                "ObjectType": [{
                    "name": "Person", "storageId": 10,
                    "fields": [
                        { "SimpleField": { "name": "a", "storageId": 11, "type": "int" } },
                        { "SimpleField": { "name": "b", "storageId": 12, "type": "int" } }
                    ],
                    "compositeIndexes": [{ "name": "ab", "storageId": 20, "fields": [11, 12] }]
                }]
            }
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::Format(_)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = parse(json!({ "SchemaModel": { "formatVersion": 3, "ObjectType": [] } })).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFormatVersion(3)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = parse(json!({
            "SchemaModel": { "formatVersion": 2, "ObjectType": [
                { "name": "A", "storageId": 1, "color": "blue" }
            ] }
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::Format(_)));
    }

    #[test]
    fn test_duplicate_object_type_id_rejected() {
        let err = parse(json!({
            "SchemaModel": { "formatVersion": 2, "ObjectType": [
                { "name": "A", "storageId": 1 },
                { "name": "B", "storageId": 1 }
            ] }
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::Format(_)));
    }

    #[test]
    fn test_reading_validates() {
        let err = parse(json!({
            "SchemaModel": { "formatVersion": 2, "ObjectType": [
                { "name": "not valid", "storageId": 1 }
            ] }
        }))
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }

    #[test]
    fn test_writer_sorts_object_types_by_name() {
        let model = SchemaModel::new()
            .with_object_type(SchemaObjectType::new("Zebra", 1))
            .with_object_type(SchemaObjectType::new("Aardvark", 2));
        let value: serde_json::Value = serde_json::from_slice(&model.to_bytes().unwrap()).unwrap();
        let names: Vec<&str> = value["SchemaModel"]["ObjectType"]
            .as_array()
            .unwrap()
            .iter()
            .map(|ot| ot["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Aardvark", "Zebra"]);
        assert_eq!(value["SchemaModel"]["formatVersion"], 2);
        assert_eq!(model.to_string().into_bytes(), model.to_bytes().unwrap());
    }
}
