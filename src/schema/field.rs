use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::compat::Compatible;
use super::diff::{DiffGenerating, Diffs};
use super::error::{SchemaError, SchemaResult};
use super::hash::CompatibilityHasher;
use super::validation::{check_name, check_storage_id};

/// Identifies an object type, field, sub-field or composite index in the
/// stored data. Storage ids outlive names: renaming an item keeps its id.
pub type StorageId = u32;

/// Largest valid storage id.
pub const MAX_STORAGE_ID: StorageId = i32::MAX as StorageId;

/// Name of the sub-field of a list or set field.
pub const ELEMENT_FIELD_NAME: &str = "element";
/// Name of the key sub-field of a map field.
pub const KEY_FIELD_NAME: &str = "key";
/// Name of the value sub-field of a map field.
pub const VALUE_FIELD_NAME: &str = "value";

/// What happens to a reference when the object it points to is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteAction {
    /// Deleting the referenced object fails.
    #[default]
    Exception,
    /// The reference is cleared.
    Unreference,
    /// The referring object is deleted too.
    Delete,
    /// The reference is left dangling.
    Nothing,
}

/// The kind of value a simple field holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleFieldKind {
    /// A value of a named field type, e.g. `"int"` or `"string"`.
    Value {
        type_name: String,
        encoding_signature: i64,
    },
    /// A reference to another object, optionally restricted to some object
    /// types. Only the restriction is structural; the delete settings are
    /// behavioral.
    Reference {
        on_delete: DeleteAction,
        cascade_delete: bool,
        allow_deleted: bool,
        object_types: Option<BTreeSet<StorageId>>,
    },
    /// One of an ordered list of identifiers.
    Enum { identifiers: Vec<String> },
}

/// Type name used for reference fields in index metadata.
pub const REFERENCE_TYPE_NAME: &str = "reference";
/// Type name used for enum fields in index metadata.
pub const ENUM_TYPE_NAME: &str = "enum";

/// A field holding a single value: plain, reference or enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleSchemaField {
    pub name: String,
    pub storage_id: StorageId,
    pub indexed: bool,
    pub kind: SimpleFieldKind,
}

impl SimpleSchemaField {
    pub fn value(name: impl Into<String>, storage_id: StorageId, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_id,
            indexed: false,
            kind: SimpleFieldKind::Value {
                type_name: type_name.into(),
                encoding_signature: 0,
            },
        }
    }

    /// An indexed reference field with default delete settings and no
    /// object-type restriction.
    pub fn reference(name: impl Into<String>, storage_id: StorageId) -> Self {
        Self {
            name: name.into(),
            storage_id,
            indexed: true,
            kind: SimpleFieldKind::Reference {
                on_delete: DeleteAction::default(),
                cascade_delete: false,
                allow_deleted: false,
                object_types: None,
            },
        }
    }

    pub fn enumeration<I, S>(name: impl Into<String>, storage_id: StorageId, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            storage_id,
            indexed: false,
            kind: SimpleFieldKind::Enum {
                identifiers: identifiers.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_encoding_signature(mut self, signature: i64) -> Self {
        if let SimpleFieldKind::Value {
            encoding_signature, ..
        } = &mut self.kind
        {
            *encoding_signature = signature;
        }
        self
    }

    pub fn with_object_types<I: IntoIterator<Item = StorageId>>(mut self, ids: I) -> Self {
        if let SimpleFieldKind::Reference { object_types, .. } = &mut self.kind {
            *object_types = Some(ids.into_iter().collect());
        }
        self
    }

    pub fn with_on_delete(mut self, action: DeleteAction) -> Self {
        if let SimpleFieldKind::Reference { on_delete, .. } = &mut self.kind {
            *on_delete = action;
        }
        self
    }

    pub fn with_cascade_delete(mut self, cascade: bool) -> Self {
        if let SimpleFieldKind::Reference { cascade_delete, .. } = &mut self.kind {
            *cascade_delete = cascade;
        }
        self
    }

    pub fn with_allow_deleted(mut self, allow: bool) -> Self {
        if let SimpleFieldKind::Reference { allow_deleted, .. } = &mut self.kind {
            *allow_deleted = allow;
        }
        self
    }

    /// Name of the field's value type as used by index metadata.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            SimpleFieldKind::Value { type_name, .. } => type_name,
            SimpleFieldKind::Reference { .. } => REFERENCE_TYPE_NAME,
            SimpleFieldKind::Enum { .. } => ENUM_TYPE_NAME,
        }
    }

    pub fn field_kind(&self) -> FieldKind {
        match self.kind {
            SimpleFieldKind::Value { .. } => FieldKind::Simple,
            SimpleFieldKind::Reference { .. } => FieldKind::Reference,
            SimpleFieldKind::Enum { .. } => FieldKind::Enum,
        }
    }

    pub fn validate(&self) -> SchemaResult<()> {
        let what = format!("{} \"{}\"", self.field_kind().description(), self.name);
        check_name(&self.name, &what)?;
        check_storage_id(self.storage_id, &what)?;
        match &self.kind {
            SimpleFieldKind::Value { type_name, .. } => {
                if type_name.trim().is_empty() {
                    return Err(SchemaError::invalid(format!("{what} has an empty type name")));
                }
            }
            SimpleFieldKind::Reference { object_types, .. } => {
                for id in object_types.iter().flatten() {
                    check_storage_id(*id, &format!("object type restriction of {what}"))?;
                }
            }
            SimpleFieldKind::Enum { identifiers } => {
                let mut seen = BTreeSet::new();
                for identifier in identifiers {
                    check_name(identifier, &format!("identifier of {what}"))?;
                    if !seen.insert(identifier.as_str()) {
                        return Err(SchemaError::DuplicateName(format!(
                            "{what} has duplicate identifier \"{identifier}\""
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Compatible for SimpleSchemaField {
    fn is_compatible_with(&self, other: &Self) -> bool {
        if self.storage_id != other.storage_id || self.indexed != other.indexed {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                SimpleFieldKind::Value {
                    type_name: t1,
                    encoding_signature: s1,
                },
                SimpleFieldKind::Value {
                    type_name: t2,
                    encoding_signature: s2,
                },
            ) => t1 == t2 && s1 == s2,
            (
                SimpleFieldKind::Reference {
                    object_types: o1, ..
                },
                SimpleFieldKind::Reference {
                    object_types: o2, ..
                },
            ) => o1 == o2,
            (
                SimpleFieldKind::Enum { identifiers: i1 },
                SimpleFieldKind::Enum { identifiers: i2 },
            ) => i1 == i2,
            _ => false,
        }
    }

    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher) {
        hasher.write_str(self.field_kind().element_name());
        hasher.write_u32(self.storage_id);
        hasher.write_bool(self.indexed);
        match &self.kind {
            SimpleFieldKind::Value {
                type_name,
                encoding_signature,
            } => {
                hasher.write_str(type_name);
                hasher.write_i64(*encoding_signature);
            }
            SimpleFieldKind::Reference { object_types, .. } => match object_types {
                None => hasher.write_bool(false),
                Some(ids) => {
                    hasher.write_bool(true);
                    hasher.write_u32(ids.len() as u32);
                    for id in ids {
                        hasher.write_u32(*id);
                    }
                }
            },
            SimpleFieldKind::Enum { identifiers } => {
                hasher.write_u32(identifiers.len() as u32);
                for identifier in identifiers {
                    hasher.write_str(identifier);
                }
            }
        }
    }
}

impl DiffGenerating for SimpleSchemaField {
    fn differences_from(&self, that: &Self) -> Diffs {
        let mut diffs = Diffs::new();
        diffs.add_if_changed("name", &self.name, &that.name);
        diffs.add_if_changed("indexed", &self.indexed, &that.indexed);
        match (&self.kind, &that.kind) {
            (
                SimpleFieldKind::Value {
                    type_name: t1,
                    encoding_signature: s1,
                },
                SimpleFieldKind::Value {
                    type_name: t2,
                    encoding_signature: s2,
                },
            ) => {
                diffs.add_if_changed("type", t1, t2);
                diffs.add_if_changed("encoding signature", s1, s2);
            }
            (
                SimpleFieldKind::Reference {
                    on_delete: d1,
                    cascade_delete: c1,
                    allow_deleted: a1,
                    object_types: o1,
                },
                SimpleFieldKind::Reference {
                    on_delete: d2,
                    cascade_delete: c2,
                    allow_deleted: a2,
                    object_types: o2,
                },
            ) => {
                diffs.add_if_changed("delete action", d1, d2);
                diffs.add_if_changed("cascade delete", c1, c2);
                diffs.add_if_changed("allow deleted", a1, a2);
                diffs.add_if_changed("object types", o1, o2);
            }
            (
                SimpleFieldKind::Enum { identifiers: i1 },
                SimpleFieldKind::Enum { identifiers: i2 },
            ) => diffs.add_if_changed("identifiers", i1, i2),
            _ => diffs.add(format!(
                "changed field kind from {} to {}",
                that.field_kind().description(),
                self.field_kind().description()
            )),
        }
        diffs
    }
}

/// A counter field. Counters are never indexed and have no encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSchemaField {
    pub name: String,
    pub storage_id: StorageId,
}

impl CounterSchemaField {
    pub fn new(name: impl Into<String>, storage_id: StorageId) -> Self {
        Self {
            name: name.into(),
            storage_id,
        }
    }
}

/// The collection kinds of complex fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    Set,
    Map,
}

impl CollectionKind {
    /// Names of the sub-fields this kind of collection requires, in order.
    pub fn sub_field_names(self) -> &'static [&'static str] {
        match self {
            CollectionKind::List | CollectionKind::Set => &[ELEMENT_FIELD_NAME],
            CollectionKind::Map => &[KEY_FIELD_NAME, VALUE_FIELD_NAME],
        }
    }
}

/// A list, set or map field, whose elements are described by simple
/// sub-fields with their own storage ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSchemaField {
    pub name: String,
    pub storage_id: StorageId,
    pub kind: CollectionKind,
    pub sub_fields: Vec<SimpleSchemaField>,
}

impl ComplexSchemaField {
    pub fn list(name: impl Into<String>, storage_id: StorageId, element: SimpleSchemaField) -> Self {
        Self::new(name, storage_id, CollectionKind::List, vec![element])
    }

    pub fn set(name: impl Into<String>, storage_id: StorageId, element: SimpleSchemaField) -> Self {
        Self::new(name, storage_id, CollectionKind::Set, vec![element])
    }

    pub fn map(
        name: impl Into<String>,
        storage_id: StorageId,
        key: SimpleSchemaField,
        value: SimpleSchemaField,
    ) -> Self {
        Self::new(name, storage_id, CollectionKind::Map, vec![key, value])
    }

    fn new(
        name: impl Into<String>,
        storage_id: StorageId,
        kind: CollectionKind,
        sub_fields: Vec<SimpleSchemaField>,
    ) -> Self {
        Self {
            name: name.into(),
            storage_id,
            kind,
            sub_fields,
        }
    }

    pub fn sub_field(&self, name: &str) -> Option<&SimpleSchemaField> {
        self.sub_fields.iter().find(|f| f.name == name)
    }
}

/// The tag of a field variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Simple,
    Reference,
    Enum,
    Counter,
    List,
    Set,
    Map,
}

impl FieldKind {
    /// Element name in the serialized schema format.
    pub fn element_name(self) -> &'static str {
        match self {
            FieldKind::Simple => "SimpleField",
            FieldKind::Reference => "ReferenceField",
            FieldKind::Enum => "EnumField",
            FieldKind::Counter => "CounterField",
            FieldKind::List => "ListField",
            FieldKind::Set => "SetField",
            FieldKind::Map => "MapField",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FieldKind::Simple => "simple field",
            FieldKind::Reference => "reference field",
            FieldKind::Enum => "enum field",
            FieldKind::Counter => "counter field",
            FieldKind::List => "list field",
            FieldKind::Set => "set field",
            FieldKind::Map => "map field",
        }
    }
}

/// A field of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaField {
    Simple(SimpleSchemaField),
    Counter(CounterSchemaField),
    Complex(ComplexSchemaField),
}

impl SchemaField {
    pub fn name(&self) -> &str {
        match self {
            SchemaField::Simple(f) => &f.name,
            SchemaField::Counter(f) => &f.name,
            SchemaField::Complex(f) => &f.name,
        }
    }

    pub fn storage_id(&self) -> StorageId {
        match self {
            SchemaField::Simple(f) => f.storage_id,
            SchemaField::Counter(f) => f.storage_id,
            SchemaField::Complex(f) => f.storage_id,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            SchemaField::Simple(f) => f.field_kind(),
            SchemaField::Counter(_) => FieldKind::Counter,
            SchemaField::Complex(f) => match f.kind {
                CollectionKind::List => FieldKind::List,
                CollectionKind::Set => FieldKind::Set,
                CollectionKind::Map => FieldKind::Map,
            },
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleSchemaField> {
        match self {
            SchemaField::Simple(f) => Some(f),
            _ => None,
        }
    }

    /// Sub-fields of a complex field; empty for other fields.
    pub fn sub_fields(&self) -> &[SimpleSchemaField] {
        match self {
            SchemaField::Complex(f) => &f.sub_fields,
            _ => &[],
        }
    }

    pub fn validate(&self) -> SchemaResult<()> {
        match self {
            SchemaField::Simple(f) => f.validate(),
            SchemaField::Counter(f) => {
                let what = format!("counter field \"{}\"", f.name);
                check_name(&f.name, &what)?;
                check_storage_id(f.storage_id, &what)
            }
            SchemaField::Complex(f) => {
                let what = format!("{} \"{}\"", self.kind().description(), f.name);
                check_name(&f.name, &what)?;
                check_storage_id(f.storage_id, &what)?;
                let expected = f.kind.sub_field_names();
                let actual: Vec<&str> = f.sub_fields.iter().map(|s| s.name.as_str()).collect();
                if actual != expected {
                    return Err(SchemaError::invalid(format!(
                        "{what} must have sub-fields {expected:?} but has {actual:?}"
                    )));
                }
                for sub_field in &f.sub_fields {
                    sub_field.validate()?;
                    if sub_field.storage_id == f.storage_id {
                        return Err(SchemaError::invalid(format!(
                            "sub-field \"{}\" of {what} reuses the parent's storage ID {}",
                            sub_field.name, f.storage_id
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl Compatible for SchemaField {
    fn is_compatible_with(&self, other: &Self) -> bool {
        match (self, other) {
            (SchemaField::Simple(a), SchemaField::Simple(b)) => a.is_compatible_with(b),
            (SchemaField::Counter(a), SchemaField::Counter(b)) => a.storage_id == b.storage_id,
            (SchemaField::Complex(a), SchemaField::Complex(b)) => {
                a.storage_id == b.storage_id
                    && a.kind == b.kind
                    && a.sub_fields.len() == b.sub_fields.len()
                    && a.sub_fields
                        .iter()
                        .zip(&b.sub_fields)
                        .all(|(x, y)| x.is_compatible_with(y))
            }
            _ => false,
        }
    }

    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher) {
        match self {
            SchemaField::Simple(f) => f.write_compatibility_hash(hasher),
            SchemaField::Counter(f) => {
                hasher.write_str(FieldKind::Counter.element_name());
                hasher.write_u32(f.storage_id);
            }
            SchemaField::Complex(f) => {
                hasher.write_str(self.kind().element_name());
                hasher.write_u32(f.storage_id);
                for sub_field in &f.sub_fields {
                    sub_field.write_compatibility_hash(hasher);
                }
            }
        }
    }
}

impl DiffGenerating for SchemaField {
    fn differences_from(&self, that: &Self) -> Diffs {
        match (self, that) {
            (SchemaField::Simple(a), SchemaField::Simple(b)) => a.differences_from(b),
            (SchemaField::Counter(a), SchemaField::Counter(b)) => {
                let mut diffs = Diffs::new();
                diffs.add_if_changed("name", &a.name, &b.name);
                diffs
            }
            (SchemaField::Complex(a), SchemaField::Complex(b)) if a.kind == b.kind => {
                let mut diffs = Diffs::new();
                diffs.add_if_changed("name", &a.name, &b.name);
                for (new, old) in a.sub_fields.iter().zip(&b.sub_fields) {
                    if new.storage_id != old.storage_id {
                        diffs.add(format!(
                            "changed sub-field \"{}\" storage ID from {} to {}",
                            new.name, old.storage_id, new.storage_id
                        ));
                        continue;
                    }
                    let details = new.differences_from(old);
                    if !details.is_empty() {
                        diffs.add_with_details(
                            format!("changed sub-field \"{}\"", new.name),
                            details,
                        );
                    }
                }
                diffs
            }
            _ => {
                let mut diffs = Diffs::new();
                diffs.add(format!(
                    "changed field kind from {} to {}",
                    that.kind().description(),
                    self.kind().description()
                ));
                diffs
            }
        }
    }
}

impl fmt::Display for SchemaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" (#{})",
            self.kind().description(),
            self.name(),
            self.storage_id()
        )
    }
}

impl From<SimpleSchemaField> for SchemaField {
    fn from(field: SimpleSchemaField) -> Self {
        SchemaField::Simple(field)
    }
}

impl From<CounterSchemaField> for SchemaField {
    fn from(field: CounterSchemaField) -> Self {
        SchemaField::Counter(field)
    }
}

impl From<ComplexSchemaField> for SchemaField {
    fn from(field: ComplexSchemaField) -> Self {
        SchemaField::Complex(field)
    }
}
