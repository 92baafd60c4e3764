//! Versioned schema model.
//!
//! A [`SchemaModel`] describes object types, their fields and composite
//! indexes, each identified by a storage id that never changes across
//! versions. Models can be validated, compared for structural
//! compatibility, hashed, diffed, and read from or written to a versioned
//! JSON document.

pub mod compat;
pub mod composite_index;
pub mod diff;
pub mod error;
pub mod field;
pub mod format;
pub mod hash;
pub mod model;
pub mod object_type;
pub mod registry;
pub mod validation;

pub use compat::Compatible;
pub use composite_index::SchemaCompositeIndex;
pub use diff::{Diff, DiffGenerating, Diffs};
pub use error::{SchemaError, SchemaResult};
pub use field::{
    CollectionKind, ComplexSchemaField, CounterSchemaField, DeleteAction, FieldKind, SchemaField,
    SimpleFieldKind, SimpleSchemaField, StorageId, MAX_STORAGE_ID,
};
pub use format::CURRENT_FORMAT_VERSION;
pub use hash::CompatibilityHasher;
pub use model::SchemaModel;
pub use object_type::SchemaObjectType;
pub use registry::{SchemaItem, StorageIdRegistry};
