//! Composite indexes over two to four simple fields of an object type.
//!
//! [`CompositeIndexStorageInfo`] resolves a schema index against its object
//! type; [`CompositeIndexStorageInfo::build_index`] binds it to a store and
//! a tuple of [`FieldType`] codecs, yielding a typed [`CompositeIndex`].

pub mod columns;
pub mod composite;
pub mod field_type;
pub mod storage_info;

pub use columns::IndexColumns;
pub use composite::{CompositeIndex, IndexEntries};
pub use field_type::{BoolType, FieldType, I64Type, ObjId, ObjIdType, StringType};
pub use storage_info::{CompositeIndexStorageInfo, SimpleFieldStorageInfo};
