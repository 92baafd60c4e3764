//! fold_kv: a versioned schema layer over ordered key-value storage.
//!
//! - [`kv`]: byte-key ranges, the store and transaction contracts, a
//!   range-restricted iterator, in-memory implementations and the atomic
//!   store wrapper with snapshots.
//! - [`schema`]: object types, fields and composite indexes with storage
//!   ids, validation, compatibility, hashing, diffs and a JSON format.
//! - [`index`]: typed composite index views over a store.
//! - [`database`]: recording schema versions in a database and opening
//!   transactions against them.

pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod kv;
pub mod logging;
pub mod schema;

pub use config::{Config, ConfigError};
pub use database::{Database, SchemaTransaction};
pub use error::{Error, Result};
pub use index::{CompositeIndex, CompositeIndexStorageInfo, ObjId};
pub use kv::{
    AtomicKvDatabase, KeyRange, KeyRanges, KvDatabase, KvError, KvRead, KvStore, KvTransaction,
    SimpleKvDatabase,
};
pub use logging::{init_logging, LogConfig};
pub use schema::{SchemaError, SchemaModel};
