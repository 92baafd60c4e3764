//! Applying schema versions to a transactional key-value database.
//!
//! Every schema version used against a database is recorded in the
//! database itself, under [`SCHEMA_META_PREFIX`] followed by the 4-byte
//! big-endian version number, as a schema document. A transaction can only
//! be opened against a schema that matches its recorded version, and a new
//! version is only recorded if its storage ids agree with every version
//! recorded before it.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::index::{CompositeIndex, CompositeIndexStorageInfo, IndexColumns};
use crate::kv::{
    KeyRanges, KvDatabase, KvError, KvPairIterator, KvRead, KvStore, KvTransaction,
};
use crate::schema::{
    Compatible, DiffGenerating, SchemaError, SchemaModel, StorageId, StorageIdRegistry,
};

/// Key prefix under which schema versions are recorded. Storage ids never
/// encode to a leading `0xff`, so the prefix cannot collide with object data.
pub const SCHEMA_META_PREFIX: &[u8] = &[0xff, b'S'];

fn version_key(version: u32) -> Vec<u8> {
    let mut key = SCHEMA_META_PREFIX.to_vec();
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn read_versions<S: KvRead + ?Sized>(store: &S) -> Result<BTreeMap<u32, SchemaModel>> {
    let mut versions = BTreeMap::new();
    let pairs = KvPairIterator::new(store, KeyRanges::for_prefix(SCHEMA_META_PREFIX), false);
    for pair in pairs {
        let pair = pair?;
        let suffix: [u8; 4] = pair.key[SCHEMA_META_PREFIX.len()..]
            .try_into()
            .map_err(|_| KvError::Corrupt(format!("invalid schema version key {pair}")))?;
        let version = u32::from_be_bytes(suffix);
        versions.insert(version, SchemaModel::from_bytes(&pair.value)?);
    }
    Ok(versions)
}

/// A key-value database whose contents are governed by recorded schema
/// versions.
pub struct Database<D: KvDatabase> {
    kvdb: D,
}

impl<D: KvDatabase> Database<D> {
    pub fn new(kvdb: D) -> Self {
        Self { kvdb }
    }

    pub fn kv_database(&self) -> &D {
        &self.kvdb
    }

    /// Opens a transaction against `schema` at `version`.
    ///
    /// A `version` of 0 stands for [`SchemaModel::autogenerate_version`].
    /// If the version is already recorded, its schema must be compatible
    /// with `schema`. Otherwise the version is recorded within the new
    /// transaction when `allow_new` is set, and rejected when it is not.
    /// On any error the transaction is rolled back.
    pub fn create_transaction(
        &self,
        schema: &SchemaModel,
        version: u32,
        allow_new: bool,
    ) -> Result<SchemaTransaction<D::Transaction>> {
        schema.validate()?;
        let version = if version == 0 {
            schema.autogenerate_version()
        } else {
            version
        };
        let indexes = index_infos(schema)?;
        let tx = self.kvdb.create_transaction()?;
        match Self::apply_schema(&tx, schema, version, allow_new) {
            Ok(()) => Ok(SchemaTransaction {
                tx,
                schema: schema.clone(),
                version,
                indexes,
            }),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Failed to roll back schema transaction: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn apply_schema(
        tx: &D::Transaction,
        schema: &SchemaModel,
        version: u32,
        allow_new: bool,
    ) -> Result<()> {
        let recorded = read_versions(tx)?;
        if let Some(existing) = recorded.get(&version) {
            if !existing.is_compatible_with(schema) {
                return Err(Error::SchemaMismatch {
                    version,
                    diffs: schema.differences_from(existing),
                });
            }
            debug!("Using recorded schema version {}", version);
            return Ok(());
        }
        if !allow_new {
            return Err(Error::UnknownVersion(version));
        }

        let registry = StorageIdRegistry::build(schema)?;
        for (other_version, other) in &recorded {
            let other_registry = StorageIdRegistry::build(other)?;
            if let Err(e) = registry.check_consistent_with(&other_registry) {
                warn!(
                    "Schema version {} conflicts with recorded version {}: {}",
                    version, other_version, e
                );
                return Err(e.into());
            }
        }

        tx.put(&version_key(version), &schema.to_bytes()?)?;
        info!(
            "Recorded schema version {} with {} object types",
            version,
            schema.object_types.len()
        );
        Ok(())
    }

    /// Every recorded schema version, read in a transaction of its own.
    pub fn schema_versions(&self) -> Result<BTreeMap<u32, SchemaModel>> {
        let tx = self.kvdb.create_transaction()?;
        let result = read_versions(&tx);
        tx.rollback()?;
        result
    }
}

fn index_infos(schema: &SchemaModel) -> Result<BTreeMap<StorageId, CompositeIndexStorageInfo>> {
    let mut infos = BTreeMap::new();
    for object_type in schema.object_types.values() {
        for index in object_type.composite_indexes.values() {
            infos.insert(
                index.storage_id,
                CompositeIndexStorageInfo::new(object_type, index)?,
            );
        }
    }
    Ok(infos)
}

/// An open transaction bound to one schema version.
pub struct SchemaTransaction<T: KvTransaction> {
    tx: T,
    schema: SchemaModel,
    version: u32,
    indexes: BTreeMap<StorageId, CompositeIndexStorageInfo>,
}

impl<T: KvTransaction> SchemaTransaction<T> {
    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The underlying key-value transaction.
    pub fn kv(&self) -> &T {
        &self.tx
    }

    pub fn index_info(&self, storage_id: StorageId) -> Option<&CompositeIndexStorageInfo> {
        self.indexes.get(&storage_id)
    }

    /// A typed view of the composite index with `storage_id`.
    pub fn composite_index<C: IndexColumns>(
        &self,
        storage_id: StorageId,
        columns: C,
    ) -> Result<CompositeIndex<'_, T, C>> {
        let info = self.indexes.get(&storage_id).ok_or_else(|| {
            SchemaError::invalid(format!(
                "schema version {} has no composite index with storage ID {}",
                self.version, storage_id
            ))
        })?;
        Ok(info.build_index(&self.tx, columns)?)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}
