use log::trace;

use super::columns::IndexColumns;
use super::field_type::{FieldType, ObjId, ObjIdType};
use super::storage_info::CompositeIndexStorageInfo;
use crate::kv::{KeyRanges, KvError, KvPairIterator, KvRead, KvResult, KvStore};

/// A typed view of one composite index in a store.
///
/// Each entry is a key `storage_id || v1 || ... || vn || obj_id` with an
/// empty value, so entries sort by the column values in declared order and
/// then by object id.
pub struct CompositeIndex<'a, S: ?Sized, C> {
    info: &'a CompositeIndexStorageInfo,
    store: &'a S,
    columns: C,
    prefix: Vec<u8>,
}

impl<'a, S, C> CompositeIndex<'a, S, C>
where
    S: KvRead + ?Sized,
    C: IndexColumns,
{
    pub(crate) fn new(info: &'a CompositeIndexStorageInfo, store: &'a S, columns: C) -> Self {
        Self {
            prefix: info.key_prefix(),
            info,
            store,
            columns,
        }
    }

    pub fn info(&self) -> &CompositeIndexStorageInfo {
        self.info
    }

    /// Encodes the index entry for `values` and object `id`.
    pub fn key(&self, values: &C::Values, id: ObjId) -> Vec<u8> {
        let mut key = self.values_prefix(values);
        ObjIdType.write(&id, &mut key);
        key
    }

    fn values_prefix(&self, values: &C::Values) -> Vec<u8> {
        let mut key = self.prefix.clone();
        self.columns.write_values(values, &mut key);
        key
    }

    /// Splits an index key back into its column values and object id.
    pub fn decode_key(&self, key: &[u8]) -> KvResult<(C::Values, ObjId)> {
        let mut input = key.strip_prefix(self.prefix.as_slice()).ok_or_else(|| {
            KvError::Corrupt(format!("key does not belong to {}", self.info))
        })?;
        let values = self.columns.read_values(&mut input)?;
        let id = ObjIdType.read(&mut input)?;
        if !input.is_empty() {
            return Err(KvError::Corrupt(format!(
                "{} trailing bytes in key of {}",
                input.len(),
                self.info
            )));
        }
        Ok((values, id))
    }

    pub fn contains(&self, values: &C::Values, id: ObjId) -> KvResult<bool> {
        Ok(self.store.get(&self.key(values, id))?.is_some())
    }

    /// All entries in ascending order.
    pub fn entries(&self) -> IndexEntries<'_, S, C> {
        self.scan(self.prefix.clone(), false)
    }

    /// All entries in descending order.
    pub fn entries_rev(&self) -> IndexEntries<'_, S, C> {
        self.scan(self.prefix.clone(), true)
    }

    /// Ids of the objects indexed under exactly `values`, in ascending order.
    pub fn objects_with(&self, values: &C::Values) -> KvResult<Vec<ObjId>> {
        self.scan(self.values_prefix(values), false)
            .map(|entry| entry.map(|(_, id)| id))
            .collect()
    }

    fn scan(&self, prefix: Vec<u8>, reverse: bool) -> IndexEntries<'_, S, C> {
        IndexEntries {
            index: self,
            pairs: KvPairIterator::new(self.store, KeyRanges::for_prefix(&prefix), reverse),
        }
    }
}

impl<'a, S, C> CompositeIndex<'a, S, C>
where
    S: KvStore + ?Sized,
    C: IndexColumns,
{
    pub fn insert(&self, values: &C::Values, id: ObjId) -> KvResult<()> {
        trace!("Indexing {id} under {values:?} in {}", self.info);
        self.store.put(&self.key(values, id), &[])
    }

    pub fn remove(&self, values: &C::Values, id: ObjId) -> KvResult<()> {
        trace!("Removing {id} under {values:?} from {}", self.info);
        self.store.remove(&self.key(values, id))
    }
}

/// Decoded entries of a [`CompositeIndex`].
pub struct IndexEntries<'i, S: KvRead + ?Sized, C> {
    index: &'i CompositeIndex<'i, S, C>,
    pairs: KvPairIterator<'i, S>,
}

impl<'i, S, C> Iterator for IndexEntries<'i, S, C>
where
    S: KvRead + ?Sized,
    C: IndexColumns,
{
    type Item = KvResult<(C::Values, ObjId)>;

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.pairs.next()?;
        Some(pair.and_then(|pair| self.index.decode_key(&pair.key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field_type::{BoolType, I64Type, StringType};
    use crate::kv::{KvDatabase, KvTransaction, MemoryKvStore, SimpleKvDatabase};
    use crate::schema::{SchemaCompositeIndex, SchemaObjectType, SimpleSchemaField};

    fn person() -> SchemaObjectType {
        SchemaObjectType::new("Person", 10)
            .with_field(SimpleSchemaField::value("name", 11, "string"))
            .with_field(SimpleSchemaField::value("age", 12, "long"))
            .with_field(SimpleSchemaField::value("active", 13, "boolean"))
            .with_field(SimpleSchemaField::reference("friend", 14))
            .with_composite_index(SchemaCompositeIndex::new("byNameAge", 20, [11, 12]))
            .with_composite_index(SchemaCompositeIndex::new("byAll", 21, [13, 11, 12, 14]))
    }

    fn info(index_id: u32) -> CompositeIndexStorageInfo {
        let ot = person();
        CompositeIndexStorageInfo::new(&ot, &ot.composite_indexes[&index_id]).unwrap()
    }

    #[test]
    fn test_entries_sort_by_values_then_object() {
        let store = MemoryKvStore::new();
        let info = info(20);
        let index = info.build_index(&store, (StringType, I64Type)).unwrap();

        index.insert(&("bob".to_string(), 30), ObjId(7)).unwrap();
        index.insert(&("alice".to_string(), 40), ObjId(9)).unwrap();
        index.insert(&("bob".to_string(), -2), ObjId(3)).unwrap();
        index.insert(&("bob".to_string(), 30), ObjId(1)).unwrap();

        let entries: Vec<_> = index.entries().collect::<KvResult<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                (("alice".to_string(), 40), ObjId(9)),
                (("bob".to_string(), -2), ObjId(3)),
                (("bob".to_string(), 30), ObjId(1)),
                (("bob".to_string(), 30), ObjId(7)),
            ]
        );

        let mut reversed: Vec<_> = index.entries_rev().collect::<KvResult<_>>().unwrap();
        reversed.reverse();
        assert_eq!(reversed, entries);

        assert_eq!(
            index.objects_with(&("bob".to_string(), 30)).unwrap(),
            vec![ObjId(1), ObjId(7)]
        );
        assert!(index.objects_with(&("carol".to_string(), 30)).unwrap().is_empty());
    }

    #[test]
    fn test_remove_and_contains() {
        let store = MemoryKvStore::new();
        let info = info(20);
        let index = info.build_index(&store, (StringType, I64Type)).unwrap();
        let values = ("dave".to_string(), 5);

        index.insert(&values, ObjId(2)).unwrap();
        assert!(index.contains(&values, ObjId(2)).unwrap());
        assert!(!index.contains(&values, ObjId(3)).unwrap());
        index.remove(&values, ObjId(2)).unwrap();
        assert!(!index.contains(&values, ObjId(2)).unwrap());
        assert_eq!(index.entries().count(), 0);
    }

    #[test]
    fn test_indexes_do_not_overlap() {
        let store = MemoryKvStore::new();
        let pair_info = info(20);
        let all_info = info(21);
        let pair = pair_info.build_index(&store, (StringType, I64Type)).unwrap();
        let all = all_info
            .build_index(&store, (BoolType, StringType, I64Type, ObjIdType))
            .unwrap();

        pair.insert(&("x".to_string(), 1), ObjId(1)).unwrap();
        all.insert(&(true, "x".to_string(), 1, ObjId(5)), ObjId(1)).unwrap();
        all.insert(&(false, "y".to_string(), 2, ObjId(6)), ObjId(2)).unwrap();

        assert_eq!(pair.entries().count(), 1);
        let first = all.entries().next().unwrap().unwrap();
        assert_eq!(first, ((false, "y".to_string(), 2, ObjId(6)), ObjId(2)));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        let store = MemoryKvStore::new();
        let info = info(20);
        let index = info.build_index(&store, (StringType, I64Type)).unwrap();
        let mut key = index.key(&("z".to_string(), 0), ObjId(1));
        assert!(index.decode_key(&key).is_ok());
        key.push(0);
        assert!(matches!(index.decode_key(&key), Err(KvError::Corrupt(_))));
        assert!(matches!(index.decode_key(&[0, 0, 0, 99]), Err(KvError::Corrupt(_))));
    }

    #[test]
    fn test_index_inside_transaction() {
        let db = SimpleKvDatabase::new();
        db.start().unwrap();
        let info = info(20);

        let tx = db.create_transaction().unwrap();
        let index = info.build_index(&tx, (StringType, I64Type)).unwrap();
        index.insert(&("erin".to_string(), 22), ObjId(4)).unwrap();
        drop(index);
        tx.commit().unwrap();

        let tx = db.create_transaction().unwrap();
        let index = info.build_index(&tx, (StringType, I64Type)).unwrap();
        assert!(index.contains(&("erin".to_string(), 22), ObjId(4)).unwrap());
        drop(index);
        tx.rollback().unwrap();
    }
}
