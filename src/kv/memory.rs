use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use super::error::{KvError, KvResult};
use super::key_range::KeyRange;
use super::store::{KvPair, KvRead, KvStore};

pub(crate) type KvMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Lowest entry of `map` with key `>= min_key`.
pub(crate) fn map_get_at_least(map: &KvMap, min_key: &[u8]) -> Option<KvPair> {
    map.range::<[u8], _>((Bound::Included(min_key), Bound::Unbounded))
        .next()
        .map(|(k, v)| KvPair::new(k.clone(), v.clone()))
}

/// Highest entry of `map` with key `< max_key`, or the last entry if unbounded.
pub(crate) fn map_get_at_most(map: &KvMap, max_key: Option<&[u8]>) -> Option<KvPair> {
    let upper = max_key.map_or(Bound::Unbounded, Bound::Excluded);
    map.range::<[u8], _>((Bound::Unbounded, upper))
        .next_back()
        .map(|(k, v)| KvPair::new(k.clone(), v.clone()))
}

pub(crate) fn map_remove_range(map: &mut KvMap, range: &KeyRange) {
    let upper = range.max().map_or(Bound::Unbounded, Bound::Excluded);
    let doomed: Vec<Vec<u8>> = map
        .range::<[u8], _>((Bound::Included(range.min()), upper))
        .map(|(k, _)| k.clone())
        .collect();
    for key in doomed {
        map.remove(&key);
    }
}

/// A non-transactional store held entirely in memory.
///
/// Every call is individually atomic; there is no isolation across calls.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<KvMap>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> KvResult<usize> {
        Ok(self.data.read().map_err(KvError::poisoned)?.len())
    }

    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl KvRead for MemoryKvStore {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let data = self.data.read().map_err(KvError::poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn get_at_least(&self, min_key: &[u8]) -> KvResult<Option<KvPair>> {
        let data = self.data.read().map_err(KvError::poisoned)?;
        Ok(map_get_at_least(&data, min_key))
    }

    fn get_at_most(&self, max_key: Option<&[u8]>) -> KvResult<Option<KvPair>> {
        let data = self.data.read().map_err(KvError::poisoned)?;
        Ok(map_get_at_most(&data, max_key))
    }
}

impl KvStore for MemoryKvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        let mut data = self.data.write().map_err(KvError::poisoned)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> KvResult<()> {
        let mut data = self.data.write().map_err(KvError::poisoned)?;
        data.remove(key);
        Ok(())
    }

    fn remove_range(&self, min_key: &[u8], max_key: Option<&[u8]>) -> KvResult<()> {
        let range = KeyRange::new(min_key, max_key.map(<[u8]>::to_vec))?;
        let mut data = self.data.write().map_err(KvError::poisoned)?;
        map_remove_range(&mut data, &range);
        Ok(())
    }
}
