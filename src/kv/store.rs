use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{KvError, KvResult};
use super::key_range::KeyRange;
use super::key_ranges::KeyRanges;
use super::pair_iterator::KvPairIterator;

/// A key and its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KvPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}",
            super::bytes::describe(&self.key),
            hex::encode(&self.value)
        )
    }
}

/// Read access to an ordered byte-keyed store.
///
/// Keys are ordered lexicographically as unsigned bytes. Implementations
/// include plain stores, open transactions and read-only snapshots.
pub trait KvRead: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Returns the pair with the lowest key greater than or equal to `min_key`.
    fn get_at_least(&self, min_key: &[u8]) -> KvResult<Option<KvPair>>;

    /// Returns the pair with the highest key strictly less than `max_key`,
    /// or the highest key overall when `max_key` is `None`.
    fn get_at_most(&self, max_key: Option<&[u8]>) -> KvResult<Option<KvPair>>;

    /// Iterates the pairs in `[min_key, max_key)` in either direction.
    fn get_range(
        &self,
        min_key: &[u8],
        max_key: Option<&[u8]>,
        reverse: bool,
    ) -> KvResult<KvPairIterator<'_, Self>>
    where
        Self: Sized,
    {
        let range = KeyRange::new(min_key, max_key.map(<[u8]>::to_vec))?;
        Ok(KvPairIterator::new(self, KeyRanges::single(range), reverse))
    }

    /// Encodes a counter value into the form expected by [`KvStore::adjust_counter`].
    fn encode_counter(&self, value: i64) -> KvResult<Vec<u8>> {
        Ok(value.to_be_bytes().to_vec())
    }

    /// Decodes a value previously produced by [`KvRead::encode_counter`].
    fn decode_counter(&self, value: &[u8]) -> KvResult<i64> {
        let bytes: [u8; 8] = value.try_into().map_err(|_| {
            KvError::InvalidCounter(format!(
                "expected 8 bytes but found {}",
                value.len()
            ))
        })?;
        Ok(i64::from_be_bytes(bytes))
    }
}

/// Read/write access to an ordered byte-keyed store.
pub trait KvStore: KvRead {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    fn remove(&self, key: &[u8]) -> KvResult<()>;

    /// Removes every key in `[min_key, max_key)`; `None` means the end of
    /// the keyspace.
    fn remove_range(&self, min_key: &[u8], max_key: Option<&[u8]>) -> KvResult<()>;

    /// Adds `amount` to the counter stored under `key`. Missing keys and
    /// values that do not decode as counters are left untouched.
    fn adjust_counter(&self, key: &[u8], amount: i64) -> KvResult<()> {
        let Some(current) = self.get(key)? else {
            return Ok(());
        };
        let Ok(value) = self.decode_counter(&current) else {
            return Ok(());
        };
        let encoded = self.encode_counter(value.wrapping_add(amount))?;
        self.put(key, &encoded)
    }
}
