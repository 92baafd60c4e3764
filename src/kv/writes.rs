use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::KvResult;
use super::key_range::KeyRange;
use super::key_ranges::KeyRanges;
use super::store::KvStore;

/// A batch of mutations: range removals, puts and counter adjustments.
///
/// Later operations supersede earlier ones on the same keys, so applying the
/// batch in the fixed order removes, then puts, then adjusts yields the same
/// result as replaying the original operations one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Writes {
    removes: KeyRanges,
    puts: BTreeMap<Vec<u8>, Vec<u8>>,
    adjusts: BTreeMap<Vec<u8>, i64>,
}

impl Writes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.puts.is_empty() && self.adjusts.is_empty()
    }

    pub fn removes(&self) -> &KeyRanges {
        &self.removes
    }

    pub fn puts(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.puts
    }

    pub fn adjusts(&self) -> &BTreeMap<Vec<u8>, i64> {
        &self.adjusts
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.adjusts.remove(key);
        self.puts.insert(key.to_vec(), value.to_vec());
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.remove_range_inner(KeyRange::from_key(key));
    }

    pub fn remove_range(&mut self, min_key: &[u8], max_key: Option<&[u8]>) -> KvResult<()> {
        let range = KeyRange::new(min_key, max_key.map(<[u8]>::to_vec))?;
        self.remove_range_inner(range);
        Ok(())
    }

    pub fn adjust_counter(&mut self, key: &[u8], amount: i64) {
        let entry = self.adjusts.entry(key.to_vec()).or_insert(0);
        *entry = entry.wrapping_add(amount);
    }

    fn remove_range_inner(&mut self, range: KeyRange) {
        if range.is_empty() {
            return;
        }
        self.puts.retain(|key, _| !range.contains(key));
        self.adjusts.retain(|key, _| !range.contains(key));
        self.removes.add(range);
    }

    /// Applies every mutation in this batch to `store`.
    pub fn apply_to<S: KvStore + ?Sized>(&self, store: &S) -> KvResult<()> {
        for range in &self.removes {
            store.remove_range(range.min(), range.max())?;
        }
        for (key, value) in &self.puts {
            store.put(key, value)?;
        }
        for (key, amount) in &self.adjusts {
            store.adjust_counter(key, *amount)?;
        }
        Ok(())
    }

    /// Every key this batch may modify.
    pub(crate) fn written_ranges(&self) -> KeyRanges {
        let singles = self
            .puts
            .keys()
            .chain(self.adjusts.keys())
            .map(|key| KeyRange::from_key(key));
        self.removes.union(&KeyRanges::new(singles))
    }
}

impl std::fmt::Display for Writes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Writes[removes={}, puts={}, adjusts={}]",
            self.removes,
            self.puts.len(),
            self.adjusts.len()
        )
    }
}
