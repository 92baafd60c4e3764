use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::bytes;
use super::database::{KvDatabase, KvTransaction};
use super::error::{KvError, KvResult};
use super::key_range::KeyRange;
use super::key_ranges::KeyRanges;
use super::memory::{map_get_at_least, map_get_at_most, map_remove_range, KvMap};
use super::store::{KvPair, KvRead, KvStore};
use super::writes::Writes;

/// Settings for [`SimpleKvDatabase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimpleKvConfig {
    /// Number of recent commits remembered for conflict detection. A
    /// transaction that started before the oldest remembered commit can
    /// no longer be validated and fails with a retryable conflict.
    pub max_history: usize,
}

impl Default for SimpleKvConfig {
    fn default() -> Self {
        Self { max_history: 1024 }
    }
}

struct CommitRecord {
    version: u64,
    written: KeyRanges,
}

struct DbState {
    started: bool,
    version: u64,
    data: Arc<KvMap>,
    history: VecDeque<CommitRecord>,
    history_floor: u64,
}

/// An in-memory transactional database with snapshot isolation.
///
/// Each transaction reads from the committed state as of its creation and
/// buffers its own writes in an overlay on top of it. At commit time the
/// key ranges it read are checked against every commit made since it
/// started; any overlap fails the commit with [`KvError::RetryTransaction`].
///
/// Committed state is shared by reference with open transactions, so a
/// commit copies it only while some older transaction still reads it.
pub struct SimpleKvDatabase {
    state: Arc<Mutex<DbState>>,
    config: SimpleKvConfig,
}

impl SimpleKvDatabase {
    pub fn new() -> Self {
        Self::with_config(SimpleKvConfig::default())
    }

    pub fn with_config(config: SimpleKvConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(DbState {
                started: false,
                version: 0,
                data: Arc::new(KvMap::new()),
                history: VecDeque::new(),
                history_floor: 0,
            })),
            config,
        }
    }

    pub fn config(&self) -> &SimpleKvConfig {
        &self.config
    }

    /// Version of the most recent successful commit.
    pub fn version(&self) -> KvResult<u64> {
        Ok(self.lock()?.version)
    }

    fn lock(&self) -> KvResult<MutexGuard<'_, DbState>> {
        self.state.lock().map_err(KvError::poisoned)
    }
}

impl Default for SimpleKvDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl KvDatabase for SimpleKvDatabase {
    type Transaction = SimpleKvTransaction;

    fn start(&self) -> KvResult<()> {
        let mut state = self.lock()?;
        if !state.started {
            state.started = true;
            info!("Started in-memory key/value database");
        }
        Ok(())
    }

    fn stop(&self) -> KvResult<()> {
        let mut state = self.lock()?;
        if state.started {
            state.started = false;
            info!("Stopped in-memory key/value database");
        }
        Ok(())
    }

    fn create_transaction(&self) -> KvResult<SimpleKvTransaction> {
        let state = self.lock()?;
        if !state.started {
            return Err(KvError::Lifecycle("database is not started".to_string()));
        }
        Ok(SimpleKvTransaction {
            db: Arc::clone(&self.state),
            max_history: self.config.max_history,
            start_version: state.version,
            started_at: Instant::now(),
            inner: Mutex::new(TxState {
                base: Arc::clone(&state.data),
                local: KvMap::new(),
                cleared: KeyRanges::empty(),
                writes: Writes::new(),
                reads: KeyRanges::empty(),
                timeout: None,
            }),
        })
    }
}

struct TxState {
    /// Committed state as of transaction start
    base: Arc<KvMap>,
    /// Values put by this transaction
    local: KvMap,
    /// Base keys hidden by this transaction's removes
    cleared: KeyRanges,
    writes: Writes,
    reads: KeyRanges,
    timeout: Option<Duration>,
}

impl TxState {
    fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(value) = self.local.get(key) {
            return Some(value.clone());
        }
        if self.cleared.contains(key) {
            return None;
        }
        self.base.get(key).cloned()
    }

    /// The cleared range containing `key`, if any.
    fn cleared_at(&self, key: &[u8]) -> Option<&KeyRange> {
        self.cleared
            .range_at_or_after(key)
            .filter(|range| range.contains(key))
    }

    fn first_at_least(&self, min_key: &[u8]) -> Option<KvPair> {
        let local = map_get_at_least(&self.local, min_key);
        let mut cursor = min_key.to_vec();
        let base = loop {
            let next = self
                .base
                .range::<[u8], _>((Bound::Included(cursor.as_slice()), Bound::Unbounded))
                .next();
            let Some((key, value)) = next else {
                break None;
            };
            match self.cleared_at(key).map(KeyRange::max) {
                Some(Some(max)) => cursor = max.to_vec(),
                Some(None) => break None,
                None => break Some(KvPair::new(key.clone(), value.clone())),
            }
        };
        match (local, base) {
            (Some(local), Some(base)) if base.key < local.key => Some(base),
            (local, base) => local.or(base),
        }
    }

    fn last_at_most(&self, max_key: Option<&[u8]>) -> Option<KvPair> {
        let local = map_get_at_most(&self.local, max_key);
        let mut cursor = max_key.map(<[u8]>::to_vec);
        let base = loop {
            let upper = cursor.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
            let next = self
                .base
                .range::<[u8], _>((Bound::Unbounded, upper))
                .next_back();
            let Some((key, value)) = next else {
                break None;
            };
            match self.cleared_at(key) {
                Some(range) => cursor = Some(range.min().to_vec()),
                None => break Some(KvPair::new(key.clone(), value.clone())),
            }
        };
        match (local, base) {
            (Some(local), Some(base)) if base.key > local.key => Some(base),
            (local, base) => local.or(base),
        }
    }
}

/// A transaction on a [`SimpleKvDatabase`].
pub struct SimpleKvTransaction {
    db: Arc<Mutex<DbState>>,
    max_history: usize,
    start_version: u64,
    started_at: Instant,
    inner: Mutex<TxState>,
}

impl SimpleKvTransaction {
    /// Database version this transaction reads from.
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    fn state(&self) -> KvResult<MutexGuard<'_, TxState>> {
        let state = self.inner.lock().map_err(KvError::poisoned)?;
        self.check_timeout(state.timeout)?;
        Ok(state)
    }

    fn check_timeout(&self, timeout: Option<Duration>) -> KvResult<()> {
        match timeout {
            Some(limit) if self.started_at.elapsed() > limit => Err(KvError::RetryTransaction(
                format!("transaction timed out after {limit:?}"),
            )),
            _ => Ok(()),
        }
    }
}

impl KvRead for SimpleKvTransaction {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let mut state = self.state()?;
        state.reads.add(KeyRange::from_key(key));
        Ok(state.value(key))
    }

    fn get_at_least(&self, min_key: &[u8]) -> KvResult<Option<KvPair>> {
        let mut state = self.state()?;
        let found = state.first_at_least(min_key);
        let read_max = found.as_ref().map(|pair| bytes::next_key(&pair.key));
        state.reads.add(KeyRange::new(min_key, read_max)?);
        Ok(found)
    }

    fn get_at_most(&self, max_key: Option<&[u8]>) -> KvResult<Option<KvPair>> {
        let mut state = self.state()?;
        let found = state.last_at_most(max_key);
        let read_min = found.as_ref().map(|pair| pair.key.clone()).unwrap_or_default();
        state
            .reads
            .add(KeyRange::new(read_min, max_key.map(<[u8]>::to_vec))?);
        Ok(found)
    }
}

impl KvStore for SimpleKvTransaction {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        let mut state = self.state()?;
        state.local.insert(key.to_vec(), value.to_vec());
        state.writes.put(key, value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> KvResult<()> {
        let mut state = self.state()?;
        state.local.remove(key);
        state.cleared.add(KeyRange::from_key(key));
        state.writes.remove(key);
        Ok(())
    }

    fn remove_range(&self, min_key: &[u8], max_key: Option<&[u8]>) -> KvResult<()> {
        let range = KeyRange::new(min_key, max_key.map(<[u8]>::to_vec))?;
        let mut state = self.state()?;
        map_remove_range(&mut state.local, &range);
        state.cleared.add(range);
        state.writes.remove_range(min_key, max_key)
    }

    /// Counter adjustments are recorded without reading the counter, so
    /// concurrent adjustments of the same counter do not conflict.
    fn adjust_counter(&self, key: &[u8], amount: i64) -> KvResult<()> {
        let mut state = self.state()?;
        if let Some(current) = state.value(key) {
            if let Ok(value) = self.decode_counter(&current) {
                let encoded = self.encode_counter(value.wrapping_add(amount))?;
                state.local.insert(key.to_vec(), encoded);
            }
        }
        state.writes.adjust_counter(key, amount);
        Ok(())
    }
}

impl KvTransaction for SimpleKvTransaction {
    fn set_timeout(&self, timeout: Duration) -> KvResult<()> {
        let mut state = self.inner.lock().map_err(KvError::poisoned)?;
        state.timeout = Some(timeout);
        Ok(())
    }

    fn commit(self) -> KvResult<()> {
        let TxState {
            base,
            writes,
            reads,
            timeout,
            ..
        } = self.inner.into_inner().map_err(KvError::poisoned)?;
        // Release our reference so an unshared map is updated in place
        drop(base);
        let mut db = self.db.lock().map_err(KvError::poisoned)?;
        if !db.started {
            return Err(KvError::Lifecycle("database is not started".to_string()));
        }
        if let Some(limit) = timeout {
            if self.started_at.elapsed() > limit {
                return Err(KvError::RetryTransaction(format!(
                    "transaction timed out after {limit:?}"
                )));
            }
        }
        if writes.is_empty() {
            return Ok(());
        }
        if self.start_version < db.history_floor {
            return Err(KvError::RetryTransaction(format!(
                "transaction started at version {} is older than the retained commit history",
                self.start_version
            )));
        }

        for record in db.history.iter().filter(|r| r.version > self.start_version) {
            let overlap = record.written.intersect(&reads);
            if !overlap.is_empty() {
                debug!(
                    "Commit conflict with version {} on {}",
                    record.version, overlap
                );
                return Err(KvError::RetryTransaction(format!(
                    "keys {} were modified by a concurrent transaction",
                    overlap
                )));
            }
        }

        apply_writes(Arc::make_mut(&mut db.data), &writes);
        db.version += 1;
        let version = db.version;
        db.history.push_back(CommitRecord {
            version,
            written: writes.written_ranges(),
        });
        while db.history.len() > self.max_history {
            if let Some(evicted) = db.history.pop_front() {
                db.history_floor = evicted.version;
            }
        }
        Ok(())
    }

    fn rollback(self) -> KvResult<()> {
        Ok(())
    }
}

fn apply_writes(data: &mut KvMap, writes: &Writes) {
    for range in writes.removes() {
        map_remove_range(data, range);
    }
    for (key, value) in writes.puts() {
        data.insert(key.clone(), value.clone());
    }
    for (key, amount) in writes.adjusts() {
        let Some(current) = data.get_mut(key) else {
            continue;
        };
        if let Ok(raw) = <[u8; 8]>::try_from(current.as_slice()) {
            let adjusted = i64::from_be_bytes(raw).wrapping_add(*amount);
            *current = adjusted.to_be_bytes().to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvPairIterator;

    fn started() -> SimpleKvDatabase {
        let db = SimpleKvDatabase::new();
        db.start().unwrap();
        db
    }

    #[test]
    fn test_requires_start() {
        let db = SimpleKvDatabase::new();
        assert!(matches!(db.create_transaction(), Err(KvError::Lifecycle(_))));
        db.start().unwrap();
        let tx = db.create_transaction().unwrap();
        tx.put(b"k", b"v").unwrap();
        db.stop().unwrap();
        assert!(matches!(tx.commit(), Err(KvError::Lifecycle(_))));
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let db = started();
        let tx = db.create_transaction().unwrap();
        tx.put(b"a", b"1").unwrap();
        assert_eq!(tx.get(b"a").unwrap(), Some(b"1".to_vec()));
        tx.commit().unwrap();

        let tx = db.create_transaction().unwrap();
        assert_eq!(tx.get(b"a").unwrap(), Some(b"1".to_vec()));
        tx.rollback().unwrap();
        assert_eq!(db.version().unwrap(), 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let db = started();
        let tx = db.create_transaction().unwrap();
        tx.put(b"a", b"1").unwrap();
        tx.rollback().unwrap();

        let tx = db.create_transaction().unwrap();
        assert_eq!(tx.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_snapshot_isolation() {
        let db = started();
        let reader = db.create_transaction().unwrap();

        let writer = db.create_transaction().unwrap();
        writer.put(b"x", b"new").unwrap();
        writer.commit().unwrap();

        assert_eq!(reader.get(b"x").unwrap(), None);
        assert_eq!(reader.get_at_least(b"").unwrap(), None);
        // Read-only transactions always commit
        reader.commit().unwrap();
    }

    #[test]
    fn test_read_write_conflict() {
        let db = started();
        let first = db.create_transaction().unwrap();
        let second = db.create_transaction().unwrap();

        assert_eq!(first.get(b"x").unwrap(), None);
        first.put(b"y", b"from first").unwrap();

        second.put(b"x", b"from second").unwrap();
        second.commit().unwrap();

        let err = first.commit().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_disjoint_transactions_both_commit() {
        let db = started();
        let first = db.create_transaction().unwrap();
        let second = db.create_transaction().unwrap();
        first.put(b"a", b"1").unwrap();
        second.put(b"b", b"2").unwrap();
        first.commit().unwrap();
        second.commit().unwrap();
        assert_eq!(db.version().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_counter_adjustments_merge() {
        let db = started();
        let setup = db.create_transaction().unwrap();
        setup.put(b"c", &setup.encode_counter(10).unwrap()).unwrap();
        setup.commit().unwrap();

        let first = db.create_transaction().unwrap();
        let second = db.create_transaction().unwrap();
        first.adjust_counter(b"c", 5).unwrap();
        second.adjust_counter(b"c", -2).unwrap();
        first.commit().unwrap();
        second.commit().unwrap();

        let check = db.create_transaction().unwrap();
        let value = check.get(b"c").unwrap().unwrap();
        assert_eq!(check.decode_counter(&value).unwrap(), 13);
    }

    #[test]
    fn test_timeout_expires() {
        let db = started();
        let tx = db.create_transaction().unwrap();
        tx.set_timeout(Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(tx.get(b"a"), Err(KvError::RetryTransaction(_))));
    }

    #[test]
    fn test_history_eviction_forces_retry() {
        let db = SimpleKvDatabase::with_config(SimpleKvConfig { max_history: 1 });
        db.start().unwrap();
        let old = db.create_transaction().unwrap();
        old.put(b"z", b"1").unwrap();
        for key in [b"a", b"b"] {
            let tx = db.create_transaction().unwrap();
            tx.put(key, b"v").unwrap();
            tx.commit().unwrap();
        }
        assert!(matches!(old.commit(), Err(KvError::RetryTransaction(_))));
    }

    #[test]
    fn test_reads_merge_own_writes_with_committed_state() {
        let db = started();
        let setup = db.create_transaction().unwrap();
        for key in [b"a", b"b", b"c", b"d", b"e"] {
            setup.put(key, b"old").unwrap();
        }
        setup.commit().unwrap();

        let tx = db.create_transaction().unwrap();
        tx.remove_range(b"b", Some(&b"e"[..])).unwrap();
        tx.put(b"c", b"new").unwrap();
        tx.remove(b"a").unwrap();
        tx.put(b"f", b"new").unwrap();

        let pair = |k: &[u8], v: &[u8]| Some(KvPair::new(k.to_vec(), v.to_vec()));
        assert_eq!(tx.get(b"a").unwrap(), None);
        assert_eq!(tx.get(b"b").unwrap(), None);
        assert_eq!(tx.get(b"c").unwrap(), Some(b"new".to_vec()));
        assert_eq!(tx.get_at_least(b"").unwrap(), pair(b"c", b"new"));
        assert_eq!(tx.get_at_least(b"d").unwrap(), pair(b"e", b"old"));
        assert_eq!(tx.get_at_most(Some(&b"e"[..])).unwrap(), pair(b"c", b"new"));
        assert_eq!(tx.get_at_most(Some(&b"c"[..])).unwrap(), None);
        assert_eq!(tx.get_at_most(None).unwrap(), pair(b"f", b"new"));
        tx.commit().unwrap();

        let check = db.create_transaction().unwrap();
        let keys: Vec<Vec<u8>> = KvPairIterator::new(&check, KeyRanges::full(), false)
            .map(|pair| pair.unwrap().key)
            .collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"e".to_vec(), b"f".to_vec()]);
    }

    #[test]
    fn test_commit_updates_unshared_state_in_place() {
        let db = started();
        let before = Arc::as_ptr(&db.lock().unwrap().data);

        let tx = db.create_transaction().unwrap();
        tx.put(b"a", b"1").unwrap();
        // The open transaction still shares the committed map
        assert_eq!(Arc::strong_count(&db.lock().unwrap().data), 2);
        tx.commit().unwrap();

        let state = db.lock().unwrap();
        assert!(std::ptr::eq(before, Arc::as_ptr(&state.data)));
        assert_eq!(state.data.get(&b"a"[..]), Some(&b"1".to_vec()));
    }

    #[test]
    fn test_commit_preserves_open_readers() {
        let db = started();
        let reader = db.create_transaction().unwrap();
        let writer = db.create_transaction().unwrap();
        writer.put(b"a", b"1").unwrap();
        writer.commit().unwrap();
        assert_eq!(reader.get(b"a").unwrap(), None);
        assert_eq!(reader.get_at_most(None).unwrap(), None);
    }
}
