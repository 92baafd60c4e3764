use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::database::{KvDatabase, KvTransaction};
use super::error::{KvError, KvResult};
use super::store::{KvPair, KvRead, KvStore};
use super::writes::Writes;

/// Settings for [`AtomicKvDatabase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AtomicConfig {
    /// How many times an operation is retried after a retryable conflict
    /// before the conflict is returned to the caller.
    pub max_retries: u32,
    /// Timeout requested for snapshot transactions, in milliseconds.
    pub snapshot_timeout_ms: u64,
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            snapshot_timeout_ms: i32::MAX as u64,
        }
    }
}

/// Presents a transactional [`KvDatabase`] as a plain [`KvStore`] in which
/// every call is individually atomic.
///
/// Each operation runs in its own transaction, which is committed if the
/// operation succeeds and rolled back otherwise. Retryable conflicts are
/// retried in a fresh transaction up to `max_retries` times, yielding the
/// thread between attempts.
pub struct AtomicKvDatabase<D: KvDatabase> {
    kvdb: D,
    config: AtomicConfig,
    started: AtomicBool,
    leaked: Arc<AtomicUsize>,
}

impl<D: KvDatabase> AtomicKvDatabase<D> {
    pub fn new(kvdb: D) -> Self {
        Self::with_config(kvdb, AtomicConfig::default())
    }

    pub fn with_config(kvdb: D, config: AtomicConfig) -> Self {
        Self {
            kvdb,
            config,
            started: AtomicBool::new(false),
            leaked: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The wrapped database.
    pub fn database(&self) -> &D {
        &self.kvdb
    }

    pub fn config(&self) -> &AtomicConfig {
        &self.config
    }

    /// Replaces the configuration. Only allowed while stopped.
    pub fn set_config(&mut self, config: AtomicConfig) -> KvResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(KvError::Lifecycle(
                "cannot change configuration after start()".to_string(),
            ));
        }
        self.config = config;
        Ok(())
    }

    /// Number of snapshots dropped without calling [`Snapshot::close`].
    pub fn leaked_snapshots(&self) -> usize {
        self.leaked.load(Ordering::SeqCst)
    }

    pub fn start(&self) -> KvResult<()> {
        self.kvdb.start()?;
        if !self.started.swap(true, Ordering::SeqCst) {
            info!(
                "Atomic key/value store started (max_retries={})",
                self.config.max_retries
            );
        }
        Ok(())
    }

    pub fn stop(&self) -> KvResult<()> {
        self.kvdb.stop()?;
        if self.started.swap(false, Ordering::SeqCst) {
            info!("Atomic key/value store stopped");
        }
        Ok(())
    }

    /// Opens a long-lived read-only view of the current database state.
    ///
    /// The snapshot must be released with [`Snapshot::close`]; dropping it
    /// instead logs a warning and counts it as leaked.
    pub fn snapshot(&self) -> KvResult<Snapshot<D::Transaction>> {
        self.check_started()?;
        let tx = self.kvdb.create_transaction()?;
        let timeout = Duration::from_millis(self.config.snapshot_timeout_ms);
        match tx.set_timeout(timeout) {
            Ok(()) | Err(KvError::Unsupported(_)) => {}
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Failed to roll back snapshot transaction: {}", rollback_err);
                }
                return Err(e);
            }
        }
        Ok(Snapshot {
            tx: Some(tx),
            leaked: Arc::clone(&self.leaked),
        })
    }

    /// Runs `f` against a fresh snapshot and closes it afterwards.
    ///
    /// If `f` panics the snapshot is still rolled back while unwinding and
    /// is not counted by [`leaked_snapshots`](Self::leaked_snapshots).
    pub fn with_snapshot<R>(
        &self,
        f: impl FnOnce(&Snapshot<D::Transaction>) -> KvResult<R>,
    ) -> KvResult<R> {
        let snapshot = self.snapshot()?;
        let result = f(&snapshot);
        snapshot.close()?;
        result
    }

    /// Applies a batch of mutations in a single transaction. `sync` is a
    /// durability hint that databases without a notion of syncing ignore.
    pub fn mutate(&self, writes: &Writes, sync: bool) -> KvResult<()> {
        debug!("Applying {} (sync={})", writes, sync);
        self.do_in_transaction(|tx| writes.apply_to(tx))
    }

    /// Runs `action` in a new transaction, committing on success and rolling
    /// back on failure. Retryable conflicts restart the action in a fresh
    /// transaction.
    pub fn do_in_transaction<R>(
        &self,
        mut action: impl FnMut(&D::Transaction) -> KvResult<R>,
    ) -> KvResult<R> {
        let mut attempt = 0;
        loop {
            match self.run_once(&mut action) {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(
                        "Retrying after conflict (attempt {} of {}): {}",
                        attempt, self.config.max_retries, e
                    );
                    thread::yield_now();
                }
                result => return result,
            }
        }
    }

    fn check_started(&self) -> KvResult<()> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KvError::Lifecycle("atomic store is not started".to_string()))
        }
    }

    fn run_once<R>(
        &self,
        action: &mut impl FnMut(&D::Transaction) -> KvResult<R>,
    ) -> KvResult<R> {
        self.check_started()?;
        let tx = self.kvdb.create_transaction()?;
        match action(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback after failed operation also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

impl<D: KvDatabase> KvRead for AtomicKvDatabase<D> {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.do_in_transaction(|tx| tx.get(key))
    }

    fn get_at_least(&self, min_key: &[u8]) -> KvResult<Option<KvPair>> {
        self.do_in_transaction(|tx| tx.get_at_least(min_key))
    }

    fn get_at_most(&self, max_key: Option<&[u8]>) -> KvResult<Option<KvPair>> {
        self.do_in_transaction(|tx| tx.get_at_most(max_key))
    }

    fn encode_counter(&self, value: i64) -> KvResult<Vec<u8>> {
        self.do_in_transaction(|tx| tx.encode_counter(value))
    }

    fn decode_counter(&self, value: &[u8]) -> KvResult<i64> {
        self.do_in_transaction(|tx| tx.decode_counter(value))
    }
}

impl<D: KvDatabase> KvStore for AtomicKvDatabase<D> {
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.do_in_transaction(|tx| tx.put(key, value))
    }

    fn remove(&self, key: &[u8]) -> KvResult<()> {
        self.do_in_transaction(|tx| tx.remove(key))
    }

    fn remove_range(&self, min_key: &[u8], max_key: Option<&[u8]>) -> KvResult<()> {
        self.do_in_transaction(|tx| tx.remove_range(min_key, max_key))
    }

    fn adjust_counter(&self, key: &[u8], amount: i64) -> KvResult<()> {
        self.do_in_transaction(|tx| tx.adjust_counter(key, amount))
    }
}

/// A read-only view backed by a long-lived transaction.
///
/// Reads see the database as of the moment the snapshot was taken.
pub struct Snapshot<T: KvTransaction> {
    tx: Option<T>,
    leaked: Arc<AtomicUsize>,
}

impl<T: KvTransaction> Snapshot<T> {
    /// Releases the snapshot by rolling back its transaction.
    pub fn close(mut self) -> KvResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }

    fn tx(&self) -> KvResult<&T> {
        self.tx
            .as_ref()
            .ok_or_else(|| KvError::Lifecycle("snapshot is closed".to_string()))
    }
}

impl<T: KvTransaction> KvRead for Snapshot<T> {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.tx()?.get(key)
    }

    fn get_at_least(&self, min_key: &[u8]) -> KvResult<Option<KvPair>> {
        self.tx()?.get_at_least(min_key)
    }

    fn get_at_most(&self, max_key: Option<&[u8]>) -> KvResult<Option<KvPair>> {
        self.tx()?.get_at_most(max_key)
    }

    fn encode_counter(&self, value: i64) -> KvResult<Vec<u8>> {
        self.tx()?.encode_counter(value)
    }

    fn decode_counter(&self, value: &[u8]) -> KvResult<i64> {
        self.tx()?.decode_counter(value)
    }
}

impl<T: KvTransaction> Drop for Snapshot<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Unwinding out of with_snapshot is not a missing close()
            if !thread::panicking() {
                warn!("Snapshot leaked without invoking close()");
                self.leaked.fetch_add(1, Ordering::SeqCst);
            }
            if let Err(e) = tx.rollback() {
                warn!("Failed to roll back leaked snapshot: {}", e);
            }
        }
    }
}
