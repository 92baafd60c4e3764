use std::time::Duration;

use super::error::{KvError, KvResult};
use super::store::KvStore;

/// A transaction against a [`KvDatabase`].
///
/// Reads and writes go through the [`KvStore`] methods. Ending the
/// transaction consumes it, so a committed or rolled back transaction can
/// never be used again.
pub trait KvTransaction: KvStore {
    /// Bounds how long this transaction may stay open. Databases without
    /// timeout support return [`KvError::Unsupported`].
    fn set_timeout(&self, timeout: Duration) -> KvResult<()> {
        let _ = timeout;
        Err(KvError::Unsupported("transaction timeouts".to_string()))
    }

    /// Makes the transaction's writes durable and visible. A
    /// [`KvError::RetryTransaction`] means none of them took effect.
    fn commit(self) -> KvResult<()>;

    /// Discards the transaction's writes.
    fn rollback(self) -> KvResult<()>;
}

/// A transactional key-value database.
pub trait KvDatabase: Send + Sync {
    type Transaction: KvTransaction;

    fn start(&self) -> KvResult<()>;

    fn stop(&self) -> KvResult<()>;

    fn create_transaction(&self) -> KvResult<Self::Transaction>;
}
