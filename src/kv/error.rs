use std::sync::PoisonError;

/// Errors raised by key-value stores, transactions and the atomic wrapper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    /// The transaction lost a race with a concurrent transaction. Retrying
    /// the work in a brand new transaction may succeed.
    #[error("Transaction conflict: {0}")]
    RetryTransaction(String),

    /// The database was used before `start()` or after `stop()`, or its
    /// configuration was changed while running.
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// The store does not implement an optional operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored value could not be decoded as a counter
    #[error("Invalid counter value: {0}")]
    InvalidCounter(String),

    /// A stored key or value is not in the expected encoding
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// Internal state could not be accessed, e.g. a poisoned lock
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KvError {
    /// Returns true if the failed operation may succeed in a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryTransaction(_))
    }

    pub(crate) fn poisoned<T>(_: PoisonError<T>) -> Self {
        Self::Internal("lock poisoned by a panicking thread".to_string())
    }
}

pub type KvResult<T> = Result<T, KvError>;
