//! Ordered byte-keyed storage.
//!
//! This module defines the key-value contract the rest of the crate is
//! built on: key ranges and range sets, the [`KvStore`] read/write traits,
//! a range-restricted pair iterator, transactional databases, and an
//! [`AtomicKvDatabase`] wrapper that turns a transactional database into a
//! store whose every call is atomic.

pub mod atomic;
pub mod bytes;
pub mod database;
pub mod error;
pub mod key_range;
pub mod key_ranges;
pub mod memory;
pub mod pair_iterator;
pub mod simple;
pub mod store;
pub mod writes;

pub use atomic::{AtomicConfig, AtomicKvDatabase, Snapshot};
pub use database::{KvDatabase, KvTransaction};
pub use error::{KvError, KvResult};
pub use key_range::KeyRange;
pub use key_ranges::KeyRanges;
pub use memory::MemoryKvStore;
pub use pair_iterator::KvPairIterator;
pub use simple::{SimpleKvConfig, SimpleKvDatabase, SimpleKvTransaction};
pub use store::{KvPair, KvRead, KvStore};
pub use writes::Writes;
