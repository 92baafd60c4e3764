use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::bytes::{self, compare_max, is_below};
use super::error::{KvError, KvResult};

/// A half-open interval `[min, max)` of byte keys.
///
/// An empty `min` is the start of the keyspace and a `max` of `None` is the
/// end of the keyspace; there are no other sentinel values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawKeyRange")]
pub struct KeyRange {
    min: Vec<u8>,
    max: Option<Vec<u8>>,
}

/// Unchecked wire form of [`KeyRange`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKeyRange {
    min: Vec<u8>,
    max: Option<Vec<u8>>,
}

impl TryFrom<RawKeyRange> for KeyRange {
    type Error = KvError;

    fn try_from(raw: RawKeyRange) -> KvResult<Self> {
        KeyRange::new(raw.min, raw.max)
    }
}

impl KeyRange {
    /// The range containing every key.
    pub const FULL: KeyRange = KeyRange {
        min: Vec::new(),
        max: None,
    };

    /// Creates `[min, max)`, failing if `max` sorts before `min`.
    pub fn new(min: impl Into<Vec<u8>>, max: Option<Vec<u8>>) -> KvResult<Self> {
        let min = min.into();
        if let Some(max) = &max {
            if max < &min {
                return Err(KvError::InvalidArgument(format!(
                    "key range max {} < min {}",
                    bytes::describe(max),
                    bytes::describe(&min)
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// The range containing exactly one key.
    pub fn from_key(key: &[u8]) -> Self {
        Self {
            min: key.to_vec(),
            max: Some(bytes::next_key(key)),
        }
    }

    /// The range containing every key that starts with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            min: prefix.to_vec(),
            max: bytes::prefix_successor(prefix),
        }
    }

    pub fn min(&self) -> &[u8] {
        &self.min
    }

    pub fn max(&self) -> Option<&[u8]> {
        self.max.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.max.as_deref() == Some(self.min.as_slice())
    }

    pub fn is_full(&self) -> bool {
        self.min.is_empty() && self.max.is_none()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.min.as_slice() && is_below(key, self.max())
    }

    /// Returns true if every key in `other` is also in this range.
    pub fn contains_range(&self, other: &KeyRange) -> bool {
        other.min >= self.min && compare_max(other.max(), self.max()) != Ordering::Greater
    }

    /// Returns true if the two ranges share at least one key.
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && is_below(&self.min, other.max())
            && is_below(&other.min, self.max())
    }

    /// Returns true if the two ranges overlap or abut, i.e. their union is
    /// a single range.
    pub fn touches(&self, other: &KeyRange) -> bool {
        let self_reaches = self.max().map_or(true, |max| other.min.as_slice() <= max);
        let other_reaches = other.max().map_or(true, |max| self.min.as_slice() <= max);
        self_reaches && other_reaches
    }

    /// Positions `key` relative to this range: `Less` if the range lies
    /// entirely below the key, `Greater` if entirely above, `Equal` if the
    /// range contains it.
    pub fn compare_to_key(&self, key: &[u8]) -> Ordering {
        if key < self.min.as_slice() {
            Ordering::Greater
        } else if is_below(key, self.max()) {
            Ordering::Equal
        } else {
            Ordering::Less
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Option<Vec<u8>>) {
        (self.min, self.max)
    }

    pub(crate) fn from_parts(min: Vec<u8>, max: Option<Vec<u8>>) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = if self.min.is_empty() {
            "-".to_string()
        } else {
            hex::encode(&self.min)
        };
        let max = self.max().map_or_else(|| "-".to_string(), hex::encode);
        write!(f, "[{min}, {max})")
    }
}
