use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::bytes::{compare_max, is_below};
use super::key_range::KeyRange;

/// A set of keys expressed as the minimal sorted list of disjoint,
/// non-adjacent [`KeyRange`]s.
///
/// Every constructor normalizes its input, so two instances describing the
/// same key set are always equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<KeyRange>", into = "Vec<KeyRange>")]
pub struct KeyRanges {
    ranges: Vec<KeyRange>,
}

impl KeyRanges {
    /// The set containing no keys.
    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    /// The set containing every key.
    pub fn full() -> Self {
        Self {
            ranges: vec![KeyRange::FULL],
        }
    }

    /// Builds a set from arbitrary, possibly overlapping or unsorted ranges.
    pub fn new<I: IntoIterator<Item = KeyRange>>(ranges: I) -> Self {
        let mut sorted: Vec<KeyRange> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        sorted.sort_by(|a, b| {
            a.min()
                .cmp(b.min())
                .then_with(|| compare_max(a.max(), b.max()))
        });

        let mut merged: Vec<KeyRange> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if last.touches(&range) => {
                    if compare_max(range.max(), last.max()) == Ordering::Greater {
                        let (min, _) = std::mem::replace(last, KeyRange::FULL).into_parts();
                        let (_, max) = range.into_parts();
                        *last = KeyRange::from_parts(min, max);
                    }
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    pub fn single(range: KeyRange) -> Self {
        Self::new([range])
    }

    /// The set of all keys starting with `prefix`.
    pub fn for_prefix(prefix: &[u8]) -> Self {
        Self::single(KeyRange::prefix(prefix))
    }

    pub fn ranges(&self) -> &[KeyRange] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_full()
    }

    /// Lowest key in the set, or `None` if the set is empty.
    pub fn min(&self) -> Option<&[u8]> {
        self.ranges.first().map(KeyRange::min)
    }

    /// Upper bound of the set: `None` if the set is empty, `Some(None)` if
    /// it extends to the end of the keyspace.
    pub fn max(&self) -> Option<Option<&[u8]>> {
        self.ranges.last().map(KeyRange::max)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.range_at_or_after(key)
            .map_or(false, |range| range.contains(key))
    }

    pub fn union(&self, other: &KeyRanges) -> KeyRanges {
        Self::new(self.ranges.iter().chain(other.ranges.iter()).cloned())
    }

    pub fn intersect(&self, other: &KeyRanges) -> KeyRanges {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a, b) = (&self.ranges[i], &other.ranges[j]);
            let min = a.min().max(b.min());
            let max = match compare_max(a.max(), b.max()) {
                Ordering::Greater => b.max(),
                _ => a.max(),
            };
            if is_below(min, max) {
                result.push(KeyRange::from_parts(min.to_vec(), max.map(<[u8]>::to_vec)));
            }
            match compare_max(a.max(), b.max()) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        Self::new(result)
    }

    /// The complement of this set.
    pub fn invert(&self) -> KeyRanges {
        let mut gaps = Vec::with_capacity(self.ranges.len() + 1);
        let mut next_min: Vec<u8> = Vec::new();
        for range in &self.ranges {
            if range.min() > next_min.as_slice() {
                gaps.push(KeyRange::from_parts(next_min, Some(range.min().to_vec())));
            }
            match range.max() {
                Some(max) => next_min = max.to_vec(),
                None => return Self { ranges: gaps },
            }
        }
        gaps.push(KeyRange::from_parts(next_min, None));
        Self { ranges: gaps }
    }

    /// Adds `range` in place, coalescing it with every range it touches.
    pub fn add(&mut self, range: KeyRange) {
        if range.is_empty() {
            return;
        }
        // Ranges ending strictly below range.min stay to the left
        let start = self
            .ranges
            .partition_point(|r| compare_max(r.max(), Some(range.min())) == Ordering::Less);
        // Ranges starting strictly above range.max stay to the right
        let end = match range.max() {
            Some(max) => self.ranges.partition_point(|r| r.min() <= max),
            None => self.ranges.len(),
        };
        if start >= end {
            self.ranges.insert(start, range);
            return;
        }

        let (min, max) = range.into_parts();
        let first_min = self.ranges[start].min();
        let min = if first_min < min.as_slice() {
            first_min.to_vec()
        } else {
            min
        };
        let last_max = self.ranges[end - 1].max();
        let max = if compare_max(last_max, max.as_deref()) == Ordering::Greater {
            last_max.map(<[u8]>::to_vec)
        } else {
            max
        };
        self.ranges
            .splice(start..end, [KeyRange::from_parts(min, max)]);
    }

    pub fn remove(&mut self, range: KeyRange) {
        *self = self.intersect(&KeyRanges::single(range).invert());
    }

    /// First range whose upper bound lies above `key`, i.e. the range
    /// containing `key` or, failing that, the next range after it.
    pub fn range_at_or_after(&self, key: &[u8]) -> Option<&KeyRange> {
        let index = self
            .ranges
            .partition_point(|range| !is_below(key, range.max()));
        self.ranges.get(index)
    }

    /// Last range starting strictly below the exclusive upper bound `bound`
    /// (`None` meaning the end of the keyspace).
    pub fn range_before(&self, bound: Option<&[u8]>) -> Option<&KeyRange> {
        match bound {
            None => self.ranges.last(),
            Some(bound) => {
                let index = self.ranges.partition_point(|range| range.min() < bound);
                index.checked_sub(1).and_then(|i| self.ranges.get(i))
            }
        }
    }
}

impl From<Vec<KeyRange>> for KeyRanges {
    fn from(ranges: Vec<KeyRange>) -> Self {
        Self::new(ranges)
    }
}

impl From<KeyRanges> for Vec<KeyRange> {
    fn from(ranges: KeyRanges) -> Self {
        ranges.ranges
    }
}

impl FromIterator<KeyRange> for KeyRanges {
    fn from_iter<I: IntoIterator<Item = KeyRange>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a KeyRanges {
    type Item = &'a KeyRange;
    type IntoIter = std::slice::Iter<'a, KeyRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl fmt::Display for KeyRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, "}}")
    }
}
