use super::bytes;
use super::error::KvResult;
use super::key_ranges::KeyRanges;
use super::store::{KvPair, KvRead};

/// Iterates the pairs of a store whose keys fall within a [`KeyRanges`],
/// in forward or reverse order.
///
/// Pairs are fetched lazily, one at a time, with `get_at_least` (forward)
/// or `get_at_most` (reverse) against the current sub-range. Store entries
/// in the gaps between sub-ranges are skipped by jumping to the next
/// sub-range boundary rather than by scanning them.
///
/// The iterator can be repositioned at any time with [`set_next_target`].
/// It only borrows the store; dropping it releases everything it holds.
/// After the store reports an error the iterator is finished.
///
/// [`set_next_target`]: KvPairIterator::set_next_target
pub struct KvPairIterator<'a, S: KvRead + ?Sized> {
    store: &'a S,
    ranges: KeyRanges,
    reverse: bool,
    // Forward: inclusive lower bound of the next key.
    // Reverse: exclusive upper bound of the next key, `None` = end of keyspace.
    cursor: Option<Vec<u8>>,
    next_pair: Option<KvPair>,
    finished: bool,
}

impl<'a, S: KvRead + ?Sized> KvPairIterator<'a, S> {
    pub fn new(store: &'a S, ranges: KeyRanges, reverse: bool) -> Self {
        Self::with_start(store, ranges, None, reverse)
    }

    /// Creates an iterator whose first pair is at or after (forward) or at
    /// or before (reverse) `start_key`.
    pub fn with_start(
        store: &'a S,
        ranges: KeyRanges,
        start_key: Option<&[u8]>,
        reverse: bool,
    ) -> Self {
        let mut iter = Self {
            store,
            ranges,
            reverse,
            cursor: if reverse { None } else { Some(Vec::new()) },
            next_pair: None,
            finished: false,
        };
        if let Some(key) = start_key {
            iter.set_next_target(key);
        }
        iter
    }

    pub fn key_ranges(&self) -> &KeyRanges {
        &self.ranges
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Repositions the iterator so the next pair returned is the first one
    /// at or after `key` (forward) or at or before `key` (reverse) that also
    /// lies within the key ranges. Any pair already fetched ahead is
    /// discarded.
    pub fn set_next_target(&mut self, key: &[u8]) {
        self.next_pair = None;
        self.finished = false;
        self.cursor = Some(if self.reverse {
            bytes::next_key(key)
        } else {
            key.to_vec()
        });
    }

    pub fn has_next(&mut self) -> KvResult<bool> {
        self.fill()?;
        Ok(self.next_pair.is_some())
    }

    /// Returns the next pair without consuming it.
    pub fn peek(&mut self) -> KvResult<Option<&KvPair>> {
        self.fill()?;
        Ok(self.next_pair.as_ref())
    }

    fn fill(&mut self) -> KvResult<()> {
        if self.next_pair.is_some() || self.finished {
            return Ok(());
        }
        let found = if self.reverse {
            self.find_next_reverse()
        } else {
            self.find_next_forward()
        };
        match found {
            Ok(Some(pair)) => self.next_pair = Some(pair),
            Ok(None) => self.finished = true,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        }
        Ok(())
    }

    fn find_next_forward(&mut self) -> KvResult<Option<KvPair>> {
        loop {
            let cursor = self.cursor.take().unwrap_or_default();
            let Some(range) = self.ranges.range_at_or_after(&cursor) else {
                return Ok(None);
            };
            let lower = if cursor.as_slice() < range.min() {
                range.min()
            } else {
                cursor.as_slice()
            };
            let Some(pair) = self.store.get_at_least(lower)? else {
                return Ok(None);
            };
            if range.contains(&pair.key) {
                self.cursor = Some(bytes::next_key(&pair.key));
                return Ok(Some(pair));
            }
            // Beyond this range; the key may still fall within a later one
            self.cursor = Some(pair.key);
        }
    }

    fn find_next_reverse(&mut self) -> KvResult<Option<KvPair>> {
        loop {
            let cursor = self.cursor.take();
            let Some(range) = self.ranges.range_before(cursor.as_deref()) else {
                return Ok(None);
            };
            let upper = match (cursor.as_deref(), range.max()) {
                (Some(cursor), Some(max)) => Some(cursor.min(max)),
                (Some(cursor), None) => Some(cursor),
                (None, max) => max,
            };
            let Some(pair) = self.store.get_at_most(upper)? else {
                return Ok(None);
            };
            if range.contains(&pair.key) {
                self.cursor = Some(pair.key.clone());
                return Ok(Some(pair));
            }
            // Below this range; continue from the pair's key inclusive
            self.cursor = Some(bytes::next_key(&pair.key));
        }
    }
}

impl<'a, S: KvRead + ?Sized> Iterator for KvPairIterator<'a, S> {
    type Item = KvResult<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            return Some(Err(e));
        }
        self.next_pair.take().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyRange, KvStore, MemoryKvStore};

    fn b(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    fn kr(min: Option<&str>, max: Option<&str>) -> KeyRange {
        KeyRange::new(min.map(b).unwrap_or_default(), max.map(b)).unwrap()
    }

    fn standard_store() -> MemoryKvStore {
        let store = MemoryKvStore::new();
        for key in [
            "00", "10", "30", "3000", "300000", "40", "50", "60", "70", "80", "99", "ffff",
        ] {
            store.put(&b(key), &b(key)).unwrap();
        }
        store
    }

    fn collect_keys<S: KvRead + ?Sized>(iter: KvPairIterator<'_, S>) -> Vec<String> {
        iter.map(|pair| {
            let pair = pair.unwrap();
            assert_eq!(pair.key, pair.value);
            hex::encode(pair.key)
        })
        .collect()
    }

    fn check_both_directions(ranges: KeyRanges, expected: &[&str]) {
        let store = standard_store();
        let forward = collect_keys(KvPairIterator::new(&store, ranges.clone(), false));
        assert_eq!(forward, expected, "forward over {ranges}");

        let mut reversed: Vec<&str> = expected.to_vec();
        reversed.reverse();
        let reverse = collect_keys(KvPairIterator::new(&store, ranges.clone(), true));
        assert_eq!(reverse, reversed, "reverse over {ranges}");
    }

    #[test]
    fn test_full_and_empty_ranges() {
        check_both_directions(
            KeyRanges::full(),
            &["00", "10", "30", "3000", "300000", "40", "50", "60", "70", "80", "99", "ffff"],
        );
        check_both_directions(KeyRanges::empty(), &[]);
    }

    #[test]
    fn test_multiple_ranges_skip_gaps() {
        check_both_directions(
            KeyRanges::new(vec![
                kr(None, Some("20")),
                kr(Some("3000"), Some("50")),
                kr(Some("70"), Some("90")),
                kr(Some("a0"), None),
            ]),
            &["00", "10", "3000", "300000", "40", "70", "80", "ffff"],
        );
        check_both_directions(
            KeyRanges::new(vec![
                kr(Some("3000"), Some("50")),
                kr(Some("70"), Some("90")),
                kr(Some("a0"), None),
            ]),
            &["3000", "300000", "40", "70", "80", "ffff"],
        );
        check_both_directions(
            KeyRanges::new(vec![kr(Some("3000"), Some("50")), kr(Some("70"), Some("90"))]),
            &["3000", "300000", "40", "70", "80"],
        );
        check_both_directions(KeyRanges::new(vec![kr(Some("70"), Some("90"))]), &["70", "80"]);
        check_both_directions(KeyRanges::new(vec![kr(Some("50"), Some("50"))]), &[]);
    }

    #[test]
    fn test_set_next_target_forward() {
        let store = MemoryKvStore::new();
        for (key, value) in [
            ("", "33"),
            ("0fffff", "abcd"),
            ("10", "aa"),
            ("1000", "99"),
            ("1001", "93"),
            ("20", "2222"),
            ("30", "3333"),
            ("40", "4444"),
        ] {
            store.put(&b(key), &b(value)).unwrap();
        }
        let ranges = KeyRanges::new(vec![
            kr(None, Some("1000")),
            kr(Some("20"), Some("30")),
            kr(Some("35"), Some("40")),
            kr(Some("50"), None),
        ]);
        let mut iter = KvPairIterator::new(&store, ranges, false);

        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), KvPair::new(b(""), b("33")));

        iter.set_next_target(&b(""));
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), KvPair::new(b(""), b("33")));

        iter.set_next_target(&b("0fffff01"));
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), KvPair::new(b("10"), b("aa")));

        iter.set_next_target(&b("1001"));
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().unwrap(), KvPair::new(b("20"), b("2222")));

        assert!(!iter.has_next().unwrap());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_set_next_target_reverse_is_inclusive() {
        let store = standard_store();
        let ranges = KeyRanges::new(vec![kr(None, Some("20")), kr(Some("3000"), Some("50"))]);
        let mut iter = KvPairIterator::new(&store, ranges, true);

        assert_eq!(iter.next().unwrap().unwrap().key, b("40"));

        // Exact key inside a range is returned again
        iter.set_next_target(&b("40"));
        assert_eq!(iter.next().unwrap().unwrap().key, b("40"));

        // Key in a gap resumes at the largest qualifying key below it
        iter.set_next_target(&b("30"));
        assert_eq!(iter.next().unwrap().unwrap().key, b("10"));
        assert_eq!(iter.next().unwrap().unwrap().key, b("00"));
        assert!(iter.next().is_none());

        // Repositioning after exhaustion revives the iterator
        iter.set_next_target(&b("300001"));
        assert_eq!(iter.next().unwrap().unwrap().key, b("300000"));
    }

    #[test]
    fn test_set_next_target_discards_lookahead() {
        let store = standard_store();
        let mut iter = KvPairIterator::new(&store, KeyRanges::full(), false);
        assert_eq!(iter.peek().unwrap().map(|p| p.key.clone()), Some(b("00")));
        iter.set_next_target(&b("61"));
        assert_eq!(iter.next().unwrap().unwrap().key, b("70"));
    }

    #[test]
    fn test_start_key() {
        let store = standard_store();
        let ranges = KeyRanges::new(vec![kr(Some("3000"), Some("50")), kr(Some("70"), Some("90"))]);

        let forward = KvPairIterator::with_start(&store, ranges.clone(), Some(&b("41")), false);
        assert_eq!(collect_keys(forward), vec!["70", "80"]);

        let reverse = KvPairIterator::with_start(&store, ranges, Some(&b("300000")), true);
        assert_eq!(collect_keys(reverse), vec!["300000", "3000"]);
    }
}
