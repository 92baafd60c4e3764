//! Byte-key helpers shared by key ranges, iterators and stores.
//!
//! Keys are compared purely lexicographically as unsigned bytes, which is
//! exactly the `Ord` implementation of `[u8]`. An upper bound of `None` means
//! "end of the keyspace" and sorts after every finite key.

use std::cmp::Ordering;

/// Returns the smallest key strictly greater than `key`, i.e. `key` followed
/// by a single zero byte. No key sorts between `key` and the result.
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

/// Returns the smallest key that does not start with `prefix`, or `None`
/// if every key following `prefix` starts with it (empty or all `0xff`).
///
/// `[0x61]` gives `[0x62]`, `[0x61, 0xff]` gives `[0x62]`, `[0xff]` gives `None`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut result = prefix.to_vec();
    while let Some(last) = result.last_mut() {
        if *last < 0xff {
            *last += 1;
            return Some(result);
        }
        result.pop();
    }
    None
}

/// Compares two upper bounds where `None` is the end of the keyspace.
pub fn compare_max(a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Returns true if `key` sorts strictly below the upper bound `max`.
pub fn is_below(key: &[u8], max: Option<&[u8]>) -> bool {
    max.map_or(true, |max| key < max)
}

/// Renders a key for logs and error messages.
pub fn describe(key: &[u8]) -> String {
    if key.is_empty() {
        "<empty>".to_string()
    } else {
        hex::encode(key)
    }
}
