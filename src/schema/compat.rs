use std::collections::BTreeMap;

use super::field::StorageId;
use super::hash::CompatibilityHasher;

/// Structural compatibility between two versions of a schema item.
///
/// Compatible items share the same storage ids and encodings, so data
/// written under one can be read under the other. Names are never part of
/// compatibility, and neither are purely behavioral settings such as
/// reference delete actions.
pub trait Compatible {
    fn is_compatible_with(&self, other: &Self) -> bool;

    /// Feeds exactly the properties compared by
    /// [`is_compatible_with`](Compatible::is_compatible_with) into `hasher`.
    fn write_compatibility_hash(&self, hasher: &mut CompatibilityHasher);
}

/// True if both maps have the same ids and pairwise compatible items.
pub(crate) fn all_compatible<V: Compatible>(
    this: &BTreeMap<StorageId, V>,
    that: &BTreeMap<StorageId, V>,
) -> bool {
    this.len() == that.len()
        && this
            .iter()
            .zip(that.iter())
            .all(|((id1, a), (id2, b))| id1 == id2 && a.is_compatible_with(b))
}

/// Hashes the item count followed by each item in id order.
pub(crate) fn hash_all<V: Compatible>(
    items: &BTreeMap<StorageId, V>,
    hasher: &mut CompatibilityHasher,
) {
    hasher.write_u32(items.len() as u32);
    for item in items.values() {
        item.write_compatibility_hash(hasher);
    }
}
