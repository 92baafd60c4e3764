use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::field::StorageId;

/// One difference between two schema items, optionally with nested
/// differences explaining it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub text: String,
    pub details: Diffs,
}

/// An ordered list of differences, rendered as an indented tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diffs {
    entries: Vec<Diff>,
}

impl Diffs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diff> {
        self.entries.iter()
    }

    pub fn add(&mut self, text: impl Into<String>) {
        self.add_with_details(text, Diffs::new());
    }

    pub fn add_with_details(&mut self, text: impl Into<String>, details: Diffs) {
        self.entries.push(Diff {
            text: text.into(),
            details,
        });
    }

    /// Records a change of a scalar property, if there is one.
    pub(crate) fn add_if_changed<T: PartialEq + fmt::Debug>(
        &mut self,
        property: &str,
        this: &T,
        that: &T,
    ) {
        if this != that {
            self.add(format!("changed {property} from {that:?} to {this:?}"));
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for diff in &self.entries {
            writeln!(f, "{:indent$}{}", "", diff.text, indent = depth * 2)?;
            diff.details.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Diffs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl<'a> IntoIterator for &'a Diffs {
    type Item = &'a Diff;
    type IntoIter = std::slice::Iter<'a, Diff>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Items that can describe how they differ from another instance.
///
/// `this.differences_from(that)` describes the changes that turn `that`
/// into `this`: "added" items exist only in `this`, "removed" items only in
/// `that`.
pub trait DiffGenerating<T: ?Sized = Self> {
    fn differences_from(&self, other: &T) -> Diffs;
}

/// Compares two id-keyed maps of items in storage-id order, recording
/// additions, removals and changed items under `describe(item)`. Changed
/// items are described as they were in `that`.
pub(crate) fn diff_maps<V: DiffGenerating>(
    diffs: &mut Diffs,
    this: &BTreeMap<StorageId, V>,
    that: &BTreeMap<StorageId, V>,
    describe: impl Fn(&V) -> String,
) {
    let ids: BTreeSet<StorageId> = this.keys().chain(that.keys()).copied().collect();
    for id in ids {
        match (this.get(&id), that.get(&id)) {
            (None, Some(old)) => diffs.add(format!("removed {}", describe(old))),
            (Some(new), None) => diffs.add(format!("added {}", describe(new))),
            (Some(new), Some(old)) => {
                let details = new.differences_from(old);
                if !details.is_empty() {
                    diffs.add_with_details(format!("changed {}", describe(old)), details);
                }
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_indented_tree() {
        let mut inner = Diffs::new();
        inner.add("changed indexed from false to true");
        let mut diffs = Diffs::new();
        diffs.add("added object type \"Car\" (#30)");
        diffs.add_with_details("changed object type \"Person\" (#10)", inner);
        assert_eq!(
            diffs.to_string(),
            "added object type \"Car\" (#30)\n\
             changed object type \"Person\" (#10)\n  \
             changed indexed from false to true\n"
        );
        assert_eq!(diffs.len(), 2);
    }

    #[test]
    fn test_add_if_changed() {
        let mut diffs = Diffs::new();
        diffs.add_if_changed("type", &"int", &"int");
        assert!(diffs.is_empty());
        diffs.add_if_changed("type", &"long", &"int");
        assert_eq!(
            diffs.iter().next().map(|d| d.text.as_str()),
            Some("changed type from \"int\" to \"long\"")
        );
    }
}
