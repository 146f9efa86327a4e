//! Persistent set of selected record keys.
//!
//! Every mutating operation returns a new [`SelectionSet`] and leaves the
//! receiver untouched, so a snapshot handed to an observer never changes
//! under it. Observers can detect change cheaply with [`SelectionSet::same_as`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An immutable set of group keys.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet(Arc<BTreeSet<String>>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(&self, edit: impl FnOnce(&mut BTreeSet<String>)) -> Self {
        let mut next = (*self.0).clone();
        edit(&mut next);
        Self(Arc::new(next))
    }

    pub fn add(&self, key: &str) -> Self {
        self.with(|s| {
            s.insert(key.to_string());
        })
    }

    pub fn remove(&self, key: &str) -> Self {
        self.with(|s| {
            s.remove(key);
        })
    }

    /// Adds the key when `selected` is true, removes it otherwise.
    pub fn set(&self, key: &str, selected: bool) -> Self {
        if selected {
            self.add(key)
        } else {
            self.remove(key)
        }
    }

    pub fn toggle(&self, key: &str) -> Self {
        self.set(key, !self.has(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Adds every key in `keys`. Used for "select all on this page".
    pub fn select_all<'k, I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'k str>,
    {
        self.with(|s| s.extend(keys.into_iter().map(str::to_string)))
    }

    /// Removes every key in `keys`, leaving other selections intact.
    pub fn deselect_all<'k, I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'k str>,
    {
        self.with(|s| {
            for key in keys {
                s.remove(key);
            }
        })
    }

    pub fn clear(&self) -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True if both values are the same snapshot (not merely equal contents).
    pub fn same_as(&self, other: &SelectionSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SelectionSet {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || self.0 == other.0
    }
}

impl Eq for SelectionSet {}

impl Serialize for SelectionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_return_new_values() {
        let empty = SelectionSet::new();
        let one = empty.add("k1");

        assert!(empty.is_empty());
        assert!(one.has("k1"));
        assert!(!one.same_as(&empty));

        let none = one.remove("k1");
        assert!(one.has("k1"));
        assert!(!none.has("k1"));
    }

    #[test]
    fn add_is_idempotent_and_remove_of_absent_is_noop() {
        let s = SelectionSet::new().add("k1").add("k1");
        assert_eq!(s.len(), 1);

        let t = s.remove("missing");
        assert_eq!(t, s);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn select_then_deselect_page_restores_prior_contents() {
        let prior = SelectionSet::new().add("other");
        let page = ["k1", "k2", "k3"];

        let selected = prior.select_all(page);
        assert_eq!(selected.len(), 4);

        let restored = selected.deselect_all(page);
        assert_eq!(restored, prior);
        assert!(restored.has("other"));
    }

    #[test]
    fn toggle_and_set_flip_membership() {
        let s = SelectionSet::new().toggle("k1");
        assert!(s.has("k1"));
        assert!(!s.toggle("k1").has("k1"));
        assert!(s.set("k2", true).has("k2"));
        assert!(!s.set("k1", false).has("k1"));
    }

    #[test]
    fn iteration_is_sorted() {
        let s = SelectionSet::new().add("b").add("c").add("a");
        assert_eq!(s.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn clear_empties_and_serializes_as_list() {
        let s = SelectionSet::new().add("k2").add("k1");
        assert_eq!(serde_json::to_value(&s).unwrap(), serde_json::json!(["k1", "k2"]));
        assert!(s.clear().is_empty());
    }

    #[test]
    fn clones_share_the_snapshot() {
        let s = SelectionSet::new().add("k1");
        let c = s.clone();
        assert!(s.same_as(&c));
    }
}
