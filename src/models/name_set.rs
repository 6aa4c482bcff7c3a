//! Unordered set of distinct names
//!
//! `NameSet` is the shared currency of allowlists, filename indexes and
//! dependency edges. Iteration order is unspecified; use
//! [`NameSet::sorted`] when a stable order is needed.

use std::collections::hash_set;
use std::collections::HashSet;

/// A set of distinct strings with arbitrary-order removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet {
    items: HashSet<String>,
}

impl NameSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name, returning true if it was not already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.items.insert(name.into())
    }

    /// Remove a name, returning true if it was present
    pub fn remove(&mut self, name: &str) -> bool {
        self.items.remove(name)
    }

    /// Remove and return an arbitrary element
    pub fn pop(&mut self) -> Option<String> {
        let item = self.items.iter().next()?.clone();
        self.items.remove(&item);
        Some(item)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add every element of `other` to this set
    pub fn union_with(&mut self, other: &NameSet) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn iter(&self) -> hash_set::Iter<'_, String> {
        self.items.iter()
    }

    /// All elements in lexicographic order
    pub fn sorted(&self) -> Vec<String> {
        let mut items: Vec<String> = self.items.iter().cloned().collect();
        items.sort();
        items
    }

    /// Render as sorted, newline-terminated lines
    pub fn to_sorted_lines(&self) -> String {
        let mut out = String::new();
        for item in self.sorted() {
            out.push_str(&item);
            out.push('\n');
        }
        out
    }
}

impl<S: Into<String>> FromIterator<S> for NameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for NameSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.items.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for NameSet {
    type Item = String;
    type IntoIter = hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a NameSet {
    type Item = &'a String;
    type IntoIter = hash_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
