//! Per-topic attribute bag with dirty tracking.
//!
//! # Responsibility
//! - Store attribute values keyed case-insensitively.
//! - Track which values changed since the last persisted state.
//!
//! # Invariants
//! - At most one `AttributeValue` per case-insensitive key.
//! - `AttributeValue` instances are immutable; writes replace them.
//! - Empty strings are treated as absent values.
//!
//! Writes go through `TopicGraph::set_attribute`, which routes typed keys to
//! their setters before the bag stores them.

use std::collections::BTreeMap;

/// One attribute entry owned by exactly one bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    key: String,
    value: Option<String>,
    is_dirty: bool,
}

impl AttributeValue {
    pub fn new(key: impl Into<String>, value: Option<String>, is_dirty: bool) -> Self {
        Self {
            key: key.into(),
            value: normalize(value),
            is_dirty,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the value, `None` when absent.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    fn clean(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            is_dirty: false,
        }
    }
}

/// Case-insensitive, unique attribute store for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCollection {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeCollection {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates entries ordered by lowercase key.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeValue> {
        self.values.values()
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(&fold(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&fold(key))
    }

    /// Returns the local value without any inheritance.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttributeValue::value)
    }

    /// Returns whether any entry changed since the last persisted state.
    pub fn is_dirty(&self) -> bool {
        self.values.values().any(AttributeValue::is_dirty)
    }

    /// Returns whether the given entry is dirty; missing entries are clean.
    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.get(key).is_some_and(AttributeValue::is_dirty)
    }

    /// Stores a value, replacing any previous instance.
    ///
    /// The dirty flag is `is_dirty` when given; otherwise `true` when the
    /// value differs from the previous one, else the previous flag is kept.
    /// Returns whether the stored value changed.
    pub(crate) fn set_value(
        &mut self,
        key: &str,
        value: Option<String>,
        is_dirty: Option<bool>,
    ) -> bool {
        let value = normalize(value);
        let folded = fold(key);
        let previous = self.values.get(&folded);
        let changed = previous.map_or(value.is_some(), |current| current.value != value);
        let dirty = match is_dirty {
            Some(explicit) => explicit,
            None if changed => true,
            None => previous.is_some_and(AttributeValue::is_dirty),
        };
        self.values.insert(
            folded,
            AttributeValue {
                key: key.to_string(),
                value,
                is_dirty: dirty,
            },
        );
        changed
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.values.remove(&fold(key))
    }

    /// Clears every dirty flag after a successful save.
    pub(crate) fn mark_clean(&mut self) {
        for entry in self.values.values_mut() {
            if entry.is_dirty {
                *entry = entry.clean();
            }
        }
    }
}

impl<'a> IntoIterator for &'a AttributeCollection {
    type Item = &'a AttributeValue;
    type IntoIter = std::collections::btree_map::Values<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.values()
    }
}

fn fold(key: &str) -> String {
    key.to_ascii_lowercase()
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
