//! Ordered, uniquely keyed topic collections.
//!
//! # Responsibility
//! - Hold topic handles in insertion order with a case-insensitive key index.
//! - Offer a borrowed read-only projection and a sorted view.
//!
//! # Invariants
//! - No two handles share a case-insensitive key.
//! - Every handle in `items` has exactly one index entry, and vice versa.

use crate::model::graph::TopicGraph;
use crate::model::topic::{TopicError, TopicHandle, TopicResult, SORT_ORDER_ATTRIBUTE};
use std::collections::HashMap;

/// Ordered topic handles indexed by case-insensitive key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedTopicCollection {
    items: Vec<TopicHandle>,
    index: HashMap<String, TopicHandle>,
}

impl KeyedTopicCollection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = TopicHandle> + '_ {
        self.items.iter().copied()
    }

    /// Looks up a topic by key; a miss is not an error.
    pub fn get_topic(&self, key: &str) -> Option<TopicHandle> {
        self.index.get(&key.to_ascii_lowercase()).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(&key.to_ascii_lowercase())
    }

    pub fn contains(&self, handle: TopicHandle) -> bool {
        self.items.contains(&handle)
    }

    pub fn position(&self, handle: TopicHandle) -> Option<usize> {
        self.items.iter().position(|item| *item == handle)
    }

    /// Wraps this collection without copying it.
    pub fn as_read_only(&self) -> ReadOnlyTopicCollection<'_> {
        ReadOnlyTopicCollection { inner: self }
    }

    /// Appends a handle; duplicate keys are rejected.
    pub(crate) fn add(&mut self, key: &str, handle: TopicHandle) -> TopicResult<()> {
        self.insert_at(self.items.len(), key, handle)
    }

    /// Appends a handle unless its key is already present.
    pub(crate) fn try_add(&mut self, key: &str, handle: TopicHandle) -> bool {
        self.add(key, handle).is_ok()
    }

    pub(crate) fn insert_at(
        &mut self,
        position: usize,
        key: &str,
        handle: TopicHandle,
    ) -> TopicResult<()> {
        let folded = key.to_ascii_lowercase();
        if self.index.contains_key(&folded) {
            return Err(TopicError::DuplicateKey(key.to_string()));
        }
        self.index.insert(folded, handle);
        self.items.insert(position.min(self.items.len()), handle);
        Ok(())
    }

    pub(crate) fn remove(&mut self, handle: TopicHandle) -> bool {
        let before = self.items.len();
        self.items.retain(|item| *item != handle);
        self.index.retain(|_, item| *item != handle);
        self.items.len() != before
    }

    /// Returns whether `handle` could be re-indexed under `new_key`.
    pub(crate) fn accepts_key(&self, handle: TopicHandle, new_key: &str) -> bool {
        match self.get_topic(new_key) {
            Some(existing) => existing == handle,
            None => true,
        }
    }

    /// Re-indexes a contained handle under a new key.
    ///
    /// The handle keeps its position; live references stay valid.
    pub(crate) fn change_key(&mut self, handle: TopicHandle, new_key: &str) -> TopicResult<()> {
        if !self.accepts_key(handle, new_key) {
            return Err(TopicError::DuplicateKey(new_key.to_string()));
        }
        if !self.contains(handle) {
            return Err(TopicError::UnknownTopic(handle));
        }
        self.index.retain(|_, item| *item != handle);
        self.index.insert(new_key.to_ascii_lowercase(), handle);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a KeyedTopicCollection {
    type Item = TopicHandle;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, TopicHandle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter().copied()
    }
}

/// Borrowed, read-only projection of a `KeyedTopicCollection`.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyTopicCollection<'a> {
    inner: &'a KeyedTopicCollection,
}

impl<'a> ReadOnlyTopicCollection<'a> {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TopicHandle> + 'a {
        let inner = self.inner;
        inner.items.iter().copied()
    }

    pub fn get_topic(&self, key: &str) -> Option<TopicHandle> {
        self.inner.get_topic(key)
    }

    pub fn contains(&self, handle: TopicHandle) -> bool {
        self.inner.contains(handle)
    }

    /// Copies the handles into a vector.
    pub fn to_vec(&self) -> Vec<TopicHandle> {
        self.inner.items.clone()
    }
}

/// Children of one topic ordered by their numeric `SortOrder` attribute.
///
/// Nothing is computed until `iter` is called, and each call starts over
/// from the current graph state. Topics without a numeric sort order follow
/// the ordered ones in insertion order.
#[derive(Debug, Clone, Copy)]
pub struct SortedTopics<'g> {
    graph: &'g TopicGraph,
    parent: TopicHandle,
}

impl<'g> SortedTopics<'g> {
    pub(crate) fn new(graph: &'g TopicGraph, parent: TopicHandle) -> Self {
        Self { graph, parent }
    }

    pub fn iter(&self) -> std::vec::IntoIter<TopicHandle> {
        let Some(parent) = self.graph.get(self.parent) else {
            return Vec::new().into_iter();
        };
        let mut ordered: Vec<(Option<i64>, TopicHandle)> = parent
            .children
            .iter()
            .map(|child| (self.sort_order(child), child))
            .collect();
        ordered.sort_by_key(|(order, _)| (order.is_none(), order.unwrap_or_default()));
        ordered
            .into_iter()
            .map(|(_, handle)| handle)
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn sort_order(&self, handle: TopicHandle) -> Option<i64> {
        self.graph
            .get(handle)?
            .attributes
            .get_value(SORT_ORDER_ATTRIBUTE)?
            .trim()
            .parse()
            .ok()
    }
}

impl<'g> IntoIterator for &SortedTopics<'g> {
    type Item = TopicHandle;
    type IntoIter = std::vec::IntoIter<TopicHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
