//! Named relationship groups between topics.
//!
//! # Responsibility
//! - Hold ordered, key-unique topic references per scope.
//! - Reject incoming writes on sets that are not incoming-only.
//!
//! # Invariants
//! - Scope names are unique case-insensitively and keep first-seen order.
//! - Reciprocity (outgoing on the source mirrored as incoming on the
//!   target) is maintained by `TopicGraph`, which owns both sides.

use crate::model::collections::{KeyedTopicCollection, ReadOnlyTopicCollection};
use crate::model::topic::{TopicError, TopicHandle, TopicResult};

/// Topic references grouped under one scope name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTopicCollection {
    name: String,
    topics: KeyedTopicCollection,
}

impl NamedTopicCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topics(&self) -> ReadOnlyTopicCollection<'_> {
        self.topics.as_read_only()
    }
}

/// Scope name → ordered topic references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTopicCollection {
    scopes: Vec<NamedTopicCollection>,
    is_incoming_only: bool,
}

impl RelatedTopicCollection {
    /// Creates a set for outgoing relationships.
    pub fn outgoing() -> Self {
        Self {
            scopes: Vec::new(),
            is_incoming_only: false,
        }
    }

    /// Creates an incoming-only set.
    pub fn incoming() -> Self {
        Self {
            scopes: Vec::new(),
            is_incoming_only: true,
        }
    }

    pub fn is_incoming_only(&self) -> bool {
        self.is_incoming_only
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(|scope| scope.topics.is_empty())
    }

    pub fn scopes(&self) -> impl Iterator<Item = &NamedTopicCollection> {
        self.scopes.iter()
    }

    /// Returns the references stored under `scope`, if the scope exists.
    pub fn get_topics(&self, scope: &str) -> Option<ReadOnlyTopicCollection<'_>> {
        self.scope(scope).map(NamedTopicCollection::topics)
    }

    pub fn contains(&self, scope: &str, handle: TopicHandle) -> bool {
        self.scope(scope)
            .is_some_and(|named| named.topics.contains(handle))
    }

    /// Flattens every scope, keeping first occurrence order.
    pub fn all_topics(&self) -> Vec<TopicHandle> {
        let mut seen = Vec::new();
        for scope in &self.scopes {
            for handle in scope.topics.iter() {
                if !seen.contains(&handle) {
                    seen.push(handle);
                }
            }
        }
        seen
    }

    /// Appends `handle` (known by `key`) under `scope`.
    ///
    /// Creates the scope on first use. Returns `Ok(false)` when a topic with
    /// the same key is already present. `is_incoming` marks a reciprocal
    /// write, which only incoming-only sets accept.
    pub fn set_topic(
        &mut self,
        scope: &str,
        key: &str,
        handle: TopicHandle,
        is_incoming: bool,
    ) -> TopicResult<bool> {
        if scope.trim().is_empty() {
            return Err(TopicError::MissingValue("relationship scope".to_string()));
        }
        if is_incoming && !self.is_incoming_only {
            return Err(TopicError::IllegalIncomingWrite {
                scope: scope.to_string(),
            });
        }
        let position = match self.scope_position(scope) {
            Some(position) => position,
            None => {
                self.scopes.push(NamedTopicCollection {
                    name: scope.to_string(),
                    topics: KeyedTopicCollection::default(),
                });
                self.scopes.len() - 1
            }
        };
        Ok(self.scopes[position].topics.try_add(key, handle))
    }

    pub(crate) fn remove_topic(&mut self, scope: &str, handle: TopicHandle) -> bool {
        match self.scope_position(scope) {
            Some(position) => self.scopes[position].topics.remove(handle),
            None => false,
        }
    }

    /// Returns whether `handle` could be stored under `scope` as `key`.
    pub(crate) fn accepts(&self, scope: &str, key: &str, handle: TopicHandle) -> bool {
        self.scope(scope)
            .map_or(true, |named| named.topics.accepts_key(handle, key))
    }

    /// Lists `(scope, handle)` pairs, in scope then insertion order.
    pub(crate) fn pairs(&self) -> Vec<(String, TopicHandle)> {
        self.scopes
            .iter()
            .flat_map(|scope| {
                scope
                    .topics
                    .iter()
                    .map(move |handle| (scope.name.clone(), handle))
            })
            .collect()
    }

    pub(crate) fn accepts_key(&self, handle: TopicHandle, new_key: &str) -> bool {
        self.scopes
            .iter()
            .filter(|scope| scope.topics.contains(handle))
            .all(|scope| scope.topics.accepts_key(handle, new_key))
    }

    pub(crate) fn change_key(&mut self, handle: TopicHandle, new_key: &str) -> TopicResult<()> {
        for scope in &mut self.scopes {
            if scope.topics.contains(handle) {
                scope.topics.change_key(handle, new_key)?;
            }
        }
        Ok(())
    }

    fn scope(&self, scope: &str) -> Option<&NamedTopicCollection> {
        self.scopes
            .iter()
            .find(|named| named.name.eq_ignore_ascii_case(scope))
    }

    fn scope_position(&self, scope: &str) -> Option<usize> {
        self.scopes
            .iter()
            .position(|named| named.name.eq_ignore_ascii_case(scope))
    }
}
