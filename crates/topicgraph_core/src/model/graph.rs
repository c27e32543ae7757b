//! Arena owning every materialized topic.
//!
//! # Responsibility
//! - Own topics and hand out stable `TopicHandle`s.
//! - Keep structural links, relationship reciprocity and key indexes
//!   consistent across edits.
//! - Resolve attribute values across the parent and derived-topic chains.
//!
//! # Invariants
//! - Siblings never share a case-insensitive key.
//! - outgoing(S, A→B) implies incoming(S, B→A).
//! - Removing a topic removes every parent, relationship and derived-topic
//!   reference to it; nothing dangles.
//! - Writes to typed attribute keys always go through their setter.
//!
//! # Concurrency
//! The graph is not internally synchronized. Mutations need `&mut self`;
//! callers sharing a graph across threads must serialize access themselves.

use crate::model::collections::{ReadOnlyTopicCollection, SortedTopics};
use crate::model::topic::{
    validate_content_type, validate_key, Topic, TopicError, TopicHandle, TopicId, TopicResult,
    CONTENT_TYPE_ATTRIBUTE, DEFAULT_HOP_BUDGET, DERIVED_TOPIC_ATTRIBUTE, KEY_ATTRIBUTE,
    MAX_HOP_BUDGET, NEW_TOPIC_ID, PARENT_ID_ATTRIBUTE, SORT_ORDER_ATTRIBUTE,
};
use std::collections::{HashMap, HashSet};

type TypedSetter =
    fn(&mut TopicGraph, TopicHandle, Option<&str>, Option<bool>) -> TopicResult<()>;

/// Attribute keys backed by a typed field, with the setter that owns them.
const TYPED_ATTRIBUTES: &[(&str, TypedSetter)] = &[
    (KEY_ATTRIBUTE, TopicGraph::apply_key),
    (CONTENT_TYPE_ATTRIBUTE, TopicGraph::apply_content_type),
    (DERIVED_TOPIC_ATTRIBUTE, TopicGraph::apply_derived_topic),
];

fn typed_setter(key: &str) -> Option<TypedSetter> {
    TYPED_ATTRIBUTES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, setter)| *setter)
}

/// Former location of a detached topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TopicPosition {
    pub(crate) parent: TopicHandle,
    pub(crate) index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum KeyHolder {
    Children,
    Outgoing,
    Incoming,
}

/// Graph-owning arena with an id → handle index.
#[derive(Debug, Default)]
pub struct TopicGraph {
    slots: Vec<Option<Topic>>,
    ids: HashMap<TopicId, TopicHandle>,
}

impl TopicGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live topics.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates live handles in creation order.
    pub fn handles(&self) -> impl Iterator<Item = TopicHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| TopicHandle(index))
    }

    pub fn get(&self, handle: TopicHandle) -> Option<&Topic> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    pub fn topic(&self, handle: TopicHandle) -> TopicResult<&Topic> {
        self.get(handle).ok_or(TopicError::UnknownTopic(handle))
    }

    fn topic_mut(&mut self, handle: TopicHandle) -> TopicResult<&mut Topic> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(TopicError::UnknownTopic(handle))
    }

    pub fn find_by_id(&self, id: TopicId) -> Option<TopicHandle> {
        self.ids.get(&id).copied()
    }

    /// Live topics without a parent.
    pub fn roots(&self) -> Vec<TopicHandle> {
        self.handles()
            .filter(|handle| self.get(*handle).is_some_and(|topic| topic.parent.is_none()))
            .collect()
    }

    /// Creates an unsaved topic, optionally attached under `parent`.
    pub fn create_topic(
        &mut self,
        key: &str,
        content_type: &str,
        parent: Option<TopicHandle>,
    ) -> TopicResult<TopicHandle> {
        self.insert_topic(NEW_TOPIC_ID, key, content_type, parent, None)
    }

    /// Creates a topic mirroring persisted state; nothing is dirty.
    pub(crate) fn materialize_topic(
        &mut self,
        id: TopicId,
        key: &str,
        content_type: &str,
        parent: Option<TopicHandle>,
    ) -> TopicResult<TopicHandle> {
        self.insert_topic(id, key, content_type, parent, Some(false))
    }

    fn insert_topic(
        &mut self,
        id: TopicId,
        key: &str,
        content_type: &str,
        parent: Option<TopicHandle>,
        is_dirty: Option<bool>,
    ) -> TopicResult<TopicHandle> {
        validate_key(key)?;
        validate_content_type(content_type)?;
        if let Some(parent) = parent {
            if self.topic(parent)?.children.contains_key(key) {
                return Err(TopicError::DuplicateKey(key.to_string()));
            }
        }

        let handle = TopicHandle(self.slots.len());
        let mut topic = Topic::new(id, key.to_string(), content_type.to_string());
        topic
            .attributes
            .set_value(KEY_ATTRIBUTE, Some(key.to_string()), is_dirty);
        topic
            .attributes
            .set_value(CONTENT_TYPE_ATTRIBUTE, Some(content_type.to_string()), is_dirty);
        self.slots.push(Some(topic));
        if id != NEW_TOPIC_ID {
            self.ids.insert(id, handle);
        }
        if let Some(parent) = parent {
            self.attach(handle, parent, None)?;
        }
        Ok(handle)
    }

    pub fn parent(&self, handle: TopicHandle) -> TopicResult<Option<TopicHandle>> {
        Ok(self.topic(handle)?.parent)
    }

    pub fn children(&self, handle: TopicHandle) -> TopicResult<ReadOnlyTopicCollection<'_>> {
        Ok(self.topic(handle)?.children.as_read_only())
    }

    /// Children ordered by `SortOrder`; evaluated lazily on each iteration.
    pub fn sorted_children(&self, handle: TopicHandle) -> TopicResult<SortedTopics<'_>> {
        self.topic(handle)?;
        Ok(SortedTopics::new(self, handle))
    }

    /// The topic followed by all descendants, depth first.
    pub fn descendants(&self, handle: TopicHandle) -> TopicResult<Vec<TopicHandle>> {
        let mut ordered = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let topic = self.topic(current)?;
            ordered.push(current);
            let children: Vec<TopicHandle> = topic.children.iter().collect();
            stack.extend(children.into_iter().rev());
        }
        Ok(ordered)
    }

    /// Colon-delimited key path from the root, e.g. `Root:Web:About`.
    pub fn unique_key(&self, handle: TopicHandle) -> TopicResult<String> {
        let mut keys = Vec::new();
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            let topic = self.topic(current)?;
            keys.push(topic.key.as_str());
            cursor = topic.parent;
        }
        keys.reverse();
        Ok(keys.join(":"))
    }

    pub fn find_by_unique_key(&self, unique_key: &str) -> Option<TopicHandle> {
        let mut segments = unique_key.split(':');
        let first = segments.next()?;
        let mut cursor = self.roots().into_iter().find(|root| {
            self.get(*root)
                .is_some_and(|topic| topic.key.eq_ignore_ascii_case(first))
        })?;
        for segment in segments {
            cursor = self.get(cursor)?.children.get_topic(segment)?;
        }
        Some(cursor)
    }

    /// Returns whether the topic (and, if `recursive`, its subtree) has
    /// unsaved attribute changes or was never persisted.
    pub fn is_dirty(&self, handle: TopicHandle, recursive: bool) -> TopicResult<bool> {
        let scope = if recursive {
            self.descendants(handle)?
        } else {
            vec![handle]
        };
        for current in scope {
            let topic = self.topic(current)?;
            if topic.is_new() || topic.attributes.is_dirty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Attaches a parentless topic as the last child of `parent`.
    pub fn add_child(&mut self, parent: TopicHandle, child: TopicHandle) -> TopicResult<()> {
        if self.topic(child)?.parent.is_some() {
            return Err(TopicError::AlreadyAttached(child));
        }
        self.ensure_not_ancestor(child, parent)?;
        self.attach(child, parent, None)
    }

    /// Reparents `handle` under `target`, after `sibling` when given.
    pub fn move_topic(
        &mut self,
        handle: TopicHandle,
        target: TopicHandle,
        sibling: Option<TopicHandle>,
    ) -> TopicResult<()> {
        let key = self.topic(handle)?.key.clone();
        self.ensure_not_ancestor(handle, target)?;
        let target_topic = self.topic(target)?;
        if !target_topic.children.accepts_key(handle, &key) {
            return Err(TopicError::DuplicateKey(key));
        }
        if let Some(sibling) = sibling {
            if sibling == handle || !target_topic.children.contains(sibling) {
                return Err(TopicError::InvalidSibling(sibling));
            }
        }

        self.detach(handle)?;
        let position = match sibling {
            Some(sibling) => self
                .topic(target)?
                .children
                .position(sibling)
                .map(|index| index + 1),
            None => None,
        };
        self.attach(handle, target, position)
    }

    /// Removes a topic from the graph, with its subtree when `recursive`.
    pub fn remove_topic(&mut self, handle: TopicHandle, recursive: bool) -> TopicResult<()> {
        if !recursive && !self.topic(handle)?.children.is_empty() {
            return Err(TopicError::HasChildren(handle));
        }
        self.detach(handle)?;
        self.purge(handle)
    }

    /// Current location under the parent, if attached.
    pub(crate) fn position(&self, handle: TopicHandle) -> TopicResult<Option<TopicPosition>> {
        let Some(parent) = self.topic(handle)?.parent else {
            return Ok(None);
        };
        let siblings = &self.topic(parent)?.children;
        Ok(Some(TopicPosition {
            parent,
            index: siblings.position(handle).unwrap_or(siblings.len()),
        }))
    }

    pub(crate) fn detach(&mut self, handle: TopicHandle) -> TopicResult<Option<TopicPosition>> {
        let Some(parent) = self.topic(handle)?.parent else {
            return Ok(None);
        };
        let siblings = &mut self.topic_mut(parent)?.children;
        let index = siblings.position(handle).unwrap_or(siblings.len());
        siblings.remove(handle);
        self.topic_mut(handle)?.parent = None;
        Ok(Some(TopicPosition { parent, index }))
    }

    /// Puts a topic back where `detach` found it.
    pub(crate) fn restore_position(
        &mut self,
        handle: TopicHandle,
        position: Option<TopicPosition>,
    ) -> TopicResult<()> {
        self.detach(handle)?;
        match position {
            Some(position) => self.attach(handle, position.parent, Some(position.index)),
            None => Ok(()),
        }
    }

    fn attach(
        &mut self,
        child: TopicHandle,
        parent: TopicHandle,
        position: Option<usize>,
    ) -> TopicResult<()> {
        let key = self.topic(child)?.key.clone();
        let parent_topic = self.topic_mut(parent)?;
        let parent_id = parent_topic.id;
        let index = position.unwrap_or(parent_topic.children.len());
        parent_topic.children.insert_at(index, &key, child)?;

        let topic = self.topic_mut(child)?;
        topic.parent = Some(parent);
        if parent_id == NEW_TOPIC_ID {
            topic.attributes.remove(PARENT_ID_ATTRIBUTE);
        } else {
            topic.attributes.set_value(
                PARENT_ID_ATTRIBUTE,
                Some(parent_id.to_string()),
                Some(false),
            );
        }
        Ok(())
    }

    fn ensure_not_ancestor(
        &self,
        handle: TopicHandle,
        candidate_parent: TopicHandle,
    ) -> TopicResult<()> {
        self.topic(handle)?;
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(current) = cursor {
            if current == handle || !visited.insert(current) {
                return Err(TopicError::CycleDetected {
                    topic: handle,
                    parent: candidate_parent,
                });
            }
            cursor = self.topic(current)?.parent;
        }
        Ok(())
    }

    /// Drops a detached subtree and every reference to it.
    pub(crate) fn purge(&mut self, handle: TopicHandle) -> TopicResult<()> {
        let doomed = self.descendants(handle)?;
        for current in &doomed {
            self.strip_relationships(*current)?;
        }

        let removed: HashSet<TopicHandle> = doomed.iter().copied().collect();
        for current in doomed {
            if let Some(topic) = self.slots[current.0].take() {
                if topic.id != NEW_TOPIC_ID {
                    self.ids.remove(&topic.id);
                }
            }
        }
        for topic in self.slots.iter_mut().flatten() {
            if topic
                .derived_topic
                .is_some_and(|derived| removed.contains(&derived))
            {
                topic.derived_topic = None;
            }
        }
        Ok(())
    }

    fn strip_relationships(&mut self, handle: TopicHandle) -> TopicResult<()> {
        let topic = self.topic(handle)?;
        let outgoing = topic.relationships.pairs();
        let incoming = topic.incoming_relationships.pairs();
        for (scope, target) in outgoing {
            if let Ok(target_topic) = self.topic_mut(target) {
                target_topic.incoming_relationships.remove_topic(&scope, handle);
            }
        }
        for (scope, source) in incoming {
            if let Ok(source_topic) = self.topic_mut(source) {
                source_topic.relationships.remove_topic(&scope, handle);
            }
        }
        Ok(())
    }

    /// Changes a topic key, re-indexing every collection that holds it.
    pub fn set_key(&mut self, handle: TopicHandle, key: &str) -> TopicResult<()> {
        self.apply_key(handle, Some(key), None)
    }

    pub fn set_content_type(&mut self, handle: TopicHandle, content_type: &str) -> TopicResult<()> {
        self.apply_content_type(handle, Some(content_type), None)
    }

    /// Points the topic at the topic it inherits values from.
    ///
    /// `TopicID` is updated to the derived topic's identity.
    pub fn set_derived_topic(
        &mut self,
        handle: TopicHandle,
        derived: Option<TopicHandle>,
    ) -> TopicResult<()> {
        let literal = match derived {
            Some(derived) => Some(self.topic(derived)?.id.to_string()),
            None => None,
        };
        let topic = self.topic_mut(handle)?;
        topic.derived_topic = derived;
        topic
            .attributes
            .set_value(DERIVED_TOPIC_ATTRIBUTE, literal, None);
        Ok(())
    }

    /// Writes an attribute; typed keys are routed to their setter.
    ///
    /// `is_dirty` overrides change detection when given.
    pub fn set_attribute(
        &mut self,
        handle: TopicHandle,
        key: &str,
        value: Option<&str>,
        is_dirty: Option<bool>,
    ) -> TopicResult<()> {
        if key.trim().is_empty() {
            return Err(TopicError::MissingValue("attribute key".to_string()));
        }
        if let Some(setter) = typed_setter(key) {
            return setter(self, handle, value, is_dirty);
        }
        self.topic_mut(handle)?
            .attributes
            .set_value(key, value.map(str::to_string), is_dirty);
        Ok(())
    }

    pub fn set_attribute_value(
        &mut self,
        handle: TopicHandle,
        key: &str,
        value: &str,
    ) -> TopicResult<()> {
        self.set_attribute(handle, key, Some(value), None)
    }

    /// Marks an attribute as absent; the removal is persisted on save.
    pub fn clear_attribute(&mut self, handle: TopicHandle, key: &str) -> TopicResult<()> {
        self.set_attribute(handle, key, None, None)
    }

    fn apply_key(
        &mut self,
        handle: TopicHandle,
        value: Option<&str>,
        is_dirty: Option<bool>,
    ) -> TopicResult<()> {
        let key = value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TopicError::MissingValue(KEY_ATTRIBUTE.to_string()))?;
        validate_key(key)?;

        let topic = self.topic(handle)?;
        let mut holders: Vec<(TopicHandle, KeyHolder)> = Vec::new();
        if let Some(parent) = topic.parent {
            holders.push((parent, KeyHolder::Children));
        }
        for (_, target) in topic.relationships.pairs() {
            holders.push((target, KeyHolder::Incoming));
        }
        for (_, source) in topic.incoming_relationships.pairs() {
            holders.push((source, KeyHolder::Outgoing));
        }
        holders.sort();
        holders.dedup();

        for (holder, kind) in &holders {
            let holder_topic = self.topic(*holder)?;
            let accepted = match kind {
                KeyHolder::Children => holder_topic.children.accepts_key(handle, key),
                KeyHolder::Outgoing => holder_topic.relationships.accepts_key(handle, key),
                KeyHolder::Incoming => {
                    holder_topic.incoming_relationships.accepts_key(handle, key)
                }
            };
            if !accepted {
                return Err(TopicError::DuplicateKey(key.to_string()));
            }
        }
        for (holder, kind) in holders {
            let holder_topic = self.topic_mut(holder)?;
            match kind {
                KeyHolder::Children => holder_topic.children.change_key(handle, key)?,
                KeyHolder::Outgoing => holder_topic.relationships.change_key(handle, key)?,
                KeyHolder::Incoming => {
                    holder_topic.incoming_relationships.change_key(handle, key)?
                }
            }
        }

        let topic = self.topic_mut(handle)?;
        topic.key = key.to_string();
        topic
            .attributes
            .set_value(KEY_ATTRIBUTE, Some(key.to_string()), is_dirty);
        Ok(())
    }

    fn apply_content_type(
        &mut self,
        handle: TopicHandle,
        value: Option<&str>,
        is_dirty: Option<bool>,
    ) -> TopicResult<()> {
        let content_type = value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TopicError::MissingValue(CONTENT_TYPE_ATTRIBUTE.to_string()))?;
        validate_content_type(content_type)?;

        let topic = self.topic_mut(handle)?;
        topic.content_type = content_type.to_string();
        topic.attributes.set_value(
            CONTENT_TYPE_ATTRIBUTE,
            Some(content_type.to_string()),
            is_dirty,
        );
        Ok(())
    }

    fn apply_derived_topic(
        &mut self,
        handle: TopicHandle,
        value: Option<&str>,
        is_dirty: Option<bool>,
    ) -> TopicResult<()> {
        let value = value.map(str::trim).filter(|value| !value.is_empty());
        let derived = match value {
            Some(raw) => {
                let id: TopicId = raw
                    .parse()
                    .map_err(|_| TopicError::InvalidTopicReference(raw.to_string()))?;
                self.find_by_id(id)
            }
            None => None,
        };

        let topic = self.topic_mut(handle)?;
        topic.derived_topic = derived;
        topic
            .attributes
            .set_value(DERIVED_TOPIC_ATTRIBUTE, value.map(str::to_string), is_dirty);
        Ok(())
    }

    /// Re-resolves the derived pointer from the `TopicID` literal.
    ///
    /// Returns whether a pointer was set; unresolved references clear it.
    pub(crate) fn resolve_derived_topic(&mut self, handle: TopicHandle) -> TopicResult<bool> {
        let derived = self
            .topic(handle)?
            .attributes
            .get_value(DERIVED_TOPIC_ATTRIBUTE)
            .and_then(|raw| raw.trim().parse::<TopicId>().ok())
            .and_then(|id| self.find_by_id(id));
        self.topic_mut(handle)?.derived_topic = derived;
        Ok(derived.is_some())
    }

    /// Stores a persisted `TopicID` literal verbatim and clean.
    ///
    /// The pointer stays empty until `resolve_derived_topic` runs; literals
    /// that are not identities never resolve.
    pub(crate) fn load_derived_literal(
        &mut self,
        handle: TopicHandle,
        literal: &str,
    ) -> TopicResult<()> {
        let topic = self.topic_mut(handle)?;
        topic.derived_topic = None;
        topic.attributes.set_value(
            DERIVED_TOPIC_ATTRIBUTE,
            Some(literal.to_string()),
            Some(false),
        );
        Ok(())
    }

    /// Drops the derived pointer but keeps the `TopicID` literal.
    pub(crate) fn unlink_derived_topic(&mut self, handle: TopicHandle) -> TopicResult<()> {
        self.topic_mut(handle)?.derived_topic = None;
        Ok(())
    }

    /// Resolves `name` locally, then through derived topics (default hops).
    pub fn attribute_value(
        &self,
        handle: TopicHandle,
        name: &str,
        default: &str,
    ) -> TopicResult<String> {
        self.resolve_attribute(handle, name, default, false, true)
    }

    pub fn resolve_attribute(
        &self,
        handle: TopicHandle,
        name: &str,
        default: &str,
        inherit_from_parent: bool,
        inherit_from_derived: bool,
    ) -> TopicResult<String> {
        self.resolve_attribute_with_hops(
            handle,
            name,
            default,
            inherit_from_parent,
            inherit_from_derived,
            DEFAULT_HOP_BUDGET,
        )
    }

    /// Resolves an attribute value.
    ///
    /// Lookup order: local value, then the derived-topic chain (at most
    /// `max_hops` hops, never for `TopicID`, never climbing parents), then
    /// the structural parent with the same flags, then `default`. Empty
    /// values count as absent at every step.
    pub fn resolve_attribute_with_hops(
        &self,
        handle: TopicHandle,
        name: &str,
        default: &str,
        inherit_from_parent: bool,
        inherit_from_derived: bool,
        max_hops: i32,
    ) -> TopicResult<String> {
        if !(0..=MAX_HOP_BUDGET).contains(&max_hops) {
            return Err(TopicError::HopBudgetOutOfRange(max_hops));
        }
        if name.trim().is_empty() {
            return Err(TopicError::MissingValue("attribute name".to_string()));
        }
        self.topic(handle)?;
        Ok(self
            .lookup(
                handle,
                name,
                inherit_from_parent,
                inherit_from_derived,
                max_hops,
            )
            .map_or_else(|| default.to_string(), str::to_string))
    }

    fn lookup(
        &self,
        handle: TopicHandle,
        name: &str,
        inherit_from_parent: bool,
        inherit_from_derived: bool,
        hops: i32,
    ) -> Option<&str> {
        let topic = self.get(handle)?;
        if let Some(value) = topic.attributes.get_value(name) {
            return Some(value);
        }
        if inherit_from_derived && hops > 0 && !name.eq_ignore_ascii_case(DERIVED_TOPIC_ATTRIBUTE)
        {
            if let Some(derived) = topic.derived_topic {
                if let Some(value) = self.lookup(derived, name, false, true, hops - 1) {
                    return Some(value);
                }
            }
        }
        if inherit_from_parent {
            if let Some(parent) = topic.parent {
                return self.lookup(parent, name, true, inherit_from_derived, hops);
            }
        }
        None
    }

    /// Relates `source` to `target` under `scope` and mirrors it on the
    /// target's incoming set.
    ///
    /// Returns `Ok(false)` when a topic with the target's key is already
    /// related under that scope.
    pub fn set_relationship(
        &mut self,
        source: TopicHandle,
        scope: &str,
        target: TopicHandle,
    ) -> TopicResult<bool> {
        let source_key = self.topic(source)?.key.clone();
        let target_topic = self.topic(target)?;
        let target_key = target_topic.key.clone();
        if !target_topic
            .incoming_relationships
            .accepts(scope, &source_key, source)
        {
            return Err(TopicError::DuplicateKey(source_key));
        }

        let appended = self
            .topic_mut(source)?
            .relationships
            .set_topic(scope, &target_key, target, false)?;
        if appended {
            self.topic_mut(target)?
                .incoming_relationships
                .set_topic(scope, &source_key, source, true)?;
        }
        Ok(appended)
    }

    /// Records an incoming-only reference on `target` without a forward link.
    pub fn set_incoming_relationship(
        &mut self,
        target: TopicHandle,
        scope: &str,
        source: TopicHandle,
    ) -> TopicResult<bool> {
        let source_key = self.topic(source)?.key.clone();
        self.topic_mut(target)?
            .incoming_relationships
            .set_topic(scope, &source_key, source, true)
    }

    /// Removes a relationship and its reciprocal entry.
    pub fn remove_relationship(
        &mut self,
        source: TopicHandle,
        scope: &str,
        target: TopicHandle,
    ) -> TopicResult<bool> {
        self.topic(target)?;
        let removed = self
            .topic_mut(source)?
            .relationships
            .remove_topic(scope, target);
        if removed {
            self.topic_mut(target)?
                .incoming_relationships
                .remove_topic(scope, source);
        }
        Ok(removed)
    }

    /// Every outgoing related topic across scopes, deduplicated, optionally
    /// limited to one content type.
    pub fn related_topics(
        &self,
        handle: TopicHandle,
        content_type: Option<&str>,
    ) -> TopicResult<Vec<TopicHandle>> {
        let all = self.topic(handle)?.relationships.all_topics();
        Ok(match content_type {
            Some(content_type) => all
                .into_iter()
                .filter(|related| {
                    self.get(*related)
                        .is_some_and(|topic| topic.content_type.eq_ignore_ascii_case(content_type))
                })
                .collect(),
            None => all,
        })
    }

    pub(crate) fn assign_id(&mut self, handle: TopicHandle, id: TopicId) -> TopicResult<()> {
        let topic = self.topic_mut(handle)?;
        let previous = topic.id;
        topic.id = id;
        if previous != NEW_TOPIC_ID {
            self.ids.remove(&previous);
        }
        self.ids.insert(id, handle);
        Ok(())
    }

    pub(crate) fn prepend_version(&mut self, handle: TopicHandle, version: i64) -> TopicResult<()> {
        self.topic_mut(handle)?.version_history.insert(0, version);
        Ok(())
    }

    pub(crate) fn append_version(&mut self, handle: TopicHandle, version: i64) -> TopicResult<()> {
        self.topic_mut(handle)?.version_history.push(version);
        Ok(())
    }

    pub(crate) fn mark_clean(&mut self, handle: TopicHandle) -> TopicResult<()> {
        self.topic_mut(handle)?.attributes.mark_clean();
        Ok(())
    }

    /// Writes `SortOrder` 0..n for `ordered` without marking it dirty.
    pub(crate) fn renumber(&mut self, ordered: &[TopicHandle]) -> TopicResult<()> {
        for (index, handle) in ordered.iter().enumerate() {
            self.set_attribute(
                *handle,
                SORT_ORDER_ATTRIBUTE,
                Some(&index.to_string()),
                Some(false),
            )?;
        }
        Ok(())
    }
}
