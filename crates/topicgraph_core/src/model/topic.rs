//! Topic record and model-level errors.
//!
//! # Responsibility
//! - Define the canonical topic record held by `TopicGraph`.
//! - Validate keys and content type names before they enter the graph.
//!
//! # Invariants
//! - `id == NEW_TOPIC_ID` until the store assigns an identity.
//! - Typed fields (`key`, `content_type`, `derived_topic`) are mirrored in the
//!   attribute bag under `KEY_ATTRIBUTE`, `CONTENT_TYPE_ATTRIBUTE` and
//!   `DERIVED_TOPIC_ATTRIBUTE`.
//! - Version history is ordered newest first.

use crate::model::attributes::AttributeCollection;
use crate::model::collections::KeyedTopicCollection;
use crate::model::relationships::RelatedTopicCollection;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned topic identity.
pub type TopicId = i64;

/// Identity carried by topics that were never persisted.
pub const NEW_TOPIC_ID: TopicId = -1;

/// Attribute mirroring `Topic::key`.
pub const KEY_ATTRIBUTE: &str = "Key";
/// Attribute mirroring `Topic::content_type`.
pub const CONTENT_TYPE_ATTRIBUTE: &str = "ContentType";
/// Literal parent identity, refreshed on load, save and move.
pub const PARENT_ID_ATTRIBUTE: &str = "ParentID";
/// Reserved identity key naming the derived topic.
pub const DERIVED_TOPIC_ATTRIBUTE: &str = "TopicID";
/// Explicit numeric display order among siblings.
pub const SORT_ORDER_ATTRIBUTE: &str = "SortOrder";

static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid key regex"));

/// Index of a topic inside its owning `TopicGraph`.
///
/// Handles stay valid across key changes and moves; they only dangle after
/// the topic is removed from the graph, in which case lookups return
/// `TopicError::UnknownTopic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicHandle(pub(crate) usize);

impl TopicHandle {
    /// Returns the arena slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for TopicHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type TopicResult<T> = Result<T, TopicError>;

/// Model invariant and precondition failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Key is empty or contains characters outside `[A-Za-z0-9_.-]`.
    InvalidKey(String),
    /// Content type name is empty or malformed.
    InvalidContentType(String),
    /// A required value was not supplied.
    MissingValue(String),
    /// A sibling (or relationship peer) already uses the key.
    DuplicateKey(String),
    /// Handle does not resolve to a live topic.
    UnknownTopic(TopicHandle),
    /// Derived-topic hop budget outside `[0, MAX_HOP_BUDGET]`.
    HopBudgetOutOfRange(i32),
    /// Incoming write attempted on a set that is not incoming-only.
    IllegalIncomingWrite { scope: String },
    /// Reparenting would place a topic under itself.
    CycleDetected {
        topic: TopicHandle,
        parent: TopicHandle,
    },
    /// Topic already has a parent.
    AlreadyAttached(TopicHandle),
    /// Sibling is not a child of the target parent.
    InvalidSibling(TopicHandle),
    /// Non-recursive removal requested for a topic with children.
    HasChildren(TopicHandle),
    /// `TopicID` value is not an integer identity.
    InvalidTopicReference(String),
}

impl Display for TopicError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "invalid topic key `{key}`"),
            Self::InvalidContentType(name) => write!(f, "invalid content type `{name}`"),
            Self::MissingValue(name) => write!(f, "missing required value: {name}"),
            Self::DuplicateKey(key) => write!(f, "duplicate topic key `{key}`"),
            Self::UnknownTopic(handle) => write!(f, "topic handle {handle} is not in the graph"),
            Self::HopBudgetOutOfRange(hops) => write!(
                f,
                "hop budget {hops} is outside the supported range 0..={MAX_HOP_BUDGET}"
            ),
            Self::IllegalIncomingWrite { scope } => write!(
                f,
                "incoming relationship write to `{scope}` on a set that is not incoming-only"
            ),
            Self::CycleDetected { topic, parent } => {
                write!(f, "moving topic {topic} under {parent} would create a cycle")
            }
            Self::AlreadyAttached(handle) => write!(f, "topic {handle} already has a parent"),
            Self::InvalidSibling(handle) => {
                write!(f, "topic {handle} is not a sibling under the target parent")
            }
            Self::HasChildren(handle) => write!(
                f,
                "topic {handle} has children; recursive removal is required"
            ),
            Self::InvalidTopicReference(value) => {
                write!(f, "`{value}` is not a valid topic identity")
            }
        }
    }
}

impl Error for TopicError {}

/// Default number of derived-topic hops followed during resolution.
pub const DEFAULT_HOP_BUDGET: i32 = 5;
/// Largest accepted derived-topic hop budget.
pub const MAX_HOP_BUDGET: i32 = 100;

/// Content record in the hierarchical graph.
#[derive(Debug, Clone)]
pub struct Topic {
    pub(crate) id: TopicId,
    pub(crate) key: String,
    pub(crate) content_type: String,
    pub(crate) parent: Option<TopicHandle>,
    pub(crate) children: KeyedTopicCollection,
    pub(crate) attributes: AttributeCollection,
    pub(crate) relationships: RelatedTopicCollection,
    pub(crate) incoming_relationships: RelatedTopicCollection,
    pub(crate) derived_topic: Option<TopicHandle>,
    pub(crate) version_history: Vec<i64>,
}

impl Topic {
    pub(crate) fn new(id: TopicId, key: String, content_type: String) -> Self {
        Self {
            id,
            key,
            content_type,
            parent: None,
            children: KeyedTopicCollection::default(),
            attributes: AttributeCollection::default(),
            relationships: RelatedTopicCollection::outgoing(),
            incoming_relationships: RelatedTopicCollection::incoming(),
            derived_topic: None,
            version_history: Vec::new(),
        }
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Returns whether the store has never assigned an identity.
    pub fn is_new(&self) -> bool {
        self.id == NEW_TOPIC_ID
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn parent(&self) -> Option<TopicHandle> {
        self.parent
    }

    pub fn children(&self) -> &KeyedTopicCollection {
        &self.children
    }

    pub fn attributes(&self) -> &AttributeCollection {
        &self.attributes
    }

    /// Outgoing relationships, reciprocated on each target.
    pub fn relationships(&self) -> &RelatedTopicCollection {
        &self.relationships
    }

    /// Incoming-only mirror of other topics' outgoing relationships.
    pub fn incoming_relationships(&self) -> &RelatedTopicCollection {
        &self.incoming_relationships
    }

    /// Topic attribute values are inherited from; not owned.
    pub fn derived_topic(&self) -> Option<TopicHandle> {
        self.derived_topic
    }

    /// Persisted version timestamps (epoch ms), newest first.
    pub fn version_history(&self) -> &[i64] {
        &self.version_history
    }
}

/// Validates a topic key.
pub fn validate_key(key: &str) -> TopicResult<()> {
    if key.is_empty() {
        return Err(TopicError::MissingValue(KEY_ATTRIBUTE.to_string()));
    }
    if !KEY_RE.is_match(key) {
        return Err(TopicError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Validates a content type name; same alphabet as keys.
pub fn validate_content_type(content_type: &str) -> TopicResult<()> {
    if content_type.is_empty() {
        return Err(TopicError::MissingValue(CONTENT_TYPE_ATTRIBUTE.to_string()));
    }
    if !KEY_RE.is_match(content_type) {
        return Err(TopicError::InvalidContentType(content_type.to_string()));
    }
    Ok(())
}
