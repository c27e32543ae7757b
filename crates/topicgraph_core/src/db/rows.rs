//! Flat row-sets returned by the load routines.
//!
//! Rows arrive grouped by kind and ordered so a single forward pass can
//! rebuild the graph: topics parent-before-child, versions newest first.

use crate::model::topic::TopicId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub topic_id: TopicId,
    pub content_type: String,
    pub topic_key: String,
    pub parent_id: Option<TopicId>,
    pub sort_order: Option<i64>,
}

/// Latest indexed value for one key; `None` or empty marks a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub topic_id: TopicId,
    pub attribute_key: String,
    pub attribute_value: Option<String>,
}

/// Latest blob document for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRow {
    pub topic_id: TopicId,
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRow {
    pub source_id: TopicId,
    pub target_id: TopicId,
    pub scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRow {
    pub topic_id: TopicId,
    pub version: i64,
}

/// The five correlated row-sets of one load session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicRowSets {
    pub topics: Vec<TopicRow>,
    pub attributes: Vec<AttributeRow>,
    pub blobs: Vec<BlobRow>,
    pub relationships: Vec<RelationshipRow>,
    pub versions: Vec<VersionRow>,
}

impl TopicRowSets {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
