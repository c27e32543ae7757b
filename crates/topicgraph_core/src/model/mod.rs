//! In-memory topic graph model.
//!
//! # Responsibility
//! - Define topics, attribute bags, keyed collections and relationship sets.
//! - Keep the graph internally consistent independent of storage.
//!
//! # Invariants
//! - Every topic lives in exactly one `TopicGraph` and is addressed by handle.
//! - Persisted identity is assigned by the store; unsaved topics carry
//!   `NEW_TOPIC_ID`.

pub mod attributes;
pub mod collections;
pub mod content_type;
pub mod graph;
pub mod relationships;
pub mod topic;
