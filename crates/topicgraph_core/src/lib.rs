//! Core of topicgraph: a hierarchical topic graph and its SQLite repository.
//!
//! Topics live in a [`TopicGraph`] arena and are addressed by [`TopicHandle`].
//! [`SqliteTopicRepository`] materializes topics from the store and persists
//! their incremental changes.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use db::{DbError, DbResult, SqliteTopicStore, StoreOptions, TopicStore};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::content_type::{
    AttributeDescriptor, AttributeKind, CatalogError, ContentType, ContentTypeCatalog,
    ContentTypeDescriptor,
};
pub use model::graph::TopicGraph;
pub use model::topic::{Topic, TopicError, TopicHandle, TopicId, TopicResult, NEW_TOPIC_ID};
pub use repo::topic_repo::{
    RepoError, RepoResult, SqliteTopicRepository, TopicRepository, TopicSelector,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
