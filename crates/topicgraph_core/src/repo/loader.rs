//! Rebuilds graph topics from one load session's row-sets.
//!
//! # Responsibility
//! - Stream the five ordered row-sets into the graph in a single pass.
//! - Leave the graph untouched when materialization fails.
//!
//! # Invariants
//! - Ids already present in the graph are rejected before any mutation.
//! - Everything materialized here is clean (no dirty attributes).
//! - Relationship rows whose target is not materialized are skipped.

use crate::db::rows::TopicRowSets;
use crate::model::graph::TopicGraph;
use crate::model::topic::{
    TopicError, TopicHandle, DERIVED_TOPIC_ATTRIBUTE, SORT_ORDER_ATTRIBUTE,
};
use crate::repo::payload::{decode_blob, is_column_backed};
use crate::repo::topic_repo::{RepoError, RepoResult};
use log::warn;
use std::collections::HashSet;

/// Key given to the placeholder topic returned for an empty load.
pub const EMPTY_LOAD_KEY: &str = "Root";
/// Content type of the placeholder topic returned for an empty load.
pub const EMPTY_LOAD_CONTENT_TYPE: &str = "Container";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadMode {
    /// Current state: relationships and derived pointers are resolved.
    Current,
    /// Historical snapshot: derived pointers stay unresolved.
    Historical,
}

/// Materializes `rows` and returns the handle of the first topic row.
///
/// Zero rows yield a single unsaved placeholder topic.
pub(crate) fn materialize(
    graph: &mut TopicGraph,
    rows: &TopicRowSets,
    mode: LoadMode,
) -> RepoResult<TopicHandle> {
    if rows.is_empty() {
        return Ok(graph.create_topic(EMPTY_LOAD_KEY, EMPTY_LOAD_CONTENT_TYPE, None)?);
    }
    if let Some(row) = rows
        .topics
        .iter()
        .find(|row| graph.find_by_id(row.topic_id).is_some())
    {
        return Err(RepoError::AlreadyMaterialized(row.topic_id));
    }

    let mut created = Vec::with_capacity(rows.topics.len());
    match populate(graph, rows, mode, &mut created) {
        Ok(()) => created
            .first()
            .copied()
            .ok_or_else(|| RepoError::Topic(TopicError::MissingValue("topic row".to_string()))),
        Err(err) => {
            discard(graph, &created);
            Err(err)
        }
    }
}

fn populate(
    graph: &mut TopicGraph,
    rows: &TopicRowSets,
    mode: LoadMode,
    created: &mut Vec<TopicHandle>,
) -> RepoResult<()> {
    for (position, row) in rows.topics.iter().enumerate() {
        let parent = row.parent_id.and_then(|id| graph.find_by_id(id));
        let handle =
            graph.materialize_topic(row.topic_id, &row.topic_key, &row.content_type, parent)?;
        created.push(handle);
        let sort_order = row.sort_order.unwrap_or(position as i64);
        graph.set_attribute(
            handle,
            SORT_ORDER_ATTRIBUTE,
            Some(&sort_order.to_string()),
            Some(false),
        )?;
    }

    for row in &rows.attributes {
        let Some(value) = row.attribute_value.as_deref().filter(|value| !value.is_empty()) else {
            continue;
        };
        if is_column_backed(&row.attribute_key) {
            continue;
        }
        if let Some(handle) = graph.find_by_id(row.topic_id) {
            store_loaded_value(graph, handle, &row.attribute_key, value)?;
        }
    }

    for row in &rows.blobs {
        let Some(handle) = graph.find_by_id(row.topic_id) else {
            continue;
        };
        for (key, value) in decode_blob(&row.document) {
            if value.is_empty() || is_column_backed(&key) {
                continue;
            }
            store_loaded_value(graph, handle, &key, &value)?;
        }
    }

    for row in &rows.relationships {
        let (Some(source), Some(target)) = (
            graph.find_by_id(row.source_id),
            graph.find_by_id(row.target_id),
        ) else {
            continue;
        };
        match graph.set_relationship(source, &row.scope, target) {
            Ok(_) => {}
            Err(TopicError::DuplicateKey(key)) => warn!(
                "event=topic_load module=repo status=skip source_id={} target_id={} scope={} reason=duplicate_incoming_key key={}",
                row.source_id, row.target_id, row.scope, key
            ),
            Err(err) => return Err(err.into()),
        }
    }

    for row in &rows.versions {
        if let Some(handle) = graph.find_by_id(row.topic_id) {
            graph.append_version(handle, row.version)?;
        }
    }

    match mode {
        LoadMode::Current => {
            let unresolved: Vec<TopicHandle> = graph
                .handles()
                .filter(|handle| {
                    graph
                        .get(*handle)
                        .is_some_and(|topic| topic.derived_topic().is_none())
                })
                .collect();
            for handle in unresolved {
                graph.resolve_derived_topic(handle)?;
            }
        }
        LoadMode::Historical => {
            for handle in created.iter() {
                graph.unlink_derived_topic(*handle)?;
            }
        }
    }
    Ok(())
}

/// Writes one persisted value; `TopicID` literals are kept even when they
/// do not parse.
fn store_loaded_value(
    graph: &mut TopicGraph,
    handle: TopicHandle,
    key: &str,
    value: &str,
) -> RepoResult<()> {
    if key.eq_ignore_ascii_case(DERIVED_TOPIC_ATTRIBUTE) {
        graph.load_derived_literal(handle, value)?;
    } else {
        graph.set_attribute(handle, key, Some(value), Some(false))?;
    }
    Ok(())
}

/// Removes every topic created by a failed materialization.
fn discard(graph: &mut TopicGraph, created: &[TopicHandle]) {
    let created_set: HashSet<TopicHandle> = created.iter().copied().collect();
    for handle in created {
        let is_subtree_root = match graph.parent(*handle) {
            Ok(parent) => parent.map_or(true, |parent| !created_set.contains(&parent)),
            Err(_) => false,
        };
        if !is_subtree_root {
            continue;
        }
        if let Err(err) = graph.remove_topic(*handle, true) {
            warn!(
                "event=topic_load module=repo status=error stage=discard handle={} error={}",
                handle, err
            );
        }
    }
}
