//! Topic repository: load, save, move and delete over a `TopicStore`.
//!
//! # Responsibility
//! - Materialize store rows into a `TopicGraph` and persist graph changes
//!   back through the named store routines.
//! - Keep the in-memory graph and the store aligned when a call fails.
//!
//! # Invariants
//! - Each call runs in exactly one store session (one transaction).
//! - Preconditions are checked before the store is touched.
//! - Save applies ids, versions and dirty clearing only after commit.
//! - Move and delete edit the graph first and undo the edit when the store
//!   call fails.
//!
//! # See also
//! - `crate::repo::loader` for row materialization.
//! - `crate::repo::payload` for save payload planning.

use crate::db::{
    CreateTopicParams, DbError, SqliteTopicStore, StoreOperation, TopicRowSets, TopicStore,
    UpdateTopicParams,
};
use crate::model::content_type::ContentTypeCatalog;
use crate::model::graph::TopicGraph;
use crate::model::topic::{
    TopicError, TopicHandle, TopicId, DERIVED_TOPIC_ATTRIBUTE, PARENT_ID_ATTRIBUTE,
    SORT_ORDER_ATTRIBUTE,
};
use crate::repo::loader::{materialize, LoadMode};
use crate::repo::payload::{
    encode_blob, is_column_backed, plan_attributes, plan_topic_reference, AttributePlan,
    ReferencePlan, TopicRef,
};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from repository calls.
#[derive(Debug)]
pub enum RepoError {
    /// Model invariant or precondition failure.
    Topic(TopicError),
    /// The topic's content type is not in the catalog.
    UnknownContentType(String),
    /// The call needs a persisted topic but got an unsaved one.
    UnsavedTopic(TopicHandle),
    /// A loaded id is already present in the target graph.
    AlreadyMaterialized(TopicId),
    /// A store routine failed; nothing was committed.
    Store {
        operation: &'static str,
        context: String,
        source: DbError,
    },
}

impl RepoError {
    fn store(operation: &'static str, context: impl Into<String>, source: DbError) -> Self {
        Self::Store {
            operation,
            context: context.into(),
            source,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(err) => write!(f, "{err}"),
            Self::UnknownContentType(name) => write!(f, "unknown content type `{name}`"),
            Self::UnsavedTopic(handle) => write!(f, "topic {handle} has not been saved"),
            Self::AlreadyMaterialized(id) => {
                write!(f, "topic {id} is already materialized in this graph")
            }
            Self::Store {
                operation,
                context,
                source,
            } => write!(f, "{operation} failed ({context}): {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Topic(err) => Some(err),
            Self::Store { source, .. } => Some(source),
            Self::UnknownContentType(_) | Self::UnsavedTopic(_) | Self::AlreadyMaterialized(_) => {
                None
            }
        }
    }
}

impl From<TopicError> for RepoError {
    fn from(value: TopicError) -> Self {
        Self::Topic(value)
    }
}

/// Which topic a load starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelector {
    Id(TopicId),
    /// Colon-delimited key path, e.g. `Root:Web:About`.
    UniqueKey(String),
}

impl TopicSelector {
    pub fn root() -> Self {
        Self::UniqueKey("Root".to_string())
    }
}

impl Display for TopicSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "topic_id={id}"),
            Self::UniqueKey(key) => write!(f, "unique_key={key}"),
        }
    }
}

/// Repository interface for topic graph persistence.
pub trait TopicRepository {
    /// Loads a topic (and its subtree when `deep`) into `graph`.
    fn load(
        &self,
        graph: &mut TopicGraph,
        selector: &TopicSelector,
        deep: bool,
    ) -> RepoResult<TopicHandle>;

    /// Loads one topic as of a historical version.
    ///
    /// Relationships and the derived pointer are not resolved.
    fn load_version(
        &self,
        graph: &mut TopicGraph,
        topic_id: TopicId,
        version: i64,
    ) -> RepoResult<TopicHandle>;

    /// Persists a topic, and its subtree when `recursive`.
    fn save(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        recursive: bool,
        is_draft: bool,
    ) -> RepoResult<()>;

    /// Reparents a persisted topic, after `sibling` when given.
    fn move_topic(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        target: TopicHandle,
        sibling: Option<TopicHandle>,
    ) -> RepoResult<()>;

    /// Deletes a topic; the store cascades to descendants.
    fn delete(&self, graph: &mut TopicGraph, topic: TopicHandle, recursive: bool)
        -> RepoResult<()>;

    /// Restores attribute values from `version` and saves them as a new
    /// version.
    fn rollback(&self, graph: &mut TopicGraph, topic: TopicHandle, version: i64)
        -> RepoResult<()>;
}

/// `TopicRepository` over any `TopicStore`, SQLite by default.
#[derive(Debug)]
pub struct SqliteTopicRepository<S: TopicStore = SqliteTopicStore> {
    store: S,
    catalog: ContentTypeCatalog,
}

impl SqliteTopicRepository<SqliteTopicStore> {
    /// Creates a repository over a SQLite database file.
    pub fn open(path: impl Into<PathBuf>, catalog: ContentTypeCatalog) -> Self {
        Self::new(SqliteTopicStore::new(path), catalog)
    }
}

impl<S: TopicStore> SqliteTopicRepository<S> {
    pub fn new(store: S, catalog: ContentTypeCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &ContentTypeCatalog {
        &self.catalog
    }

    /// Copies a historical version's attributes onto `topic` and saves.
    fn restore_version(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        topic_id: TopicId,
        version: i64,
    ) -> RepoResult<()> {
        let mut scratch = TopicGraph::new();
        let historical = self.load_version(&mut scratch, topic_id, version)?;
        let restored: Vec<(String, String)> = scratch
            .topic(historical)?
            .attributes()
            .iter()
            .filter(|entry| !is_column_backed(entry.key()))
            .filter_map(|entry| {
                entry
                    .value()
                    .map(|value| (entry.key().to_string(), value.to_string()))
            })
            .collect();
        let cleared: Vec<String> = graph
            .topic(topic)?
            .attributes()
            .iter()
            .map(|entry| entry.key().to_string())
            .filter(|key| !is_column_backed(key))
            .filter(|key| {
                !restored
                    .iter()
                    .any(|(restored_key, _)| restored_key.eq_ignore_ascii_case(key))
            })
            .collect();

        for (key, value) in &restored {
            graph.set_attribute(topic, key, Some(value), Some(true))?;
        }
        for key in &cleared {
            graph.set_attribute(topic, key, None, Some(true))?;
        }
        self.save(graph, topic, false, false)
    }

    fn plan_save(&self, graph: &TopicGraph, scope: &[TopicHandle]) -> RepoResult<Vec<TopicSave>> {
        let now = now_ms();
        let in_scope: HashSet<TopicHandle> = scope.iter().copied().collect();
        let mut plans = Vec::with_capacity(scope.len());

        for handle in scope {
            let topic = graph.topic(*handle)?;
            let content_type = self
                .catalog
                .get(topic.content_type())
                .ok_or_else(|| RepoError::UnknownContentType(topic.content_type().to_string()))?;

            let parent = match topic.parent() {
                Some(parent) => {
                    let reference = topic_ref(graph, parent)?;
                    if matches!(reference, TopicRef::Pending(_)) && !in_scope.contains(&parent) {
                        return Err(RepoError::UnsavedTopic(parent));
                    }
                    Some(reference)
                }
                None => None,
            };
            let derived = match topic.derived_topic() {
                Some(derived) => Some(topic_ref(graph, derived)?),
                None => None,
            };

            let mut relationships = Vec::new();
            for named in topic.relationships().scopes() {
                let targets = named
                    .topics()
                    .iter()
                    .map(|target| topic_ref(graph, target))
                    .collect::<RepoResult<Vec<_>>>()?;
                relationships.push((named.name().to_string(), targets));
            }

            let latest = topic.version_history().first().copied().unwrap_or(0);
            plans.push(TopicSave {
                handle: *handle,
                id: (!topic.is_new()).then_some(topic.id()),
                key: topic.key().to_string(),
                content_type: topic.content_type().to_string(),
                parent,
                sort_order: topic
                    .attributes()
                    .get_value(SORT_ORDER_ATTRIBUTE)
                    .and_then(|value| value.trim().parse().ok()),
                version: now.max(latest.saturating_add(1)),
                attributes: plan_attributes(topic, content_type),
                reference: plan_topic_reference(topic, derived),
                relationships,
            });
        }
        Ok(plans)
    }
}

impl<S: TopicStore> TopicRepository for SqliteTopicRepository<S> {
    fn load(
        &self,
        graph: &mut TopicGraph,
        selector: &TopicSelector,
        deep: bool,
    ) -> RepoResult<TopicHandle> {
        let started_at = Instant::now();
        let result = self
            .store
            .execute(StoreOperation::Load, |routines| {
                let topic_id = match selector {
                    TopicSelector::Id(id) => Some(*id),
                    TopicSelector::UniqueKey(key) => routines.get_topic_id(key)?,
                };
                match topic_id {
                    Some(topic_id) => routines.get_topics(topic_id, deep),
                    None => Ok(TopicRowSets::default()),
                }
            })
            .map_err(|source| RepoError::store("load", selector.to_string(), source))
            .and_then(|rows| materialize(graph, &rows, LoadMode::Current));
        log_outcome(
            "topic_load",
            started_at,
            &format!("{selector} deep={deep}"),
            &result,
        );
        result
    }

    fn load_version(
        &self,
        graph: &mut TopicGraph,
        topic_id: TopicId,
        version: i64,
    ) -> RepoResult<TopicHandle> {
        let started_at = Instant::now();
        let context = format!("topic_id={topic_id} version={version}");
        let result = self
            .store
            .execute(StoreOperation::LoadVersion, |routines| {
                let rows = routines.get_topic_version(topic_id, version)?;
                if rows.is_empty() {
                    return Err(DbError::NotFound(topic_id));
                }
                Ok(rows)
            })
            .map_err(|source| RepoError::store("load_version", context.clone(), source))
            .and_then(|rows| materialize(graph, &rows, LoadMode::Historical));
        log_outcome("topic_load_version", started_at, &context, &result);
        result
    }

    fn save(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        recursive: bool,
        is_draft: bool,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let scope = if recursive {
            graph.descendants(topic)?
        } else {
            vec![topic]
        };
        let plans = self.plan_save(graph, &scope)?;
        let context = plans
            .first()
            .map(TopicSave::context)
            .unwrap_or_default();

        let mut failed_at = String::new();
        let session = self.store.execute(StoreOperation::Save, |routines| {
            let mut assigned: HashMap<TopicHandle, TopicId> = HashMap::new();
            for plan in &plans {
                failed_at = plan.context();
                let mut indexed = plan.attributes.indexed.clone();
                let mut removed = plan.attributes.removed.clone();
                match &plan.reference {
                    ReferencePlan::Keep => {}
                    ReferencePlan::Write(reference) => match resolve_ref(*reference, &assigned) {
                        Some(id) => indexed.push((DERIVED_TOPIC_ATTRIBUTE.to_string(), id.to_string())),
                        None => warn!(
                            "event=topic_save module=repo status=skip {} reason=derived_topic_unsaved",
                            plan.context()
                        ),
                    },
                    ReferencePlan::WriteLiteral(literal) => {
                        indexed.push((DERIVED_TOPIC_ATTRIBUTE.to_string(), literal.clone()))
                    }
                    ReferencePlan::Remove => removed.push(DERIVED_TOPIC_ATTRIBUTE.to_string()),
                }
                let blob = encode_blob(&plan.attributes.blob);

                match plan.id {
                    Some(topic_id) => routines.update_topic(&UpdateTopicParams {
                        topic_id,
                        key: plan.key.clone(),
                        content_type: plan.content_type.clone(),
                        sort_order: plan.sort_order,
                        version: plan.version,
                        is_draft,
                        attributes: indexed,
                        blob,
                        removed_attributes: removed,
                        replace_relationships: true,
                    })?,
                    None => {
                        let topic_id = routines.create_topic(&CreateTopicParams {
                            key: plan.key.clone(),
                            content_type: plan.content_type.clone(),
                            parent_id: plan
                                .parent
                                .and_then(|parent| resolve_ref(parent, &assigned)),
                            sort_order: plan.sort_order,
                            version: plan.version,
                            is_draft,
                            attributes: indexed,
                            blob,
                        })?;
                        assigned.insert(plan.handle, topic_id);
                    }
                }
            }

            for plan in &plans {
                failed_at = plan.context();
                let Some(source_id) = resolve_ref(plan.self_ref(), &assigned) else {
                    continue;
                };
                for (scope, targets) in &plan.relationships {
                    let mut target_ids = Vec::with_capacity(targets.len());
                    for target in targets {
                        match resolve_ref(*target, &assigned) {
                            Some(id) => target_ids.push(id.to_string()),
                            None => warn!(
                                "event=topic_save module=repo status=skip source_id={} scope={} reason=relationship_target_unsaved",
                                source_id, scope
                            ),
                        }
                    }
                    if target_ids.is_empty() {
                        continue;
                    }
                    routines.update_relationships(source_id, scope, &target_ids.join(","))?;
                }
            }
            Ok(assigned)
        });

        let result = match session {
            Ok(assigned) => apply_saved(graph, &plans, &assigned),
            Err(source) => Err(RepoError::store("save", failed_at, source)),
        };
        log_outcome(
            "topic_save",
            started_at,
            &format!(
                "{context} topics={} recursive={recursive} is_draft={is_draft}",
                plans.len()
            ),
            &result,
        );
        result
    }

    fn move_topic(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        target: TopicHandle,
        sibling: Option<TopicHandle>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let topic_id = saved_id(graph, topic)?;
        let target_id = saved_id(graph, target)?;
        let sibling_id = match sibling {
            Some(sibling) => Some(saved_id(graph, sibling)?),
            None => None,
        };
        let context = format!("topic_id={topic_id} target_id={target_id}");

        let original = graph.position(topic)?;
        graph.move_topic(topic, target, sibling)?;

        let session = self.store.execute(StoreOperation::Move, |routines| {
            routines.move_topic(topic_id, target_id, sibling_id)
        });
        let result = match session {
            Ok(()) => renumber_after_move(graph, topic, target, sibling),
            Err(source) => {
                graph.restore_position(topic, original)?;
                Err(RepoError::store("move", context.clone(), source))
            }
        };
        log_outcome("topic_move", started_at, &context, &result);
        result
    }

    fn delete(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        recursive: bool,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let node = graph.topic(topic)?;
        if !recursive && !node.children().is_empty() {
            return Err(TopicError::HasChildren(topic).into());
        }
        let topic_id = node.id();
        let is_new = node.is_new();
        let context = format!("topic_id={topic_id} recursive={recursive}");

        let original = graph.detach(topic)?;
        if is_new {
            graph.purge(topic)?;
            log_outcome("topic_delete", started_at, &context, &Ok(()));
            return Ok(());
        }

        let session = self
            .store
            .execute(StoreOperation::Delete, |routines| routines.delete_topic(topic_id));
        let result = match session {
            Ok(()) => graph.purge(topic).map_err(RepoError::from),
            Err(source) => {
                graph.restore_position(topic, original)?;
                Err(RepoError::store("delete", context.clone(), source))
            }
        };
        log_outcome("topic_delete", started_at, &context, &result);
        result
    }

    fn rollback(
        &self,
        graph: &mut TopicGraph,
        topic: TopicHandle,
        version: i64,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let topic_id = saved_id(graph, topic)?;
        let context = format!("topic_id={topic_id} version={version}");

        let result = self.restore_version(graph, topic, topic_id, version);
        log_outcome("topic_rollback", started_at, &context, &result);
        result
    }
}

/// One topic's precomputed save.
#[derive(Debug, Clone)]
struct TopicSave {
    handle: TopicHandle,
    id: Option<TopicId>,
    key: String,
    content_type: String,
    parent: Option<TopicRef>,
    sort_order: Option<i64>,
    version: i64,
    attributes: AttributePlan,
    reference: ReferencePlan,
    relationships: Vec<(String, Vec<TopicRef>)>,
}

impl TopicSave {
    fn self_ref(&self) -> TopicRef {
        match self.id {
            Some(id) => TopicRef::Saved(id),
            None => TopicRef::Pending(self.handle),
        }
    }

    fn context(&self) -> String {
        match self.id {
            Some(id) => format!("key={} topic_id={id}", self.key),
            None => format!("key={} topic_id=new", self.key),
        }
    }
}

fn topic_ref(graph: &TopicGraph, handle: TopicHandle) -> RepoResult<TopicRef> {
    let topic = graph.topic(handle)?;
    Ok(if topic.is_new() {
        TopicRef::Pending(handle)
    } else {
        TopicRef::Saved(topic.id())
    })
}

fn resolve_ref(reference: TopicRef, assigned: &HashMap<TopicHandle, TopicId>) -> Option<TopicId> {
    match reference {
        TopicRef::Saved(id) => Some(id),
        TopicRef::Pending(handle) => assigned.get(&handle).copied(),
    }
}

fn saved_id(graph: &TopicGraph, handle: TopicHandle) -> RepoResult<TopicId> {
    let topic = graph.topic(handle)?;
    if topic.is_new() {
        return Err(RepoError::UnsavedTopic(handle));
    }
    Ok(topic.id())
}

/// Mirrors a committed save into the graph.
fn apply_saved(
    graph: &mut TopicGraph,
    plans: &[TopicSave],
    assigned: &HashMap<TopicHandle, TopicId>,
) -> RepoResult<()> {
    for plan in plans {
        if let Some(id) = assigned.get(&plan.handle) {
            graph.assign_id(plan.handle, *id)?;
        }
        graph.prepend_version(plan.handle, plan.version)?;
        graph.mark_clean(plan.handle)?;
    }

    for plan in plans {
        let id = graph.topic(plan.handle)?.id().to_string();
        let children = graph.children(plan.handle)?.to_vec();
        for child in children {
            graph.set_attribute(child, PARENT_ID_ATTRIBUTE, Some(&id), Some(false))?;
        }
        if let ReferencePlan::Write(reference) = plan.reference {
            if let Some(derived_id) = resolve_ref(reference, assigned) {
                graph.set_attribute(
                    plan.handle,
                    DERIVED_TOPIC_ATTRIBUTE,
                    Some(&derived_id.to_string()),
                    Some(false),
                )?;
            }
        }
    }
    Ok(())
}

/// Renumbers the target's children the way the store did.
fn renumber_after_move(
    graph: &mut TopicGraph,
    topic: TopicHandle,
    target: TopicHandle,
    sibling: Option<TopicHandle>,
) -> RepoResult<()> {
    let mut ordered: Vec<TopicHandle> = graph
        .sorted_children(target)?
        .iter()
        .filter(|child| *child != topic)
        .collect();
    let index = sibling
        .and_then(|sibling| ordered.iter().position(|child| *child == sibling))
        .map_or(ordered.len(), |position| position + 1);
    ordered.insert(index, topic);
    graph.renumber(&ordered)?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn log_outcome<T>(event: &str, started_at: Instant, context: &str, result: &RepoResult<T>) {
    match result {
        Ok(_) => info!(
            "event={event} module=repo status=ok {context} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={event} module=repo status=error {context} duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        ),
    }
}
