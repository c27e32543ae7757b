//! Named topic store routines and the SQLite store session.
//!
//! # Responsibility
//! - Define the `TopicRoutines` contract the repository talks to.
//! - Run each repository call as one store session: a dedicated
//!   connection, one transaction, commit on success, rollback otherwise.
//!
//! # Invariants
//! - The connection is released on every exit path.
//! - Attribute and blob writes are append-only; reads pick the latest
//!   version per key (optionally bounded by a historical version).
//! - `update_relationships` replaces one scope's target list in full.

use crate::db::open::open_db;
use crate::db::rows::{AttributeRow, BlobRow, RelationshipRow, TopicRow, TopicRowSets, VersionRow};
use crate::db::{DbError, DbResult};
use crate::model::topic::TopicId;
use log::{debug, error};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Repository call a store session serves; selects timeout and locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Lookup,
    Load,
    LoadVersion,
    Save,
    Move,
    Delete,
}

impl StoreOperation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Load => "load",
            Self::LoadVersion => "load_version",
            Self::Save => "save",
            Self::Move => "move",
            Self::Delete => "delete",
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, Self::Lookup | Self::Load | Self::LoadVersion)
    }
}

impl Display for StoreOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Store session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Busy timeout for writes and lookups.
    pub busy_timeout: Duration,
    /// Busy timeout for full and versioned loads.
    pub load_busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            load_busy_timeout: Duration::from_secs(60),
        }
    }
}

impl StoreOptions {
    pub fn timeout_for(&self, operation: StoreOperation) -> Duration {
        match operation {
            StoreOperation::Load | StoreOperation::LoadVersion => self.load_busy_timeout,
            _ => self.busy_timeout,
        }
    }
}

/// Input of the `create_topic` routine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTopicParams {
    pub key: String,
    pub content_type: String,
    pub parent_id: Option<TopicId>,
    pub sort_order: Option<i64>,
    pub version: i64,
    pub is_draft: bool,
    /// Indexed `(key, value)` pairs.
    pub attributes: Vec<(String, String)>,
    /// Full blob document.
    pub blob: String,
}

/// Input of the `update_topic` routine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTopicParams {
    pub topic_id: TopicId,
    pub key: String,
    pub content_type: String,
    pub sort_order: Option<i64>,
    pub version: i64,
    pub is_draft: bool,
    pub attributes: Vec<(String, String)>,
    pub blob: String,
    /// Keys to mark removed as of `version`.
    pub removed_attributes: Vec<String>,
    /// Drops every outgoing relationship; the caller rewrites each scope.
    pub replace_relationships: bool,
}

/// Named routines available inside one store session.
pub trait TopicRoutines {
    /// Resolves a colon-delimited key path to a topic id.
    fn get_topic_id(&mut self, unique_key: &str) -> DbResult<Option<TopicId>>;

    /// Returns the topic (and its subtree when `deep`) as five row-sets.
    fn get_topics(&mut self, topic_id: TopicId, deep: bool) -> DbResult<TopicRowSets>;

    /// Returns one topic as of `version`; relationship rows are not included.
    fn get_topic_version(&mut self, topic_id: TopicId, version: i64) -> DbResult<TopicRowSets>;

    fn create_topic(&mut self, params: &CreateTopicParams) -> DbResult<TopicId>;

    fn update_topic(&mut self, params: &UpdateTopicParams) -> DbResult<()>;

    /// Reparents a topic, placing it after `sibling_id` or last.
    fn move_topic(
        &mut self,
        topic_id: TopicId,
        parent_id: TopicId,
        sibling_id: Option<TopicId>,
    ) -> DbResult<()>;

    /// Deletes a topic; descendants and references cascade.
    fn delete_topic(&mut self, topic_id: TopicId) -> DbResult<()>;

    /// Replaces the targets of one relationship scope.
    ///
    /// `target_ids` is a comma-joined id list; empty clears the scope.
    fn update_relationships(
        &mut self,
        source_id: TopicId,
        scope: &str,
        target_ids: &str,
    ) -> DbResult<()>;
}

/// Opens store sessions for the repository.
pub trait TopicStore {
    /// Runs `work` inside one transaction, committing only when it succeeds.
    fn execute<T, F>(&self, operation: StoreOperation, work: F) -> DbResult<T>
    where
        F: FnOnce(&mut dyn TopicRoutines) -> DbResult<T>;
}

/// File-backed SQLite topic store.
#[derive(Debug, Clone)]
pub struct SqliteTopicStore {
    path: PathBuf,
    options: StoreOptions,
}

impl SqliteTopicStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, StoreOptions::default())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }
}

impl TopicStore for SqliteTopicStore {
    fn execute<T, F>(&self, operation: StoreOperation, work: F) -> DbResult<T>
    where
        F: FnOnce(&mut dyn TopicRoutines) -> DbResult<T>,
    {
        let started_at = Instant::now();
        let result = run_session(&self.path, self.options, operation, work);
        match &result {
            Ok(_) => debug!(
                "event=store_session module=db status=ok operation={} duration_ms={}",
                operation,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=store_session module=db status=error operation={} duration_ms={} error={}",
                operation,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

fn run_session<T, F>(
    path: &Path,
    options: StoreOptions,
    operation: StoreOperation,
    work: F,
) -> DbResult<T>
where
    F: FnOnce(&mut dyn TopicRoutines) -> DbResult<T>,
{
    let mut conn = open_db(path)?;
    conn.busy_timeout(options.timeout_for(operation))?;
    let behavior = if operation.is_read() {
        TransactionBehavior::Deferred
    } else {
        TransactionBehavior::Immediate
    };
    let tx = conn.transaction_with_behavior(behavior)?;
    let value = work(&mut SqliteRoutines::new(&tx))?;
    tx.commit()?;
    Ok(value)
}

/// `TopicRoutines` over a borrowed connection or transaction.
pub struct SqliteRoutines<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoutines<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_scoped<T, F>(&self, sql: &str, scope: LoadScope, bounded: bool, map: F) -> DbResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let deep = i64::from(scope.deep);
        let rows = match scope.version {
            Some(version) if bounded => stmt
                .query_map(params![scope.topic_id, deep, version], map)?
                .collect::<Result<Vec<_>, _>>()?,
            _ => stmt
                .query_map(params![scope.topic_id, deep], map)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    fn load(&self, scope: LoadScope) -> DbResult<TopicRowSets> {
        let topics = self.query_scoped(&topics_sql(), scope, false, |row| {
            Ok(TopicRow {
                topic_id: row.get(0)?,
                content_type: row.get(1)?,
                topic_key: row.get(2)?,
                parent_id: row.get(3)?,
                sort_order: row.get(4)?,
            })
        })?;
        if topics.is_empty() {
            return Ok(TopicRowSets::default());
        }

        let bounded = scope.version.is_some();
        let attributes = self.query_scoped(&attributes_sql(bounded), scope, bounded, |row| {
            Ok(AttributeRow {
                topic_id: row.get(0)?,
                attribute_key: row.get(1)?,
                attribute_value: row.get(2)?,
            })
        })?;
        let blobs = self.query_scoped(&blobs_sql(bounded), scope, bounded, |row| {
            Ok(BlobRow {
                topic_id: row.get(0)?,
                document: row.get(1)?,
            })
        })?;
        let relationships = if bounded {
            Vec::new()
        } else {
            self.query_scoped(&relationships_sql(), scope, false, |row| {
                Ok(RelationshipRow {
                    source_id: row.get(0)?,
                    target_id: row.get(1)?,
                    scope: row.get(2)?,
                })
            })?
        };
        let versions = self.query_scoped(&versions_sql(bounded), scope, bounded, |row| {
            Ok(VersionRow {
                topic_id: row.get(0)?,
                version: row.get(1)?,
            })
        })?;

        Ok(TopicRowSets {
            topics,
            attributes,
            blobs,
            relationships,
            versions,
        })
    }

    fn write_version(
        &self,
        topic_id: TopicId,
        version: i64,
        is_draft: bool,
        attributes: &[(String, String)],
        blob: &str,
    ) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO topic_versions (topic_id, version, is_draft) VALUES (?1, ?2, ?3);",
            params![topic_id, version, is_draft],
        )?;
        let mut insert = self.conn.prepare_cached(
            "INSERT INTO attributes (topic_id, attribute_key, attribute_value, version)
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for (key, value) in attributes {
            insert.execute(params![topic_id, key, value, version])?;
        }
        self.conn.execute(
            "INSERT INTO extended_attributes (topic_id, attributes_xml, version)
             VALUES (?1, ?2, ?3);",
            params![topic_id, blob, version],
        )?;
        Ok(())
    }

    fn ensure_topic_exists(&self, topic_id: TopicId) -> DbResult<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM topics WHERE topic_id = ?1);",
            [topic_id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(DbError::NotFound(topic_id))
        }
    }
}

impl TopicRoutines for SqliteRoutines<'_> {
    fn get_topic_id(&mut self, unique_key: &str) -> DbResult<Option<TopicId>> {
        let mut segments = unique_key.split(':').map(str::trim);
        let Some(first) = segments.next().filter(|segment| !segment.is_empty()) else {
            return Ok(None);
        };
        let mut current: Option<TopicId> = self
            .conn
            .query_row(
                "SELECT topic_id FROM topics
                 WHERE parent_id IS NULL AND topic_key = ?1 COLLATE NOCASE
                 ORDER BY topic_id
                 LIMIT 1;",
                [first],
                |row| row.get(0),
            )
            .optional()?;
        for segment in segments {
            let Some(parent_id) = current else {
                return Ok(None);
            };
            current = self
                .conn
                .query_row(
                    "SELECT topic_id FROM topics
                     WHERE parent_id = ?1 AND topic_key = ?2 COLLATE NOCASE;",
                    params![parent_id, segment],
                    |row| row.get(0),
                )
                .optional()?;
        }
        Ok(current)
    }

    fn get_topics(&mut self, topic_id: TopicId, deep: bool) -> DbResult<TopicRowSets> {
        self.load(LoadScope {
            topic_id,
            deep,
            version: None,
        })
    }

    fn get_topic_version(&mut self, topic_id: TopicId, version: i64) -> DbResult<TopicRowSets> {
        self.load(LoadScope {
            topic_id,
            deep: false,
            version: Some(version),
        })
    }

    fn create_topic(&mut self, params: &CreateTopicParams) -> DbResult<TopicId> {
        self.conn.execute(
            "INSERT INTO topics (topic_key, content_type, parent_id, sort_order)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                params.key,
                params.content_type,
                params.parent_id,
                params.sort_order
            ],
        )?;
        let topic_id = self.conn.last_insert_rowid();
        self.write_version(
            topic_id,
            params.version,
            params.is_draft,
            &params.attributes,
            &params.blob,
        )?;
        Ok(topic_id)
    }

    fn update_topic(&mut self, params: &UpdateTopicParams) -> DbResult<()> {
        let updated = self.conn.execute(
            "UPDATE topics
             SET topic_key = ?2,
                 content_type = ?3,
                 sort_order = COALESCE(?4, sort_order)
             WHERE topic_id = ?1;",
            params![
                params.topic_id,
                params.key,
                params.content_type,
                params.sort_order
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(params.topic_id));
        }

        self.write_version(
            params.topic_id,
            params.version,
            params.is_draft,
            &params.attributes,
            &params.blob,
        )?;

        let mut mark_removed = self.conn.prepare_cached(
            "INSERT INTO attributes (topic_id, attribute_key, attribute_value, version)
             SELECT ?1, ?2, '', ?3
             WHERE COALESCE((
                 SELECT attribute_value FROM attributes
                 WHERE topic_id = ?1 AND attribute_key = ?2
                 ORDER BY version DESC
                 LIMIT 1
             ), '') <> '';",
        )?;
        for key in &params.removed_attributes {
            mark_removed.execute(params![params.topic_id, key, params.version])?;
        }

        if params.replace_relationships {
            self.conn.execute(
                "DELETE FROM relationships WHERE source_topic_id = ?1;",
                [params.topic_id],
            )?;
        }
        Ok(())
    }

    fn move_topic(
        &mut self,
        topic_id: TopicId,
        parent_id: TopicId,
        sibling_id: Option<TopicId>,
    ) -> DbResult<()> {
        self.ensure_topic_exists(topic_id)?;
        self.ensure_topic_exists(parent_id)?;

        let creates_cycle: bool = self.conn.query_row(
            "WITH RECURSIVE subtree(topic_id) AS (
                SELECT ?1
                UNION ALL
                SELECT child.topic_id
                FROM topics child
                JOIN subtree ON child.parent_id = subtree.topic_id
             )
             SELECT EXISTS(SELECT 1 FROM subtree WHERE topic_id = ?2);",
            params![topic_id, parent_id],
            |row| row.get(0),
        )?;
        if creates_cycle {
            return Err(DbError::InvalidData(format!(
                "moving topic {topic_id} under {parent_id} would create a cycle"
            )));
        }

        let mut siblings: Vec<TopicId> = {
            let mut stmt = self.conn.prepare(
                "SELECT topic_id FROM topics
                 WHERE parent_id = ?1 AND topic_id <> ?2
                 ORDER BY sort_order IS NULL, sort_order, topic_id;",
            )?;
            let rows = stmt.query_map(params![parent_id, topic_id], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let index = match sibling_id {
            Some(sibling_id) => siblings
                .iter()
                .position(|id| *id == sibling_id)
                .map(|position| position + 1)
                .ok_or_else(|| {
                    DbError::InvalidData(format!(
                        "topic {sibling_id} is not a child of topic {parent_id}"
                    ))
                })?,
            None => siblings.len(),
        };
        siblings.insert(index, topic_id);

        self.conn.execute(
            "UPDATE topics SET parent_id = ?2 WHERE topic_id = ?1;",
            params![topic_id, parent_id],
        )?;
        let mut renumber = self
            .conn
            .prepare_cached("UPDATE topics SET sort_order = ?2 WHERE topic_id = ?1;")?;
        for (position, id) in siblings.into_iter().enumerate() {
            renumber.execute(params![id, position as i64])?;
        }
        Ok(())
    }

    fn delete_topic(&mut self, topic_id: TopicId) -> DbResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM topics WHERE topic_id = ?1;", [topic_id])?;
        if deleted == 0 {
            return Err(DbError::NotFound(topic_id));
        }
        Ok(())
    }

    fn update_relationships(
        &mut self,
        source_id: TopicId,
        scope: &str,
        target_ids: &str,
    ) -> DbResult<()> {
        let targets = parse_id_list(target_ids)?;
        self.ensure_topic_exists(source_id)?;
        self.conn.execute(
            "DELETE FROM relationships WHERE source_topic_id = ?1 AND relationship_key = ?2;",
            params![source_id, scope],
        )?;
        let mut insert = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO relationships
                (source_topic_id, relationship_key, target_topic_id, position)
             VALUES (?1, ?2, ?3, ?4);",
        )?;
        for (position, target_id) in targets.into_iter().enumerate() {
            insert.execute(params![source_id, scope, target_id, position as i64])?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct LoadScope {
    topic_id: TopicId,
    deep: bool,
    version: Option<i64>,
}

/// `scope(topic_id, depth)`: the requested topic plus, when `?2 = 1`, its
/// descendants.
const SCOPE_CTE: &str = "WITH RECURSIVE scope(topic_id, depth) AS (
    SELECT topic_id, 0 FROM topics WHERE topic_id = ?1
    UNION ALL
    SELECT child.topic_id, scope.depth + 1
    FROM topics child
    JOIN scope ON child.parent_id = scope.topic_id
    WHERE ?2 = 1
)";

fn topics_sql() -> String {
    format!(
        "{SCOPE_CTE}
        SELECT t.topic_id, t.content_type, t.topic_key, t.parent_id, t.sort_order
        FROM topics t
        JOIN scope s ON s.topic_id = t.topic_id
        ORDER BY s.depth, t.parent_id, t.sort_order IS NULL, t.sort_order, t.topic_id;"
    )
}

fn attributes_sql(bounded: bool) -> String {
    let bound = if bounded { "AND latest.version <= ?3" } else { "" };
    format!(
        "{SCOPE_CTE}
        SELECT a.topic_id, a.attribute_key, a.attribute_value
        FROM attributes a
        JOIN scope s ON s.topic_id = a.topic_id
        WHERE a.version = (
            SELECT MAX(latest.version)
            FROM attributes latest
            WHERE latest.topic_id = a.topic_id
              AND latest.attribute_key = a.attribute_key
              {bound}
        )
        ORDER BY s.depth, a.topic_id, a.attribute_key;"
    )
}

fn blobs_sql(bounded: bool) -> String {
    let bound = if bounded { "AND latest.version <= ?3" } else { "" };
    format!(
        "{SCOPE_CTE}
        SELECT x.topic_id, x.attributes_xml
        FROM extended_attributes x
        JOIN scope s ON s.topic_id = x.topic_id
        WHERE x.version = (
            SELECT MAX(latest.version)
            FROM extended_attributes latest
            WHERE latest.topic_id = x.topic_id
              {bound}
        )
        ORDER BY s.depth, x.topic_id;"
    )
}

fn relationships_sql() -> String {
    format!(
        "{SCOPE_CTE}
        SELECT r.source_topic_id, r.target_topic_id, r.relationship_key
        FROM relationships r
        JOIN scope s ON s.topic_id = r.source_topic_id
        ORDER BY s.depth, r.source_topic_id, r.relationship_key, r.position;"
    )
}

fn versions_sql(bounded: bool) -> String {
    let bound = if bounded { "WHERE v.version <= ?3" } else { "" };
    format!(
        "{SCOPE_CTE}
        SELECT v.topic_id, v.version
        FROM topic_versions v
        JOIN scope s ON s.topic_id = v.topic_id
        {bound}
        ORDER BY s.depth, v.topic_id, v.version DESC;"
    )
}

fn parse_id_list(raw: &str) -> DbResult<Vec<TopicId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<TopicId>()
                .map_err(|_| DbError::InvalidData(format!("`{part}` is not a topic id")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_id_list, CreateTopicParams, SqliteRoutines, TopicRoutines, UpdateTopicParams};
    use crate::db::{open_db_in_memory, DbError};

    fn create(
        routines: &mut SqliteRoutines<'_>,
        key: &str,
        parent_id: Option<i64>,
        sort_order: Option<i64>,
    ) -> i64 {
        routines
            .create_topic(&CreateTopicParams {
                key: key.to_string(),
                content_type: "Container".to_string(),
                parent_id,
                sort_order,
                version: 1,
                ..CreateTopicParams::default()
            })
            .unwrap()
    }

    #[test]
    fn get_topic_id_resolves_key_path_case_insensitively() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let web = create(&mut routines, "Web", Some(root), None);

        assert_eq!(routines.get_topic_id("root:WEB").unwrap(), Some(web));
        assert_eq!(routines.get_topic_id("Root").unwrap(), Some(root));
        assert_eq!(routines.get_topic_id("Root:Missing").unwrap(), None);
        assert_eq!(routines.get_topic_id("").unwrap(), None);
    }

    #[test]
    fn get_topics_deep_orders_parents_before_children() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let web = create(&mut routines, "Web", Some(root), Some(0));
        let about = create(&mut routines, "About", Some(web), Some(0));

        let shallow = routines.get_topics(root, false).unwrap();
        assert_eq!(shallow.topics.len(), 1);

        let deep = routines.get_topics(root, true).unwrap();
        let ids: Vec<i64> = deep.topics.iter().map(|row| row.topic_id).collect();
        assert_eq!(ids, vec![root, web, about]);
        assert_eq!(deep.versions.len(), 3);
        assert_eq!(deep.blobs.len(), 3);
    }

    #[test]
    fn removal_marker_hides_value_and_version_load_sees_history() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = routines
            .create_topic(&CreateTopicParams {
                key: "Root".to_string(),
                content_type: "Page".to_string(),
                version: 10,
                attributes: vec![("Title".to_string(), "Home".to_string())],
                ..CreateTopicParams::default()
            })
            .unwrap();
        routines
            .update_topic(&UpdateTopicParams {
                topic_id: root,
                key: "Root".to_string(),
                content_type: "Page".to_string(),
                version: 20,
                removed_attributes: vec!["title".to_string(), "Never".to_string()],
                ..UpdateTopicParams::default()
            })
            .unwrap();

        let current = routines.get_topics(root, false).unwrap();
        assert_eq!(current.attributes.len(), 1);
        assert_eq!(current.attributes[0].attribute_value.as_deref(), Some(""));
        let versions: Vec<i64> = current.versions.iter().map(|row| row.version).collect();
        assert_eq!(versions, vec![20, 10]);

        let historical = routines.get_topic_version(root, 10).unwrap();
        assert_eq!(
            historical.attributes[0].attribute_value.as_deref(),
            Some("Home")
        );
        assert_eq!(historical.versions.len(), 1);
        assert!(historical.relationships.is_empty());
    }

    #[test]
    fn move_topic_places_after_sibling_and_renumbers() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let a = create(&mut routines, "A", Some(root), Some(0));
        let b = create(&mut routines, "B", Some(root), Some(1));
        let other = create(&mut routines, "Other", None, None);
        let c = create(&mut routines, "C", Some(other), Some(0));

        routines.move_topic(c, root, Some(a)).unwrap();

        let rows = routines.get_topics(root, true).unwrap();
        let children: Vec<(i64, Option<i64>)> = rows
            .topics
            .iter()
            .filter(|row| row.parent_id == Some(root))
            .map(|row| (row.topic_id, row.sort_order))
            .collect();
        assert_eq!(children, vec![(a, Some(0)), (c, Some(1)), (b, Some(2))]);
    }

    #[test]
    fn move_topic_under_own_descendant_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let web = create(&mut routines, "Web", Some(root), None);

        let err = routines.move_topic(root, web, None).unwrap_err();
        assert!(matches!(err, DbError::InvalidData(_)));
    }

    #[test]
    fn delete_topic_cascades_and_reports_missing_ids() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let web = create(&mut routines, "Web", Some(root), None);
        routines
            .update_relationships(root, "Related", &web.to_string())
            .unwrap();

        routines.delete_topic(root).unwrap();

        assert!(routines.get_topics(web, false).unwrap().is_empty());
        assert!(matches!(
            routines.delete_topic(root),
            Err(DbError::NotFound(id)) if id == root
        ));
    }

    #[test]
    fn update_relationships_replaces_scope_in_order() {
        let conn = open_db_in_memory().unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root = create(&mut routines, "Root", None, None);
        let a = create(&mut routines, "A", Some(root), None);
        let b = create(&mut routines, "B", Some(root), None);

        routines
            .update_relationships(root, "Related", &format!("{a},{b}"))
            .unwrap();
        routines
            .update_relationships(root, "related", &b.to_string())
            .unwrap();

        let rows = routines.get_topics(root, false).unwrap();
        let targets: Vec<i64> = rows.relationships.iter().map(|row| row.target_id).collect();
        assert_eq!(targets, vec![b]);
    }

    #[test]
    fn parse_id_list_rejects_garbage() {
        assert_eq!(parse_id_list(" 1, 2,,3 ").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            parse_id_list("1,x"),
            Err(DbError::InvalidData(_))
        ));
    }
}
