#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;
use tempfile::TempDir;
use topicgraph_core::db::{
    CreateTopicParams, DbError, DbResult, SqliteTopicStore, StoreOperation, TopicRoutines,
    TopicRowSets, TopicStore, UpdateTopicParams,
};
use topicgraph_core::{ContentTypeCatalog, SqliteTopicRepository, TopicId};

pub const CATALOG_JSON: &str = r#"[
    {
        "key": "Container",
        "attributes": [
            { "key": "Title" },
            { "key": "Description" }
        ]
    },
    {
        "key": "Page",
        "base": "Container",
        "attributes": [
            { "key": "Body", "kind": "html", "is_extended": true },
            { "key": "Related", "kind": "relationship" }
        ]
    }
]"#;

pub fn catalog() -> ContentTypeCatalog {
    ContentTypeCatalog::from_json_str(CATALOG_JSON).unwrap()
}

/// Temporary database directory kept alive for the test's duration.
pub struct TestDb {
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join("topics.db")
    }

    pub fn repository(&self) -> SqliteTopicRepository {
        SqliteTopicRepository::open(self.path(), catalog())
    }

    pub fn recording_repository(&self) -> SqliteTopicRepository<RecordingStore> {
        SqliteTopicRepository::new(RecordingStore::new(&self.path()), catalog())
    }

    pub fn failing_repository(&self, fail_on: &'static str) -> SqliteTopicRepository<RecordingStore> {
        SqliteTopicRepository::new(RecordingStore::failing(&self.path(), fail_on), catalog())
    }
}

/// SQLite store that records every routine call and can fail one routine.
pub struct RecordingStore {
    inner: SqliteTopicStore,
    fail_on: Option<&'static str>,
    calls: RefCell<Vec<String>>,
}

impl RecordingStore {
    pub fn new(path: &Path) -> Self {
        Self {
            inner: SqliteTopicStore::new(path),
            fail_on: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(path: &Path, fail_on: &'static str) -> Self {
        Self {
            fail_on: Some(fail_on),
            ..Self::new(path)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, routine: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.as_str() == routine)
            .count()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl TopicStore for RecordingStore {
    fn execute<T, F>(&self, operation: StoreOperation, work: F) -> DbResult<T>
    where
        F: FnOnce(&mut dyn TopicRoutines) -> DbResult<T>,
    {
        self.inner.execute(operation, |routines| {
            let mut recorder = Recorder {
                inner: routines,
                fail_on: self.fail_on,
                calls: &self.calls,
            };
            work(&mut recorder)
        })
    }
}

struct Recorder<'r, 's> {
    inner: &'r mut dyn TopicRoutines,
    fail_on: Option<&'static str>,
    calls: &'s RefCell<Vec<String>>,
}

impl Recorder<'_, '_> {
    fn record(&self, routine: &'static str) -> DbResult<()> {
        self.calls.borrow_mut().push(routine.to_string());
        if self.fail_on == Some(routine) {
            return Err(DbError::InvalidData(format!("{routine} failed on purpose")));
        }
        Ok(())
    }
}

impl TopicRoutines for Recorder<'_, '_> {
    fn get_topic_id(&mut self, unique_key: &str) -> DbResult<Option<TopicId>> {
        self.record("get_topic_id")?;
        self.inner.get_topic_id(unique_key)
    }

    fn get_topics(&mut self, topic_id: TopicId, deep: bool) -> DbResult<TopicRowSets> {
        self.record("get_topics")?;
        self.inner.get_topics(topic_id, deep)
    }

    fn get_topic_version(&mut self, topic_id: TopicId, version: i64) -> DbResult<TopicRowSets> {
        self.record("get_topic_version")?;
        self.inner.get_topic_version(topic_id, version)
    }

    fn create_topic(&mut self, params: &CreateTopicParams) -> DbResult<TopicId> {
        self.record("create_topic")?;
        self.inner.create_topic(params)
    }

    fn update_topic(&mut self, params: &UpdateTopicParams) -> DbResult<()> {
        self.record("update_topic")?;
        self.inner.update_topic(params)
    }

    fn move_topic(
        &mut self,
        topic_id: TopicId,
        parent_id: TopicId,
        sibling_id: Option<TopicId>,
    ) -> DbResult<()> {
        self.record("move_topic")?;
        self.inner.move_topic(topic_id, parent_id, sibling_id)
    }

    fn delete_topic(&mut self, topic_id: TopicId) -> DbResult<()> {
        self.record("delete_topic")?;
        self.inner.delete_topic(topic_id)
    }

    fn update_relationships(
        &mut self,
        source_id: TopicId,
        scope: &str,
        target_ids: &str,
    ) -> DbResult<()> {
        self.record("update_relationships")?;
        self.inner.update_relationships(source_id, scope, target_ids)
    }
}
