mod common;

use common::TestDb;
use topicgraph_core::db::{open_db, CreateTopicParams, DbError, SqliteRoutines, TopicRoutines};
use topicgraph_core::{
    RepoError, TopicError, TopicGraph, TopicHandle, TopicRepository, TopicSelector, NEW_TOPIC_ID,
};

/// Root (Container) with `Web` (Page) carrying an indexed and a blob value.
fn build_site(graph: &mut TopicGraph) -> (TopicHandle, TopicHandle) {
    let root = graph.create_topic("Root", "Container", None).unwrap();
    graph.set_attribute_value(root, "Title", "Site").unwrap();
    let web = graph.create_topic("Web", "Page", Some(root)).unwrap();
    graph.set_attribute_value(web, "Title", "Welcome").unwrap();
    graph
        .set_attribute_value(web, "Body", "<p>Fish & Chips</p>")
        .unwrap();
    graph.set_attribute_value(web, "Custom", "x").unwrap();
    (root, web)
}

fn load_root(db: &TestDb) -> (TopicGraph, TopicHandle) {
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let root = repo
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();
    (graph, root)
}

#[test]
fn load_from_empty_store_returns_unsaved_root() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();

    let root = repo
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();

    let topic = graph.topic(root).unwrap();
    assert!(topic.is_new());
    assert_eq!(topic.key(), "Root");
    assert_eq!(topic.content_type(), "Container");
    assert!(topic.children().is_empty());

    let missing = repo
        .load(&mut TopicGraph::new(), &TopicSelector::Id(404), false)
        .unwrap();
    assert_eq!(missing.index(), 0);
}

#[test]
fn save_then_reload_round_trips_topics_and_attributes() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let (root, web) = build_site(&mut graph);

    repo.save(&mut graph, root, true, false).unwrap();
    let web_id = graph.topic(web).unwrap().id();
    let root_id = graph.topic(root).unwrap().id();
    assert_ne!(web_id, NEW_TOPIC_ID);

    let mut reloaded = TopicGraph::new();
    let loaded_root = repo
        .load(&mut reloaded, &TopicSelector::Id(root_id), true)
        .unwrap();
    let loaded = reloaded.find_by_id(web_id).unwrap();
    assert_eq!(reloaded.parent(loaded).unwrap(), Some(loaded_root));
    let topic = reloaded.topic(loaded).unwrap();
    assert_eq!(topic.key(), "Web");
    assert_eq!(topic.content_type(), "Page");
    assert_eq!(reloaded.attribute_value(loaded, "Title", "").unwrap(), "Welcome");
    assert_eq!(
        reloaded.attribute_value(loaded, "Body", "").unwrap(),
        "<p>Fish & Chips</p>"
    );
    assert_eq!(reloaded.attribute_value(loaded, "Custom", "").unwrap(), "x");
    assert_eq!(
        reloaded.attribute_value(loaded, "ParentID", "").unwrap(),
        root_id.to_string()
    );
    assert!(!reloaded.is_dirty(loaded_root, true).unwrap());
}

#[test]
fn saving_new_topic_issues_exactly_one_insert() {
    let db = TestDb::new();
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let page = graph.create_topic("Home", "Page", None).unwrap();
    graph.set_attribute_value(page, "Body", "<p>Hi</p>").unwrap();
    graph.set_attribute_value(page, "Title", "Home").unwrap();

    repo.save(&mut graph, page, false, false).unwrap();

    assert_eq!(repo.store().calls(), vec!["create_topic".to_string()]);
    let topic = graph.topic(page).unwrap();
    assert!(!topic.is_new());
    assert_eq!(graph.find_by_id(topic.id()), Some(page));
    assert_eq!(topic.version_history().len(), 1);
}

#[test]
fn save_clears_dirty_flags_and_repoints_children() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let (root, web) = build_site(&mut graph);
    assert!(graph.is_dirty(root, true).unwrap());
    assert_eq!(graph.attribute_value(web, "ParentID", "none").unwrap(), "none");

    repo.save(&mut graph, root, true, false).unwrap();

    assert!(!graph.is_dirty(root, true).unwrap());
    let root_id = graph.topic(root).unwrap().id().to_string();
    assert_eq!(graph.attribute_value(web, "ParentID", "").unwrap(), root_id);
}

#[test]
fn second_save_updates_and_records_removals() {
    let db = TestDb::new();
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let (root, web) = build_site(&mut graph);
    repo.save(&mut graph, root, true, false).unwrap();
    repo.store().clear();

    graph.clear_attribute(web, "Custom").unwrap();
    graph.set_attribute_value(web, "Title", "Hello").unwrap();
    repo.save(&mut graph, web, false, false).unwrap();

    assert_eq!(repo.store().calls(), vec!["update_topic".to_string()]);
    assert_eq!(graph.topic(web).unwrap().version_history().len(), 2);

    let (reloaded, reloaded_root) = load_root(&db);
    let loaded_web = reloaded
        .children(reloaded_root)
        .unwrap()
        .get_topic("Web")
        .unwrap();
    assert_eq!(reloaded.attribute_value(loaded_web, "Title", "").unwrap(), "Hello");
    assert_eq!(
        reloaded.attribute_value(loaded_web, "Custom", "gone").unwrap(),
        "gone"
    );
    assert_eq!(
        reloaded.attribute_value(loaded_web, "Body", "").unwrap(),
        "<p>Fish & Chips</p>"
    );
}

#[test]
fn load_by_unique_key_and_reject_duplicate_materialization() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let (root, _) = build_site(&mut graph);
    repo.save(&mut graph, root, true, false).unwrap();

    let mut reloaded = TopicGraph::new();
    let web = repo
        .load(
            &mut reloaded,
            &TopicSelector::UniqueKey("root:web".to_string()),
            false,
        )
        .unwrap();
    assert_eq!(reloaded.topic(web).unwrap().key(), "Web");

    let err = repo
        .load(
            &mut reloaded,
            &TopicSelector::UniqueKey("Root:Web".to_string()),
            true,
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::AlreadyMaterialized(_)));
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn relationships_and_derived_topics_survive_reload() {
    let db = TestDb::new();
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = graph.create_topic("Root", "Container", None).unwrap();
    let template = graph.create_topic("Template", "Page", Some(root)).unwrap();
    let post = graph.create_topic("Post", "Page", Some(root)).unwrap();
    graph.set_attribute_value(template, "Title", "Untitled").unwrap();
    graph.set_derived_topic(post, Some(template)).unwrap();
    graph.set_relationship(post, "Related", template).unwrap();

    repo.save(&mut graph, root, true, false).unwrap();

    assert_eq!(repo.store().count("create_topic"), 3);
    assert_eq!(repo.store().count("update_relationships"), 1);
    let template_id = graph.topic(template).unwrap().id().to_string();
    assert_eq!(graph.attribute_value(post, "TopicID", "").unwrap(), template_id);
    assert!(!graph.is_dirty(root, true).unwrap());

    let (reloaded, reloaded_root) = load_root(&db);
    let children = reloaded.children(reloaded_root).unwrap();
    let loaded_template = children.get_topic("Template").unwrap();
    let loaded_post = children.get_topic("Post").unwrap();
    assert_eq!(
        reloaded.topic(loaded_post).unwrap().derived_topic(),
        Some(loaded_template)
    );
    assert_eq!(
        reloaded.attribute_value(loaded_post, "Title", "").unwrap(),
        "Untitled"
    );
    assert!(reloaded
        .topic(loaded_post)
        .unwrap()
        .relationships()
        .contains("Related", loaded_template));
    assert!(reloaded
        .topic(loaded_template)
        .unwrap()
        .incoming_relationships()
        .contains("Related", loaded_post));
}

#[test]
fn save_rejects_unsaved_parent_and_unknown_content_type() {
    let db = TestDb::new();
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = graph.create_topic("Root", "Container", None).unwrap();
    let web = graph.create_topic("Web", "Page", Some(root)).unwrap();

    let err = repo.save(&mut graph, web, false, false).unwrap_err();
    assert!(matches!(err, RepoError::UnsavedTopic(handle) if handle == root));

    let odd = graph.create_topic("Odd", "Mystery", None).unwrap();
    let err = repo.save(&mut graph, odd, false, false).unwrap_err();
    assert!(matches!(err, RepoError::UnknownContentType(name) if name == "Mystery"));

    assert!(repo.store().calls().is_empty());
    assert!(graph.topic(web).unwrap().is_new());
}

#[test]
fn failed_save_commits_nothing_and_leaves_graph_unchanged() {
    let db = TestDb::new();
    let mut graph = TopicGraph::new();
    let root = graph.create_topic("Root", "Container", None).unwrap();
    db.repository().save(&mut graph, root, false, false).unwrap();
    let versions_before = graph.topic(root).unwrap().version_history().to_vec();

    graph.set_attribute_value(root, "Title", "Changed").unwrap();
    let web = graph.create_topic("Web", "Page", Some(root)).unwrap();
    let failing = db.failing_repository("create_topic");

    let err = failing.save(&mut graph, root, true, false).unwrap_err();

    match err {
        RepoError::Store {
            operation, context, ..
        } => {
            assert_eq!(operation, "save");
            assert!(context.contains("key=Web"), "context was {context}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(graph.topic(web).unwrap().is_new());
    assert!(graph.is_dirty(root, false).unwrap());
    assert_eq!(graph.topic(root).unwrap().version_history(), versions_before);

    let (reloaded, reloaded_root) = load_root(&db);
    assert!(reloaded.children(reloaded_root).unwrap().is_empty());
    assert_eq!(
        reloaded.attribute_value(reloaded_root, "Title", "none").unwrap(),
        "none"
    );
}

fn build_two_folders(db: &TestDb) {
    let mut graph = TopicGraph::new();
    let root = graph.create_topic("Root", "Container", None).unwrap();
    for folder in ["A", "B"] {
        let parent = graph.create_topic(folder, "Container", Some(root)).unwrap();
        for index in 1..=3 {
            graph
                .create_topic(&format!("{folder}{index}"), "Page", Some(parent))
                .unwrap();
        }
    }
    db.repository().save(&mut graph, root, true, false).unwrap();
}

#[test]
fn move_between_parents_updates_counts_and_parent_id() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = repo
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();
    let a = graph.children(root).unwrap().get_topic("A").unwrap();
    let b = graph.children(root).unwrap().get_topic("B").unwrap();
    let a1 = graph.children(a).unwrap().get_topic("A1").unwrap();

    repo.move_topic(&mut graph, a1, b, None).unwrap();

    assert_eq!(repo.store().count("move_topic"), 1);
    assert_eq!(graph.children(a).unwrap().len(), 2);
    assert_eq!(graph.children(b).unwrap().len(), 4);
    let b_id = graph.topic(b).unwrap().id().to_string();
    assert_eq!(graph.attribute_value(a1, "ParentID", "").unwrap(), b_id);
    assert!(!graph.is_dirty(a1, false).unwrap());
    let sorted: Vec<TopicHandle> = graph.sorted_children(b).unwrap().iter().collect();
    assert_eq!(sorted.last(), Some(&a1));
    assert_eq!(graph.attribute_value(a1, "SortOrder", "").unwrap(), "3");

    let (reloaded, reloaded_root) = load_root(&db);
    let children = reloaded.children(reloaded_root).unwrap();
    let reloaded_a = children.get_topic("A").unwrap();
    let reloaded_b = children.get_topic("B").unwrap();
    assert_eq!(reloaded.children(reloaded_a).unwrap().len(), 2);
    assert_eq!(reloaded.children(reloaded_b).unwrap().len(), 4);
}

#[test]
fn move_after_sibling_places_topic_in_order() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.repository();
    let (mut graph, root) = load_root(&db);
    let a = graph.children(root).unwrap().get_topic("A").unwrap();
    let b = graph.children(root).unwrap().get_topic("B").unwrap();
    let a1 = graph.children(a).unwrap().get_topic("A1").unwrap();
    let b1 = graph.children(b).unwrap().get_topic("B1").unwrap();

    repo.move_topic(&mut graph, a1, b, Some(b1)).unwrap();

    let keys: Vec<String> = graph
        .sorted_children(b)
        .unwrap()
        .iter()
        .map(|child| graph.topic(child).unwrap().key().to_string())
        .collect();
    assert_eq!(keys, vec!["B1", "A1", "B2", "B3"]);

    let (reloaded, reloaded_root) = load_root(&db);
    let reloaded_b = reloaded
        .children(reloaded_root)
        .unwrap()
        .get_topic("B")
        .unwrap();
    let reloaded_keys: Vec<String> = reloaded
        .sorted_children(reloaded_b)
        .unwrap()
        .iter()
        .map(|child| reloaded.topic(child).unwrap().key().to_string())
        .collect();
    assert_eq!(reloaded_keys, keys);
}

#[test]
fn failed_move_restores_original_position() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.failing_repository("move_topic");
    let (mut graph, root) = load_root(&db);
    let a = graph.children(root).unwrap().get_topic("A").unwrap();
    let b = graph.children(root).unwrap().get_topic("B").unwrap();
    let a2 = graph.children(a).unwrap().get_topic("A2").unwrap();
    let before = graph.children(a).unwrap().to_vec();

    let err = repo.move_topic(&mut graph, a2, b, None).unwrap_err();

    assert!(matches!(err, RepoError::Store { operation: "move", .. }));
    assert_eq!(graph.children(a).unwrap().to_vec(), before);
    assert_eq!(graph.children(b).unwrap().len(), 3);
    let a_id = graph.topic(a).unwrap().id().to_string();
    assert_eq!(graph.attribute_value(a2, "ParentID", "").unwrap(), a_id);
}

#[test]
fn move_requires_saved_topics_and_rejects_cycles() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = repo
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();
    let a = graph.children(root).unwrap().get_topic("A").unwrap();
    let a1 = graph.children(a).unwrap().get_topic("A1").unwrap();
    let fresh = graph.create_topic("Fresh", "Page", None).unwrap();
    repo.store().clear();

    assert!(matches!(
        repo.move_topic(&mut graph, fresh, a, None),
        Err(RepoError::UnsavedTopic(handle)) if handle == fresh
    ));
    assert!(matches!(
        repo.move_topic(&mut graph, a, a1, None),
        Err(RepoError::Topic(TopicError::CycleDetected { .. }))
    ));
    assert!(repo.store().calls().is_empty());
}

#[test]
fn delete_cascades_in_store_and_graph() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = repo
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();
    let a = graph.children(root).unwrap().get_topic("A").unwrap();
    let a1 = graph.children(a).unwrap().get_topic("A1").unwrap();
    let a_id = graph.topic(a).unwrap().id();
    repo.store().clear();

    assert!(matches!(
        repo.delete(&mut graph, a, false),
        Err(RepoError::Topic(TopicError::HasChildren(_)))
    ));
    assert!(repo.store().calls().is_empty());

    repo.delete(&mut graph, a, true).unwrap();

    assert_eq!(repo.store().calls(), vec!["delete_topic".to_string()]);
    assert!(graph.get(a).is_none());
    assert!(graph.get(a1).is_none());
    assert_eq!(graph.find_by_id(a_id), None);
    assert_eq!(graph.children(root).unwrap().len(), 1);

    let (reloaded, reloaded_root) = load_root(&db);
    assert_eq!(reloaded.children(reloaded_root).unwrap().len(), 1);
    assert_eq!(reloaded.len(), 5);
}

#[test]
fn deleting_unsaved_topic_never_reaches_store() {
    let db = TestDb::new();
    let repo = db.recording_repository();
    let mut graph = TopicGraph::new();
    let root = graph.create_topic("Root", "Container", None).unwrap();
    let draft = graph.create_topic("Draft", "Page", Some(root)).unwrap();

    repo.delete(&mut graph, draft, false).unwrap();

    assert!(repo.store().calls().is_empty());
    assert!(graph.get(draft).is_none());
    assert!(graph.children(root).unwrap().is_empty());
}

#[test]
fn failed_delete_reattaches_topic_at_former_position() {
    let db = TestDb::new();
    build_two_folders(&db);
    let repo = db.failing_repository("delete_topic");
    let (mut graph, root) = load_root(&db);
    let b = graph.children(root).unwrap().get_topic("B").unwrap();
    let b2 = graph.children(b).unwrap().get_topic("B2").unwrap();
    let before = graph.children(b).unwrap().to_vec();

    let err = repo.delete(&mut graph, b2, false).unwrap_err();

    assert!(matches!(err, RepoError::Store { operation: "delete", .. }));
    assert_eq!(graph.children(b).unwrap().to_vec(), before);
    assert_eq!(graph.parent(b2).unwrap(), Some(b));
}

#[test]
fn load_version_and_rollback_restore_historical_values() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let page = graph.create_topic("Home", "Page", None).unwrap();
    graph.set_attribute_value(page, "Title", "First").unwrap();
    repo.save(&mut graph, page, false, false).unwrap();
    let first_version = graph.topic(page).unwrap().version_history()[0];
    let page_id = graph.topic(page).unwrap().id();

    graph.set_attribute_value(page, "Title", "Second").unwrap();
    graph.set_attribute_value(page, "Subtitle", "Added later").unwrap();
    repo.save(&mut graph, page, false, false).unwrap();

    let mut scratch = TopicGraph::new();
    let historical = repo
        .load_version(&mut scratch, page_id, first_version)
        .unwrap();
    assert_eq!(scratch.attribute_value(historical, "Title", "").unwrap(), "First");
    assert_eq!(
        scratch
            .attribute_value(historical, "Subtitle", "none")
            .unwrap(),
        "none"
    );
    assert_eq!(
        scratch.topic(historical).unwrap().version_history(),
        &[first_version]
    );

    repo.rollback(&mut graph, page, first_version).unwrap();

    assert_eq!(graph.attribute_value(page, "Title", "").unwrap(), "First");
    assert_eq!(graph.attribute_value(page, "Subtitle", "none").unwrap(), "none");
    assert_eq!(graph.topic(page).unwrap().version_history().len(), 3);
    assert!(!graph.is_dirty(page, false).unwrap());

    let mut reloaded = TopicGraph::new();
    let loaded = repo
        .load(&mut reloaded, &TopicSelector::Id(page_id), false)
        .unwrap();
    assert_eq!(reloaded.attribute_value(loaded, "Title", "").unwrap(), "First");
    assert_eq!(
        reloaded.attribute_value(loaded, "Subtitle", "none").unwrap(),
        "none"
    );
}

#[test]
fn load_version_of_unknown_topic_is_not_found() {
    let db = TestDb::new();
    let repo = db.repository();

    let err = repo
        .load_version(&mut TopicGraph::new(), 404, 1)
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::Store {
            operation: "load_version",
            source: DbError::NotFound(404),
            ..
        }
    ));
}

#[test]
fn draft_flag_is_recorded_on_version_row() {
    let db = TestDb::new();
    let repo = db.repository();
    let mut graph = TopicGraph::new();
    let page = graph.create_topic("Home", "Page", None).unwrap();
    repo.save(&mut graph, page, false, true).unwrap();
    let version = graph.topic(page).unwrap().version_history()[0];

    let conn = open_db(db.path()).unwrap();
    let is_draft: bool = conn
        .query_row(
            "SELECT is_draft FROM topic_versions WHERE topic_id = ?1 AND version = ?2;",
            [graph.topic(page).unwrap().id(), version],
            |row| row.get(0),
        )
        .unwrap();
    assert!(is_draft);
}

#[test]
fn load_keeps_non_numeric_topic_reference_literal() {
    let db = TestDb::new();
    {
        let conn = open_db(db.path()).unwrap();
        let mut routines = SqliteRoutines::new(&conn);
        let root_id = routines
            .create_topic(&CreateTopicParams {
                key: "Root".into(),
                content_type: "Container".into(),
                version: 1,
                ..CreateTopicParams::default()
            })
            .unwrap();
        routines
            .create_topic(&CreateTopicParams {
                key: "Web".into(),
                content_type: "Page".into(),
                parent_id: Some(root_id),
                version: 1,
                attributes: vec![("TopicID".into(), "legacy-ref".into())],
                ..CreateTopicParams::default()
            })
            .unwrap();
    }
    let mut graph = TopicGraph::new();

    let root = db
        .repository()
        .load(&mut graph, &TopicSelector::root(), true)
        .unwrap();

    let web = graph.find_by_unique_key("Root:Web").unwrap();
    assert_eq!(graph.attribute_value(web, "TopicID", "").unwrap(), "legacy-ref");
    assert_eq!(graph.topic(web).unwrap().derived_topic(), None);
    assert!(!graph.is_dirty(root, true).unwrap());
}
