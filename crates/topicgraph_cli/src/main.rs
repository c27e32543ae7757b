//! CLI probe for `topicgraph_core`.
//!
//! # Responsibility
//! - Print the core crate version.
//! - Start file logging when `TOPICGRAPH_LOG_DIR` names an absolute directory
//!   (`TOPICGRAPH_LOG_LEVEL` overrides the build's default level).
//! - Given a database path (and optional unique key), load the topic tree
//!   and print it in sort order.
//!
//! Usage: `topicgraph [<db-path> [<unique-key>]]`

use std::process::ExitCode;
use topicgraph_core::{
    core_version, default_log_level, init_logging, ContentTypeCatalog, LoggingError,
    SqliteTopicRepository, TopicGraph, TopicHandle, TopicRepository, TopicSelector,
};

const LOG_DIR_ENV: &str = "TOPICGRAPH_LOG_DIR";
const LOG_LEVEL_ENV: &str = "TOPICGRAPH_LOG_LEVEL";

fn main() -> ExitCode {
    println!("topicgraph_core version={}", core_version());
    if let Err(err) = start_logging(
        std::env::var(LOG_DIR_ENV).ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
    ) {
        eprintln!("logging disabled: {err}");
    }

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        return ExitCode::SUCCESS;
    };
    let selector = args
        .next()
        .map_or_else(TopicSelector::root, TopicSelector::UniqueKey);

    let repo = SqliteTopicRepository::open(db_path, ContentTypeCatalog::default());
    let mut graph = TopicGraph::new();
    match repo.load(&mut graph, &selector, true) {
        Ok(root) => {
            print_tree(&graph, root, 0);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("load failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Starts file logging when a directory is configured; no directory is a no-op.
fn start_logging(log_dir: Option<String>, level: Option<String>) -> Result<(), LoggingError> {
    let Some(log_dir) = log_dir.filter(|dir| !dir.trim().is_empty()) else {
        return Ok(());
    };
    let level = level.unwrap_or_else(|| default_log_level().to_string());
    init_logging(&level, &log_dir)
}

fn print_tree(graph: &TopicGraph, handle: TopicHandle, depth: usize) {
    let Some(topic) = graph.get(handle) else {
        return;
    };
    let id = if topic.is_new() {
        "new".to_string()
    } else {
        topic.id().to_string()
    };
    println!(
        "{:indent$}{} [{}] id={}",
        "",
        topic.key(),
        topic.content_type(),
        id,
        indent = depth * 2
    );
    let Ok(children) = graph.sorted_children(handle) else {
        return;
    };
    for child in children.iter() {
        print_tree(graph, child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::start_logging;
    use topicgraph_core::{logging_status, LoggingError};

    #[test]
    fn start_logging_without_directory_is_a_no_op() {
        start_logging(None, None).unwrap();
        start_logging(Some("  ".to_string()), Some("trace".to_string())).unwrap();
        assert!(logging_status().is_none());
    }

    #[test]
    fn start_logging_reports_invalid_settings() {
        assert!(matches!(
            start_logging(Some("logs".to_string()), None),
            Err(LoggingError::RelativeDirectory(_))
        ));
        let dir = std::env::temp_dir().to_str().unwrap().to_string();
        assert!(matches!(
            start_logging(Some(dir), Some("loud".to_string())),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }
}
