//! SQLite topic store: bootstrap, schema and named routines.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the topic store.
//! - Apply schema migrations in deterministic order.
//! - Expose the named store routines behind the `TopicStore` seam.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No routine reads or writes topic data before migrations succeed.
//! - Every store session runs in exactly one transaction.

use crate::model::topic::TopicId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod routines;
pub mod rows;

pub use open::{open_db, open_db_in_memory};
pub use routines::{
    CreateTopicParams, SqliteRoutines, SqliteTopicStore, StoreOperation, StoreOptions,
    TopicRoutines, TopicStore, UpdateTopicParams,
};
pub use rows::{AttributeRow, BlobRow, RelationshipRow, TopicRow, TopicRowSets, VersionRow};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A routine addressed a topic id the store does not hold.
    NotFound(TopicId),
    /// Routine input or stored data cannot be interpreted.
    InvalidData(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::NotFound(id) => write!(f, "topic {id} does not exist in the store"),
            Self::InvalidData(message) => write!(f, "invalid topic data: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::NotFound(_) | Self::InvalidData(_) => {
                None
            }
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
