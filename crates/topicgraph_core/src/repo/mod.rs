//! Topic repository: load, save, move, delete and rollback over a store.
//!
//! # Responsibility
//! - Rebuild graph topics from store row-sets (`loader`).
//! - Turn dirty topic state into store payloads (`payload`).
//! - Orchestrate one store session per call (`topic_repo`).
//!
//! # Invariants
//! - The in-memory graph only reflects a save after the store commits.
//! - Structural edits made ahead of a failed store call are undone.
//! - Store failures carry operation and key/id context.

pub mod loader;
pub(crate) mod payload;
pub mod topic_repo;
