//! Persistence for SQL change tasks and their statement records.
//!
//! Two backends implement [`TaskStore`]: [`InMemoryStore`] for tests and local
//! runs, and [`SqliteStore`] for durable storage.

pub mod sqlite_store;
pub mod store;

pub use sqlite_store::SqliteStore;
pub use store::{AuditSummary, InMemoryStore, StoreError, TaskPatch, TaskStore};
