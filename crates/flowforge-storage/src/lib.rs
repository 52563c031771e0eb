//! SQLite persistence for the Flowforge workflow template engine.
//!
//! Provides the [`SqliteStore`]: schema bootstrap, typed reads, and
//! transactional multi-statement writes for the template entities and the
//! project-side records that drive live-reference constraints.

pub mod schema;
pub mod store;

pub use store::SqliteStore;
