//! The Flowforge workflow template engine.
//!
//! Validated mutation paths over the template entities: single-entity CRUD,
//! deep duplication with id remapping, atomic batch mutation, and cycle-safe
//! dependency graph edits. Every operation receives an explicit principal,
//! runs its checks side-effect free, and then applies writes through one
//! store transaction.

pub mod graph;
pub mod permission;
pub mod validate;

mod batch;
mod dependencies;
mod duplicate;
mod phases;
mod projects;
mod tasks;
mod workflows;

pub use graph::DependencyGraph;

use flowforge_storage::SqliteStore;

/// Facade over the validated template mutation paths.
///
/// Cheap to clone; concurrent requests share the underlying pool. The engine
/// takes no in-process locks — cross-record consistency is delegated to the
/// store's transactions.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    store: SqliteStore,
}

impl WorkflowEngine {
    /// Create an engine over an opened store.
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }
}
