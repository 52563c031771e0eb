//! Error types for the Flowforge engine.

use crate::id::ForgeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for Flowforge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workflow,
    Phase,
    Task,
    Dependency,
    Project,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Workflow => "workflow",
            EntityKind::Phase => "phase",
            EntityKind::Task => "task",
            EntityKind::Dependency => "dependency",
            EntityKind::Project => "project",
        };
        write!(f, "{s}")
    }
}

/// Main error type for the Flowforge engine.
///
/// Every validation failure carries enough detail (offending ids or names)
/// for the caller to report precisely. `Transaction` is the only kind that
/// can occur after writes have begun; the store rolls the whole transaction
/// back before surfacing it.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// No authenticated principal was supplied
    #[error("unauthorized: no authenticated principal")]
    Unauthorized,

    /// The principal's role is not in the required set
    #[error("insufficient permissions: role {role} may not perform this operation")]
    InsufficientPermissions { role: String },

    /// One or more referenced entities do not exist
    #[error("{kind} not found: {}", display_ids(.ids))]
    NotFound { kind: EntityKind, ids: Vec<ForgeId> },

    /// A sibling with the same name already exists in the scope
    #[error("duplicate {kind} name: {name:?}")]
    DuplicateName { kind: EntityKind, name: String },

    /// Structural edit attempted on an inactive workflow
    #[error("workflow {workflow_id} is inactive")]
    InactiveWorkflow { workflow_id: ForgeId },

    /// Mutation blocked by live project-side records
    #[error("{kind} blocked by live project references: {}", display_ids(.ids))]
    HasLiveReferences { kind: EntityKind, ids: Vec<ForgeId> },

    /// The requested graph edit would create a cycle
    #[error("circular dependency through tasks: {}", display_ids(.cycle))]
    CircularDependency { cycle: Vec<ForgeId> },

    /// The exact (source, target) edge already exists
    #[error("dependency {source_task_id} -> {target_task_id} already exists")]
    DuplicateEdge {
        source_task_id: ForgeId,
        target_task_id: ForgeId,
    },

    /// A proposed phase order exceeds the workflow's phase count
    #[error("phase order {order} exceeds phase count {count}")]
    OrderOutOfRange { order: u32, count: u32 },

    /// Two proposed phase orders collide
    #[error("duplicate phase order {order}")]
    DuplicateOrder { order: u32 },

    /// Malformed input shape or out-of-range value
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage read or row-mapping failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Underlying store failure during a write; the transaction was rolled back
    #[error("transaction failure: {0}")]
    Transaction(String),
}

fn display_ids(ids: &[ForgeId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ForgeError {
    /// Create a not-found error for a single entity
    pub fn not_found(kind: EntityKind, id: ForgeId) -> Self {
        Self::NotFound { kind, ids: vec![id] }
    }

    /// Create a not-found error listing every missing id
    pub fn not_found_all(kind: EntityKind, ids: Vec<ForgeId>) -> Self {
        Self::NotFound { kind, ids }
    }

    /// Create a duplicate-name error
    pub fn duplicate_name(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Create a live-reference error
    pub fn live_references(kind: EntityKind, ids: Vec<ForgeId>) -> Self {
        Self::HasLiveReferences { kind, ids }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a transaction error
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a circular-dependency error
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_ids() {
        let a = ForgeId::new();
        let b = ForgeId::new();
        let err = ForgeError::not_found_all(EntityKind::Task, vec![a, b]);
        let msg = err.to_string();
        assert!(msg.contains("task not found"));
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
    }

    #[test]
    fn test_duplicate_edge_display() {
        let a = ForgeId::new();
        let b = ForgeId::new();
        let err = ForgeError::DuplicateEdge {
            source_task_id: a,
            target_task_id: b,
        };
        assert_eq!(
            err.to_string(),
            format!("dependency {a} -> {b} already exists")
        );
    }

    #[test]
    fn test_duplicate_name_display() {
        let err = ForgeError::duplicate_name(EntityKind::Workflow, "Standard Wrap");
        assert_eq!(err.to_string(), "duplicate workflow name: \"Standard Wrap\"");
    }
}
