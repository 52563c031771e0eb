//! Constraint validator: scoped structural checks run before any write.
//!
//! Every check is side-effect free and returns the specific failure kind
//! from the error taxonomy, with the offending ids or names attached.

use flowforge_core::{
    EntityKind, ForgeError, ForgeId, Phase, PhaseOrder, Result, Task, Workflow,
};
use flowforge_storage::SqliteStore;
use std::collections::HashSet;

/// Workflow names are unique across all workflows, case sensitive.
pub async fn workflow_name_unique(
    store: &SqliteStore,
    name: &str,
    exclude: Option<ForgeId>,
) -> Result<()> {
    if let Some(existing) = store.workflow_by_name(name).await? {
        if Some(existing.id) != exclude {
            return Err(ForgeError::duplicate_name(EntityKind::Workflow, name));
        }
    }
    Ok(())
}

/// Phase names are unique within their owning workflow.
pub async fn phase_name_unique(
    store: &SqliteStore,
    workflow_id: ForgeId,
    name: &str,
    exclude: Option<ForgeId>,
) -> Result<()> {
    if let Some(existing) = store.phase_by_name(workflow_id, name).await? {
        if Some(existing.id) != exclude {
            return Err(ForgeError::duplicate_name(EntityKind::Phase, name));
        }
    }
    Ok(())
}

/// Task names are unique within their owning phase.
pub async fn task_name_unique(
    store: &SqliteStore,
    phase_id: ForgeId,
    name: &str,
    exclude: Option<ForgeId>,
) -> Result<()> {
    if let Some(existing) = store.task_by_name(phase_id, name).await? {
        if Some(existing.id) != exclude {
            return Err(ForgeError::duplicate_name(EntityKind::Task, name));
        }
    }
    Ok(())
}

/// The workflow must exist and be active for structural phase/task edits.
/// Edits to the workflow record itself do not go through this check.
pub async fn workflow_mutable(store: &SqliteStore, workflow_id: ForgeId) -> Result<Workflow> {
    let workflow = store
        .workflow(workflow_id)
        .await?
        .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, workflow_id))?;
    if !workflow.is_active {
        return Err(ForgeError::InactiveWorkflow { workflow_id });
    }
    Ok(workflow)
}

/// No workflow in the set may be referenced by live (active/on-hold)
/// project instances.
pub async fn workflows_unreferenced(store: &SqliteStore, workflows: &[Workflow]) -> Result<()> {
    let mut blocked = Vec::new();
    for workflow in workflows {
        if store.live_project_count(workflow.id).await? > 0 {
            blocked.push(workflow.id);
        }
    }
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(ForgeError::live_references(EntityKind::Workflow, blocked))
    }
}

/// No phase in the set may have linked project-phase instances.
pub async fn phases_unreferenced(store: &SqliteStore, phases: &[Phase]) -> Result<()> {
    let mut blocked = Vec::new();
    for phase in phases {
        if store.project_phase_count(phase.id).await? > 0 {
            blocked.push(phase.id);
        }
    }
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(ForgeError::live_references(EntityKind::Phase, blocked))
    }
}

/// No task in the set may have linked project-task instances.
pub async fn tasks_unreferenced(store: &SqliteStore, tasks: &[Task]) -> Result<()> {
    let mut blocked = Vec::new();
    for task in tasks {
        if store.project_task_count(task.id).await? > 0 {
            blocked.push(task.id);
        }
    }
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(ForgeError::live_references(EntityKind::Task, blocked))
    }
}

/// A task with dependency edges (incoming or outgoing) may not be deleted
/// on its own; the edges must be removed first or the delete batched.
pub async fn task_edge_free(store: &SqliteStore, task_id: ForgeId) -> Result<()> {
    if store.task_edge_count(task_id).await? > 0 {
        return Err(ForgeError::live_references(
            EntityKind::Dependency,
            vec![task_id],
        ));
    }
    Ok(())
}

/// Validate a full reorder set: orders unique, none beyond the current
/// phase count.
pub fn order_within_bounds(proposed: &[PhaseOrder], phase_count: usize) -> Result<()> {
    let mut seen = HashSet::new();
    for assignment in proposed {
        if assignment.order as usize > phase_count {
            return Err(ForgeError::OrderOutOfRange {
                order: assignment.order,
                count: phase_count as u32,
            });
        }
        if !seen.insert(assignment.order) {
            return Err(ForgeError::DuplicateOrder {
                order: assignment.order,
            });
        }
    }
    Ok(())
}

/// Every requested id must have resolved; otherwise list the missing ones.
pub fn ensure_all_found(
    kind: EntityKind,
    requested: &[ForgeId],
    found: &HashSet<ForgeId>,
) -> Result<()> {
    let missing: Vec<ForgeId> = requested
        .iter()
        .filter(|id| !found.contains(id))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ForgeError::not_found_all(kind, missing))
    }
}
