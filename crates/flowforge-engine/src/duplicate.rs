//! Deep workflow duplication with id remapping.
//!
//! Two passes: clone the subtree with fresh ids while recording the old to
//! new task id map, then translate every dependency edge whose endpoints
//! both live inside the copied subtree. Edges to tasks outside the source
//! workflow cannot exist, so nothing dangles. The whole copy lands in one
//! transaction.

use crate::permission::{authorize, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use flowforge_core::{
    Dependency, DuplicateWorkflow, EntityKind, ForgeError, ForgeId, Phase, PhaseTree, Principal,
    Result, Task, Workflow, WorkflowTree,
};
use std::collections::HashMap;
use tracing::info;

impl WorkflowEngine {
    /// Copy a workflow's full subtree under a new name. Scalar fields not
    /// overridden by the request carry over from the source; the copy is
    /// attributed to the calling principal with fresh timestamps.
    pub async fn duplicate_workflow(
        &self,
        principal: Option<&Principal>,
        req: DuplicateWorkflow,
    ) -> Result<WorkflowTree> {
        let principal = authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;

        let source = self
            .store
            .workflow_tree(req.source_workflow_id)
            .await?
            .ok_or_else(|| {
                ForgeError::not_found(EntityKind::Workflow, req.source_workflow_id)
            })?;
        validate::workflow_name_unique(&self.store, &req.name, None).await?;

        let workflow = Workflow::new(
            req.name,
            req.description.or_else(|| source.workflow.description.clone()),
            req.version.unwrap_or_else(|| source.workflow.version.clone()),
            req.is_active.unwrap_or(source.workflow.is_active),
            principal.user_id,
        );

        // Pass one: clone phases and tasks, recording the task id map.
        let mut task_map: HashMap<ForgeId, ForgeId> = HashMap::new();
        let mut phases = Vec::with_capacity(source.phases.len());
        for phase_tree in &source.phases {
            let phase = Phase::new(
                workflow.id,
                phase_tree.phase.name.clone(),
                phase_tree.phase.description.clone(),
                phase_tree.phase.order,
                phase_tree.phase.estimated_duration,
            );
            let mut tasks = Vec::with_capacity(phase_tree.tasks.len());
            for task in &phase_tree.tasks {
                let copy = Task::new(
                    phase.id,
                    task.name.clone(),
                    task.description.clone(),
                    task.estimated_hours,
                    task.priority,
                    task.required_skills.clone(),
                    task.form_template.clone(),
                );
                task_map.insert(task.id, copy.id);
                tasks.push(copy);
            }
            phases.push(PhaseTree { phase, tasks });
        }

        // Pass two: translate edges through the map.
        let source_edges = self
            .store
            .workflow_dependencies(req.source_workflow_id)
            .await?;
        let mut deps = Vec::with_capacity(source_edges.len());
        for edge in &source_edges {
            if let (Some(&source_id), Some(&target_id)) = (
                task_map.get(&edge.source_task_id),
                task_map.get(&edge.target_task_id),
            ) {
                deps.push(Dependency::new(source_id, target_id, edge.dependency_type));
            }
        }

        let tree = WorkflowTree { workflow, phases };
        self.store.insert_workflow_tree(&tree, &deps).await?;
        info!(
            source = %req.source_workflow_id,
            copy = %tree.workflow.id,
            phases = tree.phases.len(),
            tasks = tree.task_count(),
            edges = deps.len(),
            "workflow duplicated"
        );
        Ok(tree)
    }
}
