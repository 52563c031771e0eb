//! Task CRUD. Structural edits require the ancestor workflow to be active.

use crate::permission::{authorize, require_principal, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use chrono::Utc;
use flowforge_core::{
    CreateTask, EntityKind, ForgeError, ForgeId, Principal, Result, Task, TaskWithEdges,
    UpdateTask,
};
use tracing::info;

impl WorkflowEngine {
    pub async fn create_task(
        &self,
        principal: Option<&Principal>,
        phase_id: ForgeId,
        req: CreateTask,
    ) -> Result<Task> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        let phase = self
            .store
            .phase(phase_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, phase_id))?;
        validate::workflow_mutable(&self.store, phase.workflow_id).await?;
        validate::task_name_unique(&self.store, phase_id, &req.name, None).await?;

        let task = Task::new(
            phase_id,
            req.name,
            req.description,
            req.estimated_hours,
            req.priority,
            req.required_skills,
            req.form_template,
        );
        self.store.insert_task(&task).await?;
        info!(task = %task.id, phase = %phase_id, "task created");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
        req: UpdateTask,
    ) -> Result<Task> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        let existing = self
            .store
            .task(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Task, id))?;
        let phase = self
            .store
            .phase(existing.phase_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, existing.phase_id))?;
        validate::workflow_mutable(&self.store, phase.workflow_id).await?;
        validate::task_name_unique(&self.store, existing.phase_id, &req.name, Some(id)).await?;

        let task = Task {
            name: req.name,
            description: req.description,
            estimated_hours: req.estimated_hours,
            priority: req.priority,
            required_skills: req.required_skills,
            form_template: req.form_template,
            updated_at: Utc::now(),
            ..existing
        };
        self.store.update_task(&task).await?;
        info!(task = %task.id, "task updated");
        Ok(task)
    }

    /// Delete a single task. Refused while project-side task instances link
    /// to it, or while any dependency edge still touches it; edge-bearing
    /// tasks must go through a batch delete, which removes edges with them.
    pub async fn delete_task(&self, principal: Option<&Principal>, id: ForgeId) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        let task = self
            .store
            .task(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Task, id))?;
        validate::tasks_unreferenced(&self.store, std::slice::from_ref(&task)).await?;
        validate::task_edge_free(&self.store, id).await?;

        self.store.delete_task(id).await?;
        info!(task = %id, "task deleted");
        Ok(())
    }

    pub async fn get_task(&self, principal: Option<&Principal>, id: ForgeId) -> Result<Task> {
        require_principal(principal)?;
        self.store
            .task(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Task, id))
    }

    pub async fn list_tasks(
        &self,
        principal: Option<&Principal>,
        phase_id: ForgeId,
    ) -> Result<Vec<Task>> {
        require_principal(principal)?;
        if self.store.phase(phase_id).await?.is_none() {
            return Err(ForgeError::not_found(EntityKind::Phase, phase_id));
        }
        self.store.tasks_of_phase(phase_id).await
    }

    /// A task together with its incoming and outgoing dependency edges.
    pub async fn get_task_with_edges(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
    ) -> Result<TaskWithEdges> {
        require_principal(principal)?;
        let task = self
            .store
            .task(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Task, id))?;
        let touching = self.store.dependencies_touching(&[id]).await?;
        let (depended_on_by, depends_on): (Vec<_>, Vec<_>) = touching
            .into_iter()
            .partition(|d| d.source_task_id == id);
        Ok(TaskWithEdges {
            task,
            depends_on,
            depended_on_by,
        })
    }
}
