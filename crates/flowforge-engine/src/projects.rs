//! Project instantiation records.
//!
//! Projects are instances of a workflow template. Only the pieces the
//! template engine needs are modeled here: registering a project and
//! linking phase/task instances, so live-reference constraints have real
//! rows to check against.

use crate::permission::{authorize, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use flowforge_core::{
    EntityKind, ForgeError, ForgeId, Principal, Project, ProjectPhase, ProjectStatus,
    ProjectTask, Result,
};
use tracing::info;

impl WorkflowEngine {
    /// Register a project against an active workflow template.
    pub async fn register_project(
        &self,
        principal: Option<&Principal>,
        workflow_id: ForgeId,
        name: String,
        status: ProjectStatus,
    ) -> Result<Project> {
        authorize(principal, MUTATOR_ROLES)?;
        if name.trim().is_empty() {
            return Err(ForgeError::validation("project name must not be empty"));
        }
        validate::workflow_mutable(&self.store, workflow_id).await?;

        let project = Project::new(workflow_id, name, status);
        self.store.insert_project(&project).await?;
        info!(project = %project.id, workflow = %workflow_id, "project registered");
        Ok(project)
    }

    pub async fn set_project_status(
        &self,
        principal: Option<&Principal>,
        project_id: ForgeId,
        status: ProjectStatus,
    ) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        if self.store.project(project_id).await?.is_none() {
            return Err(ForgeError::not_found(EntityKind::Project, project_id));
        }
        self.store.update_project_status(project_id, status).await?;
        info!(project = %project_id, status = %status.as_str(), "project status changed");
        Ok(())
    }

    /// Link a project-side phase instance to its template phase. The phase
    /// must belong to the project's source workflow.
    pub async fn link_project_phase(
        &self,
        principal: Option<&Principal>,
        project_id: ForgeId,
        phase_id: ForgeId,
    ) -> Result<ProjectPhase> {
        authorize(principal, MUTATOR_ROLES)?;
        let project = self.project_record(project_id).await?;
        let phase = self
            .store
            .phase(phase_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, phase_id))?;
        if phase.workflow_id != project.workflow_id {
            return Err(ForgeError::validation(
                "phase does not belong to the project's workflow",
            ));
        }

        let link = ProjectPhase {
            id: ForgeId::new(),
            project_id,
            phase_id,
        };
        self.store.insert_project_phase(&link).await?;
        Ok(link)
    }

    /// Link a project-side task instance to its template task.
    pub async fn link_project_task(
        &self,
        principal: Option<&Principal>,
        project_id: ForgeId,
        task_id: ForgeId,
    ) -> Result<ProjectTask> {
        authorize(principal, MUTATOR_ROLES)?;
        self.project_record(project_id).await?;
        if self.store.task(task_id).await?.is_none() {
            return Err(ForgeError::not_found(EntityKind::Task, task_id));
        }

        let link = ProjectTask {
            id: ForgeId::new(),
            project_id,
            task_id,
        };
        self.store.insert_project_task(&link).await?;
        Ok(link)
    }

    async fn project_record(&self, project_id: ForgeId) -> Result<Project> {
        self.store
            .project(project_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Project, project_id))
    }
}
