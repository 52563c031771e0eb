//! Workflow CRUD.

use crate::permission::{authorize, require_principal, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use chrono::Utc;
use flowforge_core::{
    CreateWorkflow, EntityKind, ForgeError, ForgeId, Principal, Result, UpdateWorkflow, Workflow,
    WorkflowTree,
};
use tracing::info;

impl WorkflowEngine {
    pub async fn create_workflow(
        &self,
        principal: Option<&Principal>,
        req: CreateWorkflow,
    ) -> Result<Workflow> {
        let principal = authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        validate::workflow_name_unique(&self.store, &req.name, None).await?;

        let workflow = Workflow::new(
            req.name,
            req.description,
            req.version,
            req.is_active,
            principal.user_id,
        );
        self.store.insert_workflow(&workflow).await?;
        info!(workflow = %workflow.id, name = %workflow.name, "workflow created");
        Ok(workflow)
    }

    /// Update the workflow record itself. Unlike phase and task edits this is
    /// allowed on an inactive workflow, so templates can be renamed or
    /// reactivated after retirement.
    pub async fn update_workflow(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
        req: UpdateWorkflow,
    ) -> Result<Workflow> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        let existing = self
            .store
            .workflow(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, id))?;
        validate::workflow_name_unique(&self.store, &req.name, Some(id)).await?;

        let workflow = Workflow {
            name: req.name,
            description: req.description,
            version: req.version,
            is_active: req.is_active,
            updated_at: Utc::now(),
            ..existing
        };
        self.store.update_workflow(&workflow).await?;
        info!(workflow = %workflow.id, "workflow updated");
        Ok(workflow)
    }

    /// Delete a workflow and its whole subtree, including dependency edges.
    /// Refused while any live project references it.
    pub async fn delete_workflow(&self, principal: Option<&Principal>, id: ForgeId) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        let workflow = self
            .store
            .workflow(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, id))?;
        validate::workflows_unreferenced(&self.store, std::slice::from_ref(&workflow)).await?;

        self.store.delete_workflows_cascade(&[id]).await?;
        info!(workflow = %id, "workflow deleted");
        Ok(())
    }

    pub async fn get_workflow(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
    ) -> Result<Workflow> {
        require_principal(principal)?;
        self.store
            .workflow(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, id))
    }

    pub async fn get_workflow_tree(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
    ) -> Result<WorkflowTree> {
        require_principal(principal)?;
        self.store
            .workflow_tree(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, id))
    }

    pub async fn list_workflows(&self, principal: Option<&Principal>) -> Result<Vec<Workflow>> {
        require_principal(principal)?;
        self.store.list_workflows().await
    }
}
