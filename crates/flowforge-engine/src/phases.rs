//! Phase CRUD. Structural edits require the owning workflow to be active.

use crate::permission::{authorize, require_principal, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use chrono::Utc;
use flowforge_core::{
    CreatePhase, EntityKind, ForgeError, ForgeId, Phase, Principal, Result, UpdatePhase,
};
use tracing::info;

impl WorkflowEngine {
    pub async fn create_phase(
        &self,
        principal: Option<&Principal>,
        workflow_id: ForgeId,
        req: CreatePhase,
    ) -> Result<Phase> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        validate::workflow_mutable(&self.store, workflow_id).await?;
        validate::phase_name_unique(&self.store, workflow_id, &req.name, None).await?;
        self.check_order_free(workflow_id, req.order, None).await?;

        let phase = Phase::new(
            workflow_id,
            req.name,
            req.description,
            req.order,
            req.estimated_duration,
        );
        self.store.insert_phase(&phase).await?;
        info!(phase = %phase.id, workflow = %workflow_id, "phase created");
        Ok(phase)
    }

    pub async fn update_phase(
        &self,
        principal: Option<&Principal>,
        id: ForgeId,
        req: UpdatePhase,
    ) -> Result<Phase> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        let existing = self
            .store
            .phase(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, id))?;
        validate::workflow_mutable(&self.store, existing.workflow_id).await?;
        validate::phase_name_unique(&self.store, existing.workflow_id, &req.name, Some(id))
            .await?;
        self.check_order_free(existing.workflow_id, req.order, Some(id))
            .await?;

        let phase = Phase {
            name: req.name,
            description: req.description,
            order: req.order,
            estimated_duration: req.estimated_duration,
            updated_at: Utc::now(),
            ..existing
        };
        self.store.update_phase(&phase).await?;
        info!(phase = %phase.id, "phase updated");
        Ok(phase)
    }

    /// Delete a phase with its tasks and any edges touching them. Refused
    /// while project-side phase instances link to it.
    pub async fn delete_phase(&self, principal: Option<&Principal>, id: ForgeId) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        let phase = self
            .store
            .phase(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, id))?;
        validate::phases_unreferenced(&self.store, std::slice::from_ref(&phase)).await?;

        self.store.delete_phases_cascade(&[id]).await?;
        info!(phase = %id, "phase deleted");
        Ok(())
    }

    pub async fn get_phase(&self, principal: Option<&Principal>, id: ForgeId) -> Result<Phase> {
        require_principal(principal)?;
        self.store
            .phase(id)
            .await?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, id))
    }

    pub async fn list_phases(
        &self,
        principal: Option<&Principal>,
        workflow_id: ForgeId,
    ) -> Result<Vec<Phase>> {
        require_principal(principal)?;
        if self.store.workflow(workflow_id).await?.is_none() {
            return Err(ForgeError::not_found(EntityKind::Workflow, workflow_id));
        }
        self.store.phases_of_workflow(workflow_id).await
    }

    /// No sibling phase may already hold `order` (other than `exclude`).
    async fn check_order_free(
        &self,
        workflow_id: ForgeId,
        order: u32,
        exclude: Option<ForgeId>,
    ) -> Result<()> {
        let siblings = self.store.phases_of_workflow(workflow_id).await?;
        for sibling in &siblings {
            if sibling.order == order && Some(sibling.id) != exclude {
                return Err(ForgeError::DuplicateOrder { order });
            }
        }
        Ok(())
    }
}
