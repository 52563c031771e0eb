//! Atomic batch mutation.
//!
//! Every batch is all-or-nothing: the full item set is validated and
//! constraint-checked first, then applied through a single store
//! transaction. A failure on any item rejects the whole batch with no
//! partial writes.

use crate::permission::{authorize, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use chrono::Utc;
use flowforge_core::{
    validate_batch, validate_batch_ids, EntityKind, ForgeError, ForgeId, Phase, PhaseBatchItem,
    Principal, ReorderPhases, Result, Task, TaskBatchItem, Workflow, WorkflowBatchItem,
};
use std::collections::{HashMap, HashSet};
use tracing::info;

impl WorkflowEngine {
    pub async fn batch_update_workflows(
        &self,
        principal: Option<&Principal>,
        items: Vec<WorkflowBatchItem>,
    ) -> Result<Vec<Workflow>> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch(&items, WorkflowBatchItem::validate)?;
        let ids: Vec<ForgeId> = items.iter().map(|i| i.id).collect();
        validate_batch_ids(&ids)?;

        let loaded = self.store.workflows_by_ids(&ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|w| w.id).collect();
        validate::ensure_all_found(EntityKind::Workflow, &ids, &found)?;
        validate::workflows_unreferenced(&self.store, &loaded).await?;

        let mut names = HashSet::new();
        for item in &items {
            if !names.insert(item.name.as_str()) {
                return Err(ForgeError::duplicate_name(EntityKind::Workflow, &item.name));
            }
        }
        let name_list: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let taken = self.store.workflows_named(&name_list, &ids).await?;
        if let Some(holder) = taken.first() {
            return Err(ForgeError::duplicate_name(EntityKind::Workflow, &holder.name));
        }

        let by_id: HashMap<ForgeId, Workflow> =
            loaded.into_iter().map(|w| (w.id, w)).collect();
        let now = Utc::now();
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            let existing = by_id
                .get(&item.id)
                .ok_or_else(|| ForgeError::not_found(EntityKind::Workflow, item.id))?;
            updated.push(Workflow {
                name: item.name,
                description: item.description,
                version: item.version,
                is_active: item.is_active,
                updated_at: now,
                ..existing.clone()
            });
        }
        self.store.update_workflows_bulk(&updated).await?;
        info!(count = updated.len(), "workflows batch updated");
        Ok(updated)
    }

    pub async fn batch_delete_workflows(
        &self,
        principal: Option<&Principal>,
        ids: &[ForgeId],
    ) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch_ids(ids)?;

        let loaded = self.store.workflows_by_ids(ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|w| w.id).collect();
        validate::ensure_all_found(EntityKind::Workflow, ids, &found)?;
        validate::workflows_unreferenced(&self.store, &loaded).await?;

        self.store.delete_workflows_cascade(ids).await?;
        info!(count = ids.len(), "workflows batch deleted");
        Ok(())
    }

    pub async fn batch_update_phases(
        &self,
        principal: Option<&Principal>,
        items: Vec<PhaseBatchItem>,
    ) -> Result<Vec<Phase>> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch(&items, PhaseBatchItem::validate)?;
        let ids: Vec<ForgeId> = items.iter().map(|i| i.id).collect();
        validate_batch_ids(&ids)?;

        let loaded = self.store.phases_by_ids(&ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|p| p.id).collect();
        validate::ensure_all_found(EntityKind::Phase, &ids, &found)?;
        validate::phases_unreferenced(&self.store, &loaded).await?;

        let by_id: HashMap<ForgeId, Phase> = loaded.into_iter().map(|p| (p.id, p)).collect();
        let mut workflow_ids: Vec<ForgeId> = by_id.values().map(|p| p.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        for workflow_id in &workflow_ids {
            validate::workflow_mutable(&self.store, *workflow_id).await?;
        }

        // Name and order collisions, both within the batch and against
        // untouched sibling phases.
        let batch_ids: HashSet<ForgeId> = ids.iter().copied().collect();
        let mut names: HashSet<(ForgeId, &str)> = HashSet::new();
        let mut orders: HashSet<(ForgeId, u32)> = HashSet::new();
        for item in &items {
            let workflow_id = by_id
                .get(&item.id)
                .map(|p| p.workflow_id)
                .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, item.id))?;
            if !names.insert((workflow_id, item.name.as_str())) {
                return Err(ForgeError::duplicate_name(EntityKind::Phase, &item.name));
            }
            if !orders.insert((workflow_id, item.order)) {
                return Err(ForgeError::DuplicateOrder { order: item.order });
            }
            if let Some(holder) = self.store.phase_by_name(workflow_id, &item.name).await? {
                if !batch_ids.contains(&holder.id) {
                    return Err(ForgeError::duplicate_name(EntityKind::Phase, &item.name));
                }
            }
        }
        for workflow_id in &workflow_ids {
            for sibling in self.store.phases_of_workflow(*workflow_id).await? {
                if !batch_ids.contains(&sibling.id)
                    && orders.contains(&(*workflow_id, sibling.order))
                {
                    return Err(ForgeError::DuplicateOrder {
                        order: sibling.order,
                    });
                }
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            let existing = by_id
                .get(&item.id)
                .ok_or_else(|| ForgeError::not_found(EntityKind::Phase, item.id))?;
            updated.push(Phase {
                name: item.name,
                description: item.description,
                order: item.order,
                estimated_duration: item.estimated_duration,
                updated_at: now,
                ..existing.clone()
            });
        }
        self.store.update_phases_bulk(&updated).await?;
        info!(count = updated.len(), "phases batch updated");
        Ok(updated)
    }

    pub async fn batch_delete_phases(
        &self,
        principal: Option<&Principal>,
        ids: &[ForgeId],
    ) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch_ids(ids)?;

        let loaded = self.store.phases_by_ids(ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|p| p.id).collect();
        validate::ensure_all_found(EntityKind::Phase, ids, &found)?;
        validate::phases_unreferenced(&self.store, &loaded).await?;

        // Batch phase deletion is a structural edit like batch update, so
        // inactive workflows reject it.
        let mut workflow_ids: Vec<ForgeId> = loaded.iter().map(|p| p.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        for workflow_id in workflow_ids {
            validate::workflow_mutable(&self.store, workflow_id).await?;
        }

        self.store.delete_phases_cascade(ids).await?;
        info!(count = ids.len(), "phases batch deleted");
        Ok(())
    }

    pub async fn batch_update_tasks(
        &self,
        principal: Option<&Principal>,
        items: Vec<TaskBatchItem>,
    ) -> Result<Vec<Task>> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch(&items, TaskBatchItem::validate)?;
        let ids: Vec<ForgeId> = items.iter().map(|i| i.id).collect();
        validate_batch_ids(&ids)?;

        let loaded = self.store.tasks_by_ids(&ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|t| t.id).collect();
        validate::ensure_all_found(EntityKind::Task, &ids, &found)?;
        validate::tasks_unreferenced(&self.store, &loaded).await?;

        let by_id: HashMap<ForgeId, Task> = loaded.into_iter().map(|t| (t.id, t)).collect();
        let mut phase_ids: Vec<ForgeId> = by_id.values().map(|t| t.phase_id).collect();
        phase_ids.sort_unstable();
        phase_ids.dedup();
        let phases = self.store.phases_by_ids(&phase_ids).await?;
        let phases_found: HashSet<ForgeId> = phases.iter().map(|p| p.id).collect();
        validate::ensure_all_found(EntityKind::Phase, &phase_ids, &phases_found)?;
        let mut workflow_ids: Vec<ForgeId> = phases.iter().map(|p| p.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        let mut workflows = Vec::with_capacity(workflow_ids.len());
        for workflow_id in workflow_ids {
            workflows.push(validate::workflow_mutable(&self.store, workflow_id).await?);
        }
        validate::workflows_unreferenced(&self.store, &workflows).await?;

        let batch_ids: HashSet<ForgeId> = ids.iter().copied().collect();
        let mut names: HashSet<(ForgeId, &str)> = HashSet::new();
        for item in &items {
            let phase_id = by_id
                .get(&item.id)
                .map(|t| t.phase_id)
                .ok_or_else(|| ForgeError::not_found(EntityKind::Task, item.id))?;
            if !names.insert((phase_id, item.name.as_str())) {
                return Err(ForgeError::duplicate_name(EntityKind::Task, &item.name));
            }
            if let Some(holder) = self.store.task_by_name(phase_id, &item.name).await? {
                if !batch_ids.contains(&holder.id) {
                    return Err(ForgeError::duplicate_name(EntityKind::Task, &item.name));
                }
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            let existing = by_id
                .get(&item.id)
                .ok_or_else(|| ForgeError::not_found(EntityKind::Task, item.id))?;
            updated.push(Task {
                name: item.name,
                description: item.description,
                estimated_hours: item.estimated_hours,
                priority: item.priority,
                required_skills: item.required_skills,
                form_template: item.form_template,
                updated_at: now,
                ..existing.clone()
            });
        }
        self.store.update_tasks_bulk(&updated).await?;
        info!(count = updated.len(), "tasks batch updated");
        Ok(updated)
    }

    /// Delete tasks in bulk. Dependency edges touching the batch are removed
    /// with it, so edge-bearing tasks that cannot be deleted singly go
    /// through here.
    pub async fn batch_delete_tasks(
        &self,
        principal: Option<&Principal>,
        ids: &[ForgeId],
    ) -> Result<()> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch_ids(ids)?;

        let loaded = self.store.tasks_by_ids(ids).await?;
        let found: HashSet<ForgeId> = loaded.iter().map(|t| t.id).collect();
        validate::ensure_all_found(EntityKind::Task, ids, &found)?;
        validate::tasks_unreferenced(&self.store, &loaded).await?;

        // Live projects on an ancestor workflow block task mutation even
        // when no project-task row points at the batch directly.
        let mut phase_ids: Vec<ForgeId> = loaded.iter().map(|t| t.phase_id).collect();
        phase_ids.sort_unstable();
        phase_ids.dedup();
        let phases = self.store.phases_by_ids(&phase_ids).await?;
        let mut workflow_ids: Vec<ForgeId> = phases.iter().map(|p| p.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        let workflows = self.store.workflows_by_ids(&workflow_ids).await?;
        validate::workflows_unreferenced(&self.store, &workflows).await?;

        self.store.delete_tasks_cascade(ids).await?;
        info!(count = ids.len(), "tasks batch deleted");
        Ok(())
    }

    /// Reassign phase orders within one workflow. Orders in the final state
    /// (requested assignments plus untouched phases) must be unique and no
    /// greater than the workflow's phase count.
    pub async fn reorder_phases(
        &self,
        principal: Option<&Principal>,
        req: ReorderPhases,
    ) -> Result<Vec<Phase>> {
        authorize(principal, MUTATOR_ROLES)?;
        req.validate()?;
        let ids: Vec<ForgeId> = req.phases.iter().map(|p| p.id).collect();
        validate_batch_ids(&ids)?;

        let workflow = validate::workflow_mutable(&self.store, req.workflow_id).await?;
        validate::workflows_unreferenced(&self.store, std::slice::from_ref(&workflow)).await?;

        let existing = self.store.phases_of_workflow(req.workflow_id).await?;
        let known: HashSet<ForgeId> = existing.iter().map(|p| p.id).collect();
        validate::ensure_all_found(EntityKind::Phase, &ids, &known)?;
        validate::order_within_bounds(&req.phases, existing.len())?;

        let assigned: HashMap<ForgeId, u32> =
            req.phases.iter().map(|p| (p.id, p.order)).collect();
        let mut final_orders = HashSet::new();
        for phase in &existing {
            let order = assigned.get(&phase.id).copied().unwrap_or(phase.order);
            if !final_orders.insert(order) {
                return Err(ForgeError::DuplicateOrder { order });
            }
        }

        let assignments: Vec<(ForgeId, u32)> =
            req.phases.iter().map(|p| (p.id, p.order)).collect();
        self.store.apply_phase_orders(&assignments).await?;
        info!(
            workflow = %req.workflow_id,
            count = assignments.len(),
            "phases reordered"
        );
        self.store.phases_of_workflow(req.workflow_id).await
    }
}
