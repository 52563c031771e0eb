//! Dependency edge operations.
//!
//! Every mutation runs cycle detection over the candidate edge set before
//! anything is written, so a rejected request leaves the graph untouched.

use crate::graph::DependencyGraph;
use crate::permission::{authorize, require_principal, MUTATOR_ROLES};
use crate::validate;
use crate::WorkflowEngine;
use flowforge_core::{
    validate_batch, Dependency, EntityKind, ForgeError, ForgeId, NewDependency, Principal, Result,
    Task,
};
use std::collections::HashSet;
use tracing::info;

impl WorkflowEngine {
    /// Insert one dependency edge after the full pre-write check sequence:
    /// endpoints exist and share a workflow, the workflow is active and not
    /// referenced by live projects, the edge is not a duplicate, and adding
    /// it closes no cycle.
    pub async fn add_dependency(
        &self,
        principal: Option<&Principal>,
        req: NewDependency,
    ) -> Result<Dependency> {
        authorize(principal, MUTATOR_ROLES)?;
        if req.source_task_id == req.target_task_id {
            return Err(ForgeError::CircularDependency {
                cycle: vec![req.source_task_id],
            });
        }

        let endpoints = [req.source_task_id, req.target_task_id];
        let tasks = self.store.tasks_by_ids(&endpoints).await?;
        let found: HashSet<ForgeId> = tasks.iter().map(|t| t.id).collect();
        validate::ensure_all_found(EntityKind::Task, &endpoints, &found)?;

        let workflow_id = self.common_workflow(&tasks).await?;
        let workflow = validate::workflow_mutable(&self.store, workflow_id).await?;
        validate::workflows_unreferenced(&self.store, std::slice::from_ref(&workflow)).await?;

        if self
            .store
            .dependency_exists(req.source_task_id, req.target_task_id)
            .await?
        {
            return Err(ForgeError::DuplicateEdge {
                source_task_id: req.source_task_id,
                target_task_id: req.target_task_id,
            });
        }

        let existing = self.store.workflow_dependencies(workflow_id).await?;
        let mut graph = DependencyGraph::from_edges(
            existing.iter().map(|d| (d.source_task_id, d.target_task_id)),
        );
        graph.add_edge(req.source_task_id, req.target_task_id);
        if let Some(cycle) = graph.find_cycle_from(req.source_task_id) {
            return Err(ForgeError::CircularDependency { cycle });
        }

        let dep = Dependency::new(req.source_task_id, req.target_task_id, req.dependency_type);
        self.store.insert_dependency(&dep).await?;
        info!(
            source = %dep.source_task_id,
            target = %dep.target_task_id,
            kind = %dep.dependency_type,
            "dependency added"
        );
        Ok(dep)
    }

    /// Atomically replace every edge touching the tasks named by `edges`
    /// with exactly `edges`. Edges between untouched tasks survive. The new
    /// set is checked as a whole: no self-loops, no repeated pairs, and no
    /// cycle through either the new edges or the surviving ones.
    pub async fn replace_dependencies(
        &self,
        principal: Option<&Principal>,
        edges: Vec<NewDependency>,
    ) -> Result<Vec<Dependency>> {
        authorize(principal, MUTATOR_ROLES)?;
        validate_batch(&edges, |edge| {
            if edge.source_task_id == edge.target_task_id {
                return Err(ForgeError::CircularDependency {
                    cycle: vec![edge.source_task_id],
                });
            }
            Ok(())
        })?;
        let mut pairs = HashSet::new();
        for edge in &edges {
            if !pairs.insert((edge.source_task_id, edge.target_task_id)) {
                return Err(ForgeError::DuplicateEdge {
                    source_task_id: edge.source_task_id,
                    target_task_id: edge.target_task_id,
                });
            }
        }

        let mut scope: Vec<ForgeId> = edges
            .iter()
            .flat_map(|e| [e.source_task_id, e.target_task_id])
            .collect();
        scope.sort_unstable();
        scope.dedup();

        let tasks = self.store.tasks_by_ids(&scope).await?;
        let found: HashSet<ForgeId> = tasks.iter().map(|t| t.id).collect();
        validate::ensure_all_found(EntityKind::Task, &scope, &found)?;

        let workflow_id = self.common_workflow(&tasks).await?;
        let workflow = validate::workflow_mutable(&self.store, workflow_id).await?;
        validate::workflows_unreferenced(&self.store, std::slice::from_ref(&workflow)).await?;

        // Candidate set: the new edges plus existing edges not touching the
        // scope, which the replacement leaves in place.
        let scope_set: HashSet<ForgeId> = scope.iter().copied().collect();
        let existing = self.store.workflow_dependencies(workflow_id).await?;
        let surviving = existing.iter().filter(|d| {
            !scope_set.contains(&d.source_task_id) && !scope_set.contains(&d.target_task_id)
        });
        let graph = DependencyGraph::from_edges(
            edges
                .iter()
                .map(|e| (e.source_task_id, e.target_task_id))
                .chain(surviving.map(|d| (d.source_task_id, d.target_task_id))),
        );
        if let Some(cycle) = graph.first_cycle() {
            return Err(ForgeError::CircularDependency { cycle });
        }

        let deps: Vec<Dependency> = edges
            .iter()
            .map(|e| Dependency::new(e.source_task_id, e.target_task_id, e.dependency_type))
            .collect();
        self.store.replace_dependencies(&scope, &deps).await?;
        info!(
            workflow = %workflow_id,
            tasks = scope.len(),
            edges = deps.len(),
            "dependencies replaced"
        );
        Ok(deps)
    }

    /// All edges between tasks of one workflow.
    pub async fn list_dependencies(
        &self,
        principal: Option<&Principal>,
        workflow_id: ForgeId,
    ) -> Result<Vec<Dependency>> {
        require_principal(principal)?;
        if self.store.workflow(workflow_id).await?.is_none() {
            return Err(ForgeError::not_found(EntityKind::Workflow, workflow_id));
        }
        self.store.workflow_dependencies(workflow_id).await
    }

    /// Resolve the single workflow the given tasks belong to. Edges may not
    /// span workflows.
    async fn common_workflow(&self, tasks: &[Task]) -> Result<ForgeId> {
        let mut phase_ids: Vec<ForgeId> = tasks.iter().map(|t| t.phase_id).collect();
        phase_ids.sort_unstable();
        phase_ids.dedup();
        let phases = self.store.phases_by_ids(&phase_ids).await?;
        let found: HashSet<ForgeId> = phases.iter().map(|p| p.id).collect();
        validate::ensure_all_found(EntityKind::Phase, &phase_ids, &found)?;

        let mut workflow_ids: Vec<ForgeId> = phases.iter().map(|p| p.workflow_id).collect();
        workflow_ids.sort_unstable();
        workflow_ids.dedup();
        match workflow_ids.as_slice() {
            [single] => Ok(*single),
            _ => Err(ForgeError::validation(
                "dependency endpoints must belong to the same workflow",
            )),
        }
    }
}
