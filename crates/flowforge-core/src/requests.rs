//! Request shapes accepted by the engine, with input validation.
//!
//! Shape and range checks live here (`ValidationError` territory); scoped
//! constraint checks (uniqueness, live references, cycles) are the engine's
//! job and run against the store.

use crate::error::{ForgeError, Result};
use crate::id::ForgeId;
use crate::types::{DependencyType, Priority};
use serde::{Deserialize, Serialize};

/// Maximum number of items accepted by any batch operation.
pub const MAX_BATCH_SIZE: usize = 50;

const MAX_NAME_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_VERSION_LEN: usize = 50;
const MAX_ESTIMATED_HOURS: f64 = 1000.0;

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ForgeError::validation("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ForgeError::validation(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_description(description: Option<&String>) -> Result<()> {
    if let Some(d) = description {
        if d.len() > MAX_DESCRIPTION_LEN {
            return Err(ForgeError::validation(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn check_version(version: &str) -> Result<()> {
    if version.trim().is_empty() {
        return Err(ForgeError::validation("version must not be empty"));
    }
    if version.len() > MAX_VERSION_LEN {
        return Err(ForgeError::validation(format!(
            "version exceeds {MAX_VERSION_LEN} characters"
        )));
    }
    Ok(())
}

fn check_hours(hours: f64) -> Result<()> {
    if !(0.0..=MAX_ESTIMATED_HOURS).contains(&hours) {
        return Err(ForgeError::validation(format!(
            "estimated hours must be between 0 and {MAX_ESTIMATED_HOURS}"
        )));
    }
    Ok(())
}

fn check_order(order: u32) -> Result<()> {
    if order < 1 {
        return Err(ForgeError::validation("order must be 1-based"));
    }
    Ok(())
}

fn check_skills(skills: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for skill in skills {
        if skill.trim().is_empty() {
            return Err(ForgeError::validation("skill labels must not be empty"));
        }
        if !seen.insert(skill.as_str()) {
            return Err(ForgeError::validation(format!(
                "duplicate skill label {skill:?}"
            )));
        }
    }
    Ok(())
}

fn check_batch_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(ForgeError::validation("batch must not be empty"));
    }
    if len > MAX_BATCH_SIZE {
        return Err(ForgeError::validation(format!(
            "batch exceeds {MAX_BATCH_SIZE} items"
        )));
    }
    Ok(())
}

/// Fields for creating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub is_active: bool,
}

impl CreateWorkflow {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_version(&self.version)
    }
}

/// Full-record workflow update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub is_active: bool,
}

impl UpdateWorkflow {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_version(&self.version)
    }
}

/// Duplication request: deep-copies the source workflow's subtree under a
/// new name, optionally overriding the copied scalar fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateWorkflow {
    pub source_workflow_id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub is_active: Option<bool>,
}

impl DuplicateWorkflow {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        if let Some(v) = &self.version {
            check_version(v)?;
        }
        Ok(())
    }
}

/// Fields for creating a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePhase {
    pub name: String,
    pub description: Option<String>,
    pub order: u32,
    pub estimated_duration: Option<u32>,
}

impl CreatePhase {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_order(self.order)
    }
}

/// Full-record phase update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePhase {
    pub name: String,
    pub description: Option<String>,
    pub order: u32,
    pub estimated_duration: Option<u32>,
}

impl UpdatePhase {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_order(self.order)
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub name: String,
    pub description: Option<String>,
    pub estimated_hours: f64,
    pub priority: Priority,
    pub required_skills: Vec<String>,
    pub form_template: Option<serde_json::Value>,
}

impl CreateTask {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_hours(self.estimated_hours)?;
        check_skills(&self.required_skills)
    }
}

/// Full-record task update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTask {
    pub name: String,
    pub description: Option<String>,
    pub estimated_hours: f64,
    pub priority: Priority,
    pub required_skills: Vec<String>,
    pub form_template: Option<serde_json::Value>,
}

impl UpdateTask {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_hours(self.estimated_hours)?;
        check_skills(&self.required_skills)
    }
}

/// One workflow item in a batch update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBatchItem {
    pub id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub is_active: bool,
}

impl WorkflowBatchItem {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_version(&self.version)
    }
}

/// One phase item in a batch update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseBatchItem {
    pub id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub order: u32,
    pub estimated_duration: Option<u32>,
}

impl PhaseBatchItem {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_order(self.order)
    }
}

/// One task item in a batch update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBatchItem {
    pub id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub estimated_hours: f64,
    pub priority: Priority,
    pub required_skills: Vec<String>,
    pub form_template: Option<serde_json::Value>,
}

impl TaskBatchItem {
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name)?;
        check_description(self.description.as_ref())?;
        check_hours(self.estimated_hours)?;
        check_skills(&self.required_skills)
    }
}

/// Validate a whole batch of items against the size bound plus per-item rules.
pub fn validate_batch<T>(items: &[T], validate_item: impl Fn(&T) -> Result<()>) -> Result<()> {
    check_batch_len(items.len())?;
    items.iter().try_for_each(validate_item)
}

/// Validate an id list for a batch delete.
pub fn validate_batch_ids(ids: &[ForgeId]) -> Result<()> {
    check_batch_len(ids.len())?;
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(*id) {
            return Err(ForgeError::validation(format!("duplicate id {id} in batch")));
        }
    }
    Ok(())
}

/// A new dependency edge to insert or include in a bulk replacement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NewDependency {
    pub source_task_id: ForgeId,
    pub target_task_id: ForgeId,
    pub dependency_type: DependencyType,
}

/// One (phase, order) assignment in a reorder request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseOrder {
    pub id: ForgeId,
    pub order: u32,
}

/// Reorder request: the full target order set for a workflow's phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderPhases {
    pub workflow_id: ForgeId,
    pub phases: Vec<PhaseOrder>,
}

impl ReorderPhases {
    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(ForgeError::validation("reorder set must not be empty"));
        }
        for p in &self.phases {
            check_order(p.order)?;
        }
        Ok(())
    }
}
