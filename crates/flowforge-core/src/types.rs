//! Domain types for the Flowforge workflow template engine.

use crate::id::ForgeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reusable project template composed of ordered phases.
///
/// Workflow names are unique across all workflows; the storage layer carries
/// the authoritative UNIQUE constraint, the engine pre-checks to produce a
/// precise error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub is_active: bool,
    pub created_by: ForgeId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow record
    pub fn new(
        name: String,
        description: Option<String>,
        version: String,
        is_active: bool,
        created_by: ForgeId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ForgeId::new(),
            name,
            description,
            version,
            is_active,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A named stage within a workflow. Order values are 1-based and unique
/// within the owning workflow, but need not be contiguous.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub id: ForgeId,
    pub workflow_id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub order: u32,
    pub estimated_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Phase {
    /// Create a new phase under a workflow
    pub fn new(
        workflow_id: ForgeId,
        name: String,
        description: Option<String>,
        order: u32,
        estimated_duration: Option<u32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ForgeId::new(),
            workflow_id,
            name,
            description,
            order,
            estimated_duration,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A unit of work within a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: ForgeId,
    pub phase_id: ForgeId,
    pub name: String,
    pub description: Option<String>,
    pub estimated_hours: f64,
    pub priority: Priority,
    pub required_skills: Vec<String>,
    pub form_template: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task under a phase
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        phase_id: ForgeId,
        name: String,
        description: Option<String>,
        estimated_hours: f64,
        priority: Priority,
        required_skills: Vec<String>,
        form_template: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ForgeId::new(),
            phase_id,
            name,
            description,
            estimated_hours,
            priority,
            required_skills,
            form_template,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Task priority levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Priority::Low),
            "MEDIUM" => Some(Priority::Medium),
            "HIGH" => Some(Priority::High),
            "CRITICAL" => Some(Priority::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed ordering constraint between two tasks.
///
/// Edges are associative records: they reference two tasks but are owned by
/// neither, and are destroyed when either endpoint (or any ancestor
/// workflow) is destroyed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dependency {
    pub id: ForgeId,
    pub source_task_id: ForgeId,
    pub target_task_id: ForgeId,
    pub dependency_type: DependencyType,
    pub created_at: DateTime<Utc>,
}

impl Dependency {
    /// Create a new dependency edge
    pub fn new(
        source_task_id: ForgeId,
        target_task_id: ForgeId,
        dependency_type: DependencyType,
    ) -> Self {
        Self {
            id: ForgeId::new(),
            source_task_id,
            target_task_id,
            dependency_type,
            created_at: Utc::now(),
        }
    }
}

/// Scheduling relation carried by a dependency edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    FinishToStart,
    StartToStart,
    FinishToFinish,
    StartToFinish,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FINISH_TO_START",
            DependencyType::StartToStart => "START_TO_START",
            DependencyType::FinishToFinish => "FINISH_TO_FINISH",
            DependencyType::StartToFinish => "START_TO_FINISH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FINISH_TO_START" => Some(DependencyType::FinishToStart),
            "START_TO_START" => Some(DependencyType::StartToStart),
            "FINISH_TO_FINISH" => Some(DependencyType::FinishToFinish),
            "START_TO_FINISH" => Some(DependencyType::StartToFinish),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a project instantiated from a workflow template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    /// Live projects block structural edits to their source template.
    pub fn is_live(&self) -> bool {
        matches!(self, ProjectStatus::Active | ProjectStatus::OnHold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "PLANNING",
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::OnHold => "ON_HOLD",
            ProjectStatus::Completed => "COMPLETED",
            ProjectStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLANNING" => Some(ProjectStatus::Planning),
            "ACTIVE" => Some(ProjectStatus::Active),
            "ON_HOLD" => Some(ProjectStatus::OnHold),
            "COMPLETED" => Some(ProjectStatus::Completed),
            "CANCELLED" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

/// A project instantiated from a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ForgeId,
    pub workflow_id: ForgeId,
    pub name: String,
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(workflow_id: ForgeId, name: String, status: ProjectStatus) -> Self {
        Self {
            id: ForgeId::new(),
            workflow_id,
            name,
            status,
        }
    }
}

/// A project-side phase instance derived from a template phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectPhase {
    pub id: ForgeId,
    pub project_id: ForgeId,
    pub phase_id: ForgeId,
}

/// A project-side task instance derived from a template task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectTask {
    pub id: ForgeId,
    pub project_id: ForgeId,
    pub task_id: ForgeId,
}

/// A phase together with its tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTree {
    pub phase: Phase,
    pub tasks: Vec<Task>,
}

/// A workflow with its full phase/task subtree, phases in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTree {
    pub workflow: Workflow,
    pub phases: Vec<PhaseTree>,
}

impl WorkflowTree {
    /// All task ids in the subtree, in phase order.
    pub fn task_ids(&self) -> Vec<ForgeId> {
        self.phases
            .iter()
            .flat_map(|p| p.tasks.iter().map(|t| t.id))
            .collect()
    }

    /// Total task count across all phases.
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }
}

/// A task with its incoming and outgoing dependency edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskWithEdges {
    pub task: Task,
    /// Edges where this task is the target (it depends on the source)
    pub depends_on: Vec<Dependency>,
    /// Edges where this task is the source (others depend on it)
    pub depended_on_by: Vec<Dependency>,
}
