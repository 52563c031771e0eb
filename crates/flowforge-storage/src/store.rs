//! SQLite-backed entity store for workflow templates.
//!
//! All reads return domain types; every multi-record write runs inside one
//! transaction so readers never observe a partially-applied change. A
//! failure mid-transaction rolls the whole thing back and surfaces as
//! `ForgeError::Transaction`.

use crate::schema::SCHEMA;
use chrono::{DateTime, Utc};
use flowforge_core::{
    Dependency, DependencyType, ForgeError, ForgeId, Phase, PhaseTree, Priority, Project,
    ProjectPhase, ProjectStatus, ProjectTask, Result, Task, Workflow, WorkflowTree,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::path::Path;
use tracing::debug;

fn read_err(e: sqlx::Error) -> ForgeError {
    ForgeError::storage(e.to_string())
}

fn write_err(e: sqlx::Error) -> ForgeError {
    ForgeError::transaction(e.to_string())
}

fn parse_id(s: &str) -> Result<ForgeId> {
    ForgeId::parse(s).map_err(|e| ForgeError::storage(format!("invalid id {s:?}: {e}")))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ForgeError::storage(format!("invalid timestamp {s:?}: {e}")))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn map_workflow(row: &SqliteRow) -> Result<Workflow> {
    let id: String = row.try_get("id").map_err(read_err)?;
    let created_by: String = row.try_get("created_by").map_err(read_err)?;
    let created_at: String = row.try_get("created_at").map_err(read_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(read_err)?;
    Ok(Workflow {
        id: parse_id(&id)?,
        name: row.try_get("name").map_err(read_err)?,
        description: row.try_get("description").map_err(read_err)?,
        version: row.try_get("version").map_err(read_err)?,
        is_active: row.try_get::<i64, _>("is_active").map_err(read_err)? != 0,
        created_by: parse_id(&created_by)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn map_phase(row: &SqliteRow) -> Result<Phase> {
    let id: String = row.try_get("id").map_err(read_err)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(read_err)?;
    let created_at: String = row.try_get("created_at").map_err(read_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(read_err)?;
    Ok(Phase {
        id: parse_id(&id)?,
        workflow_id: parse_id(&workflow_id)?,
        name: row.try_get("name").map_err(read_err)?,
        description: row.try_get("description").map_err(read_err)?,
        order: row.try_get::<i64, _>("sort_order").map_err(read_err)? as u32,
        estimated_duration: row
            .try_get::<Option<i64>, _>("estimated_duration")
            .map_err(read_err)?
            .map(|d| d as u32),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn map_task(row: &SqliteRow) -> Result<Task> {
    let id: String = row.try_get("id").map_err(read_err)?;
    let phase_id: String = row.try_get("phase_id").map_err(read_err)?;
    let priority: String = row.try_get("priority").map_err(read_err)?;
    let skills: String = row.try_get("required_skills").map_err(read_err)?;
    let form_template: Option<String> = row.try_get("form_template").map_err(read_err)?;
    let created_at: String = row.try_get("created_at").map_err(read_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(read_err)?;
    Ok(Task {
        id: parse_id(&id)?,
        phase_id: parse_id(&phase_id)?,
        name: row.try_get("name").map_err(read_err)?,
        description: row.try_get("description").map_err(read_err)?,
        estimated_hours: row.try_get("estimated_hours").map_err(read_err)?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| ForgeError::storage(format!("unknown priority {priority:?}")))?,
        required_skills: serde_json::from_str(&skills)?,
        form_template: form_template.map(|t| serde_json::from_str(&t)).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn map_dependency(row: &SqliteRow) -> Result<Dependency> {
    let id: String = row.try_get("id").map_err(read_err)?;
    let source: String = row.try_get("source_task_id").map_err(read_err)?;
    let target: String = row.try_get("target_task_id").map_err(read_err)?;
    let kind: String = row.try_get("dependency_type").map_err(read_err)?;
    let created_at: String = row.try_get("created_at").map_err(read_err)?;
    Ok(Dependency {
        id: parse_id(&id)?,
        source_task_id: parse_id(&source)?,
        target_task_id: parse_id(&target)?,
        dependency_type: DependencyType::parse(&kind)
            .ok_or_else(|| ForgeError::storage(format!("unknown dependency type {kind:?}")))?,
        created_at: parse_ts(&created_at)?,
    })
}

fn map_project(row: &SqliteRow) -> Result<Project> {
    let id: String = row.try_get("id").map_err(read_err)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(read_err)?;
    let status: String = row.try_get("status").map_err(read_err)?;
    Ok(Project {
        id: parse_id(&id)?,
        workflow_id: parse_id(&workflow_id)?,
        name: row.try_get("name").map_err(read_err)?,
        status: ProjectStatus::parse(&status)
            .ok_or_else(|| ForgeError::storage(format!("unknown project status {status:?}")))?,
    })
}

/// SQLite-backed store for workflow template entities.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a file-backed store.
    ///
    /// Foreign-key enforcement stays off: the write paths order and cascade
    /// template rows themselves, and project-side rows are allowed to
    /// outlive the template they were instantiated from.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(read_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store. A single connection keeps the database alive
    /// and shared for the life of the pool.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(read_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(write_err)?;
        }
        debug!("schema initialized");
        Ok(())
    }

    // ---- workflow reads ----

    pub async fn workflow(&self, id: ForgeId) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_workflow).transpose()
    }

    pub async fn workflow_by_name(&self, name: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_workflow).transpose()
    }

    pub async fn workflows_by_ids(&self, ids: &[ForgeId]) -> Result<Vec<Workflow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM workflows WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(read_err)?;
        rows.iter().map(map_workflow).collect()
    }

    /// Workflows whose name is in `names`, excluding the given ids.
    pub async fn workflows_named(
        &self,
        names: &[String],
        exclude: &[ForgeId],
    ) -> Result<Vec<Workflow>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM workflows WHERE name IN ({}) AND id NOT IN ({})",
            placeholders(names.len()),
            placeholders(exclude.len().max(1))
        );
        let mut query = sqlx::query(&sql);
        for name in names {
            query = query.bind(name);
        }
        if exclude.is_empty() {
            query = query.bind("");
        } else {
            for id in exclude {
                query = query.bind(id.to_string());
            }
        }
        let rows = query.fetch_all(&self.pool).await.map_err(read_err)?;
        rows.iter().map(map_workflow).collect()
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        rows.iter().map(map_workflow).collect()
    }

    /// Load a workflow with its full phase/task subtree, phases in order.
    pub async fn workflow_tree(&self, id: ForgeId) -> Result<Option<WorkflowTree>> {
        let Some(workflow) = self.workflow(id).await? else {
            return Ok(None);
        };
        let phases = self.phases_of_workflow(id).await?;
        let mut tree = Vec::with_capacity(phases.len());
        for phase in phases {
            let tasks = self.tasks_of_phase(phase.id).await?;
            tree.push(PhaseTree { phase, tasks });
        }
        Ok(Some(WorkflowTree {
            workflow,
            phases: tree,
        }))
    }

    // ---- phase reads ----

    pub async fn phase(&self, id: ForgeId) -> Result<Option<Phase>> {
        let row = sqlx::query("SELECT * FROM phases WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_phase).transpose()
    }

    pub async fn phases_by_ids(&self, ids: &[ForgeId]) -> Result<Vec<Phase>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM phases WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(read_err)?;
        rows.iter().map(map_phase).collect()
    }

    pub async fn phases_of_workflow(&self, workflow_id: ForgeId) -> Result<Vec<Phase>> {
        let rows = sqlx::query("SELECT * FROM phases WHERE workflow_id = ?1 ORDER BY sort_order")
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        rows.iter().map(map_phase).collect()
    }

    pub async fn phase_by_name(&self, workflow_id: ForgeId, name: &str) -> Result<Option<Phase>> {
        let row = sqlx::query("SELECT * FROM phases WHERE workflow_id = ?1 AND name = ?2")
            .bind(workflow_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_phase).transpose()
    }

    // ---- task reads ----

    pub async fn task(&self, id: ForgeId) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_task).transpose()
    }

    pub async fn tasks_by_ids(&self, ids: &[ForgeId]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM tasks WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(read_err)?;
        rows.iter().map(map_task).collect()
    }

    pub async fn tasks_of_phase(&self, phase_id: ForgeId) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE phase_id = ?1 ORDER BY created_at")
            .bind(phase_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        rows.iter().map(map_task).collect()
    }

    pub async fn task_by_name(&self, phase_id: ForgeId, name: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE phase_id = ?1 AND name = ?2")
            .bind(phase_id.to_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_task).transpose()
    }

    // ---- dependency reads ----

    /// Edges whose source or target is in `task_ids`.
    pub async fn dependencies_touching(&self, task_ids: &[ForgeId]) -> Result<Vec<Dependency>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ph = placeholders(task_ids.len());
        let sql = format!(
            "SELECT * FROM dependencies WHERE source_task_id IN ({ph}) OR target_task_id IN ({ph})"
        );
        let mut query = sqlx::query(&sql);
        for id in task_ids {
            query = query.bind(id.to_string());
        }
        for id in task_ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(read_err)?;
        rows.iter().map(map_dependency).collect()
    }

    /// All edges between tasks of the given workflow.
    pub async fn workflow_dependencies(&self, workflow_id: ForgeId) -> Result<Vec<Dependency>> {
        let rows = sqlx::query(
            r"
            SELECT d.* FROM dependencies d
            JOIN tasks t ON d.source_task_id = t.id
            JOIN phases p ON t.phase_id = p.id
            WHERE p.workflow_id = ?1
            ",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        rows.iter().map(map_dependency).collect()
    }

    pub async fn dependency_exists(&self, source: ForgeId, target: ForgeId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM dependencies WHERE source_task_id = ?1 AND target_task_id = ?2",
        )
        .bind(source.to_string())
        .bind(target.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        Ok(row.is_some())
    }

    // ---- live-reference counts ----

    pub async fn live_project_count(&self, workflow_id: ForgeId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM projects WHERE workflow_id = ?1 AND status IN ('ACTIVE', 'ON_HOLD')",
        )
        .bind(workflow_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;
        row.try_get("n").map_err(read_err)
    }

    pub async fn project_phase_count(&self, phase_id: ForgeId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM project_phases WHERE phase_id = ?1")
            .bind(phase_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        row.try_get("n").map_err(read_err)
    }

    pub async fn project_task_count(&self, task_id: ForgeId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM project_tasks WHERE task_id = ?1")
            .bind(task_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;
        row.try_get("n").map_err(read_err)
    }

    pub async fn task_edge_count(&self, task_id: ForgeId) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM dependencies WHERE source_task_id = ?1 OR target_task_id = ?1",
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;
        row.try_get("n").map_err(read_err)
    }

    // ---- single-record writes ----

    pub async fn insert_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        insert_workflow_stmt(&mut conn, workflow).await
    }

    pub async fn update_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        update_workflow_stmt(&mut conn, workflow).await
    }

    pub async fn insert_phase(&self, phase: &Phase) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        insert_phase_stmt(&mut conn, phase).await
    }

    pub async fn update_phase(&self, phase: &Phase) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        update_phase_stmt(&mut conn, phase).await
    }

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        insert_task_stmt(&mut conn, task).await
    }

    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        update_task_stmt(&mut conn, task).await
    }

    /// Delete a task with no remaining edges. Edge-bearing tasks go through
    /// `delete_tasks_cascade`.
    pub async fn delete_task(&self, id: ForgeId) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    pub async fn insert_dependency(&self, dep: &Dependency) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(write_err)?;
        insert_dependency_stmt(&mut conn, dep).await
    }

    // ---- transactional writes ----

    /// Insert a whole workflow subtree plus its dependency edges in one
    /// transaction, in ownership order.
    pub async fn insert_workflow_tree(
        &self,
        tree: &WorkflowTree,
        deps: &[Dependency],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        insert_workflow_stmt(&mut tx, &tree.workflow).await?;
        for phase_tree in &tree.phases {
            insert_phase_stmt(&mut tx, &phase_tree.phase).await?;
        }
        for phase_tree in &tree.phases {
            for task in &phase_tree.tasks {
                insert_task_stmt(&mut tx, task).await?;
            }
        }
        for dep in deps {
            insert_dependency_stmt(&mut tx, dep).await?;
        }
        tx.commit().await.map_err(write_err)?;
        debug!(
            workflow = %tree.workflow.id,
            phases = tree.phases.len(),
            tasks = tree.task_count(),
            edges = deps.len(),
            "workflow tree inserted"
        );
        Ok(())
    }

    /// Bulk updates run in two passes: every batched row is first parked on
    /// a placeholder name derived from its id, then given its final fields.
    /// A name swap inside one batch (A takes B's name and vice versa) would
    /// otherwise trip the immediate UNIQUE constraint mid-transaction even
    /// though the final state is conflict free.
    pub async fn update_workflows_bulk(&self, workflows: &[Workflow]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for workflow in workflows {
            park_name_stmt(&mut tx, "workflows", workflow.id).await?;
        }
        for workflow in workflows {
            update_workflow_stmt(&mut tx, workflow).await?;
        }
        tx.commit().await.map_err(write_err)
    }

    pub async fn update_phases_bulk(&self, phases: &[Phase]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for phase in phases {
            park_name_stmt(&mut tx, "phases", phase.id).await?;
        }
        for phase in phases {
            update_phase_stmt(&mut tx, phase).await?;
        }
        tx.commit().await.map_err(write_err)
    }

    pub async fn update_tasks_bulk(&self, tasks: &[Task]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for task in tasks {
            park_name_stmt(&mut tx, "tasks", task.id).await?;
        }
        for task in tasks {
            update_task_stmt(&mut tx, task).await?;
        }
        tx.commit().await.map_err(write_err)
    }

    /// Delete workflows and their whole subtrees: dependencies, then tasks,
    /// then phases, then the workflows, all in one transaction.
    pub async fn delete_workflows_cascade(&self, ids: &[ForgeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ph = placeholders(ids.len());
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        let sql = format!(
            "DELETE FROM dependencies WHERE source_task_id IN \
             (SELECT t.id FROM tasks t JOIN phases p ON t.phase_id = p.id WHERE p.workflow_id IN ({ph})) \
             OR target_task_id IN \
             (SELECT t.id FROM tasks t JOIN phases p ON t.phase_id = p.id WHERE p.workflow_id IN ({ph}))"
        );
        bind_ids(sqlx::query(&sql), ids, 2)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!(
            "DELETE FROM tasks WHERE phase_id IN (SELECT id FROM phases WHERE workflow_id IN ({ph}))"
        );
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!("DELETE FROM phases WHERE workflow_id IN ({ph})");
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!("DELETE FROM workflows WHERE id IN ({ph})");
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        tx.commit().await.map_err(write_err)
    }

    /// Delete phases with their tasks and any edges touching those tasks.
    pub async fn delete_phases_cascade(&self, ids: &[ForgeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ph = placeholders(ids.len());
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        let sql = format!(
            "DELETE FROM dependencies WHERE source_task_id IN \
             (SELECT id FROM tasks WHERE phase_id IN ({ph})) \
             OR target_task_id IN \
             (SELECT id FROM tasks WHERE phase_id IN ({ph}))"
        );
        bind_ids(sqlx::query(&sql), ids, 2)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!("DELETE FROM tasks WHERE phase_id IN ({ph})");
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!("DELETE FROM phases WHERE id IN ({ph})");
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        tx.commit().await.map_err(write_err)
    }

    /// Delete tasks and any edges touching them.
    pub async fn delete_tasks_cascade(&self, ids: &[ForgeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ph = placeholders(ids.len());
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        let sql = format!(
            "DELETE FROM dependencies WHERE source_task_id IN ({ph}) OR target_task_id IN ({ph})"
        );
        bind_ids(sqlx::query(&sql), ids, 2)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        let sql = format!("DELETE FROM tasks WHERE id IN ({ph})");
        bind_ids(sqlx::query(&sql), ids, 1)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        tx.commit().await.map_err(write_err)
    }

    /// Atomically replace every edge touching `scope` with `deps`.
    pub async fn replace_dependencies(
        &self,
        scope: &[ForgeId],
        deps: &[Dependency],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        if !scope.is_empty() {
            let ph = placeholders(scope.len());
            let sql = format!(
                "DELETE FROM dependencies WHERE source_task_id IN ({ph}) OR target_task_id IN ({ph})"
            );
            bind_ids(sqlx::query(&sql), scope, 2)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }
        for dep in deps {
            insert_dependency_stmt(&mut tx, dep).await?;
        }
        tx.commit().await.map_err(write_err)?;
        debug!(scope = scope.len(), edges = deps.len(), "dependencies replaced");
        Ok(())
    }

    /// Apply a full set of phase order assignments in one transaction.
    pub async fn apply_phase_orders(&self, assignments: &[(ForgeId, u32)]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for (id, order) in assignments {
            sqlx::query("UPDATE phases SET sort_order = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(*order as i64)
                .bind(&now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }
        tx.commit().await.map_err(write_err)
    }

    // ---- project-side records (live references) ----

    pub async fn project(&self, id: ForgeId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err)?;
        row.as_ref().map(map_project).transpose()
    }

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query("INSERT INTO projects (id, workflow_id, name, status) VALUES (?1, ?2, ?3, ?4)")
            .bind(project.id.to_string())
            .bind(project.workflow_id.to_string())
            .bind(&project.name)
            .bind(project.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    pub async fn update_project_status(&self, id: ForgeId, status: ProjectStatus) -> Result<()> {
        sqlx::query("UPDATE projects SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    pub async fn insert_project_phase(&self, link: &ProjectPhase) -> Result<()> {
        sqlx::query("INSERT INTO project_phases (id, project_id, phase_id) VALUES (?1, ?2, ?3)")
            .bind(link.id.to_string())
            .bind(link.project_id.to_string())
            .bind(link.phase_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    pub async fn insert_project_task(&self, link: &ProjectTask) -> Result<()> {
        sqlx::query("INSERT INTO project_tasks (id, project_id, task_id) VALUES (?1, ?2, ?3)")
            .bind(link.id.to_string())
            .bind(link.project_id.to_string())
            .bind(link.task_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

fn bind_ids<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ids: &[ForgeId],
    repeats: usize,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for _ in 0..repeats {
        for id in ids {
            query = query.bind(id.to_string());
        }
    }
    query
}

/// First pass of a bulk update: move the row's name out of the way. The
/// placeholder is the row's own id behind a leading newline, unique per row
/// and outside the space of names anyone writes.
async fn park_name_stmt(conn: &mut SqliteConnection, table: &str, id: ForgeId) -> Result<()> {
    let sql = format!("UPDATE {table} SET name = char(10) || id WHERE id = ?1");
    sqlx::query(&sql)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(write_err)?;
    Ok(())
}

async fn insert_workflow_stmt(conn: &mut SqliteConnection, w: &Workflow) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO workflows (id, name, description, version, is_active, created_by, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )
    .bind(w.id.to_string())
    .bind(&w.name)
    .bind(&w.description)
    .bind(&w.version)
    .bind(w.is_active as i64)
    .bind(w.created_by.to_string())
    .bind(w.created_at.to_rfc3339())
    .bind(w.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn update_workflow_stmt(conn: &mut SqliteConnection, w: &Workflow) -> Result<()> {
    sqlx::query(
        r"
        UPDATE workflows
        SET name = ?1, description = ?2, version = ?3, is_active = ?4, updated_at = ?5
        WHERE id = ?6
        ",
    )
    .bind(&w.name)
    .bind(&w.description)
    .bind(&w.version)
    .bind(w.is_active as i64)
    .bind(w.updated_at.to_rfc3339())
    .bind(w.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn insert_phase_stmt(conn: &mut SqliteConnection, p: &Phase) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO phases (id, workflow_id, name, description, sort_order, estimated_duration, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )
    .bind(p.id.to_string())
    .bind(p.workflow_id.to_string())
    .bind(&p.name)
    .bind(&p.description)
    .bind(p.order as i64)
    .bind(p.estimated_duration.map(|d| d as i64))
    .bind(p.created_at.to_rfc3339())
    .bind(p.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn update_phase_stmt(conn: &mut SqliteConnection, p: &Phase) -> Result<()> {
    sqlx::query(
        r"
        UPDATE phases
        SET name = ?1, description = ?2, sort_order = ?3, estimated_duration = ?4, updated_at = ?5
        WHERE id = ?6
        ",
    )
    .bind(&p.name)
    .bind(&p.description)
    .bind(p.order as i64)
    .bind(p.estimated_duration.map(|d| d as i64))
    .bind(p.updated_at.to_rfc3339())
    .bind(p.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn insert_task_stmt(conn: &mut SqliteConnection, t: &Task) -> Result<()> {
    let skills = serde_json::to_string(&t.required_skills)?;
    let form_template = t
        .form_template
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(
        r"
        INSERT INTO tasks (id, phase_id, name, description, estimated_hours, priority, required_skills, form_template, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ",
    )
    .bind(t.id.to_string())
    .bind(t.phase_id.to_string())
    .bind(&t.name)
    .bind(&t.description)
    .bind(t.estimated_hours)
    .bind(t.priority.as_str())
    .bind(skills)
    .bind(form_template)
    .bind(t.created_at.to_rfc3339())
    .bind(t.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn update_task_stmt(conn: &mut SqliteConnection, t: &Task) -> Result<()> {
    let skills = serde_json::to_string(&t.required_skills)?;
    let form_template = t
        .form_template
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(
        r"
        UPDATE tasks
        SET name = ?1, description = ?2, estimated_hours = ?3, priority = ?4, required_skills = ?5, form_template = ?6, updated_at = ?7
        WHERE id = ?8
        ",
    )
    .bind(&t.name)
    .bind(&t.description)
    .bind(t.estimated_hours)
    .bind(t.priority.as_str())
    .bind(skills)
    .bind(form_template)
    .bind(t.updated_at.to_rfc3339())
    .bind(t.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

async fn insert_dependency_stmt(conn: &mut SqliteConnection, d: &Dependency) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO dependencies (id, source_task_id, target_task_id, dependency_type, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )
    .bind(d.id.to_string())
    .bind(d.source_task_id.to_string())
    .bind(d.target_task_id.to_string())
    .bind(d.dependency_type.as_str())
    .bind(d.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn sample_workflow(name: &str) -> Workflow {
        Workflow::new(name.into(), None, "1.0".into(), true, ForgeId::new())
    }

    #[tokio::test]
    async fn test_workflow_roundtrip() {
        let store = store().await;
        let workflow = sample_workflow("Standard Wrap");
        store.insert_workflow(&workflow).await.unwrap();

        let loaded = store.workflow(workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Standard Wrap");
        assert_eq!(loaded.created_by, workflow.created_by);
        assert!(loaded.is_active);

        assert!(store.workflow(ForgeId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_name_enforced_by_schema() {
        let store = store().await;
        store
            .insert_workflow(&sample_workflow("Standard Wrap"))
            .await
            .unwrap();
        let err = store
            .insert_workflow(&sample_workflow("Standard Wrap"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Transaction(_)));
    }

    #[tokio::test]
    async fn test_bulk_update_allows_name_swap() {
        let store = store().await;
        let mut a = sample_workflow("A");
        let mut b = sample_workflow("B");
        store.insert_workflow(&a).await.unwrap();
        store.insert_workflow(&b).await.unwrap();

        // The final state is conflict free even though applying either
        // rename first would collide with the other row.
        a.name = "B".into();
        b.name = "A".into();
        store
            .update_workflows_bulk(&[a.clone(), b.clone()])
            .await
            .unwrap();

        assert_eq!(store.workflow(a.id).await.unwrap().unwrap().name, "B");
        assert_eq!(store.workflow(b.id).await.unwrap().unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_task_json_fields_roundtrip() {
        let store = store().await;
        let workflow = sample_workflow("W");
        store.insert_workflow(&workflow).await.unwrap();
        let phase = Phase::new(workflow.id, "P".into(), None, 1, Some(5));
        store.insert_phase(&phase).await.unwrap();
        let task = Task::new(
            phase.id,
            "Install".into(),
            Some("wrap the hood".into()),
            8.5,
            Priority::Critical,
            vec!["vinyl".into(), "heat gun".into()],
            Some(serde_json::json!({"fields": [{"name": "photos"}]})),
        );
        store.insert_task(&task).await.unwrap();

        let loaded = store.task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded.required_skills, task.required_skills);
        assert_eq!(loaded.form_template, task.form_template);
        assert_eq!(loaded.priority, Priority::Critical);
        assert!((loaded.estimated_hours - 8.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_tree_insert_and_load() {
        let store = store().await;
        let workflow = sample_workflow("Tree");
        let phase_a = Phase::new(workflow.id, "A".into(), None, 1, None);
        let phase_b = Phase::new(workflow.id, "B".into(), None, 2, None);
        let t1 = Task::new(phase_a.id, "t1".into(), None, 1.0, Priority::Low, vec![], None);
        let t2 = Task::new(phase_b.id, "t2".into(), None, 2.0, Priority::High, vec![], None);
        let dep = Dependency::new(t1.id, t2.id, DependencyType::FinishToStart);
        let tree = WorkflowTree {
            workflow: workflow.clone(),
            phases: vec![
                PhaseTree {
                    phase: phase_a,
                    tasks: vec![t1.clone()],
                },
                PhaseTree {
                    phase: phase_b,
                    tasks: vec![t2.clone()],
                },
            ],
        };
        store
            .insert_workflow_tree(&tree, std::slice::from_ref(&dep))
            .await
            .unwrap();

        let loaded = store.workflow_tree(workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.phases.len(), 2);
        assert_eq!(loaded.phases[0].phase.name, "A");
        assert_eq!(loaded.task_count(), 2);

        let edges = store.workflow_dependencies(workflow.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_task_id, t1.id);
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_subtree() {
        let store = store().await;
        let workflow = sample_workflow("Doomed");
        let phase = Phase::new(workflow.id, "P".into(), None, 1, None);
        let t1 = Task::new(phase.id, "t1".into(), None, 1.0, Priority::Low, vec![], None);
        let t2 = Task::new(phase.id, "t2".into(), None, 1.0, Priority::Low, vec![], None);
        let dep = Dependency::new(t1.id, t2.id, DependencyType::StartToStart);
        let tree = WorkflowTree {
            workflow: workflow.clone(),
            phases: vec![PhaseTree {
                phase: phase.clone(),
                tasks: vec![t1.clone(), t2.clone()],
            }],
        };
        store
            .insert_workflow_tree(&tree, std::slice::from_ref(&dep))
            .await
            .unwrap();

        store.delete_workflows_cascade(&[workflow.id]).await.unwrap();

        assert!(store.workflow(workflow.id).await.unwrap().is_none());
        assert!(store.phase(phase.id).await.unwrap().is_none());
        assert!(store.task(t1.id).await.unwrap().is_none());
        assert_eq!(store.dependencies_touching(&[t1.id, t2.id]).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_replace_dependencies_swaps_edge_set() {
        let store = store().await;
        let workflow = sample_workflow("Edges");
        store.insert_workflow(&workflow).await.unwrap();
        let phase = Phase::new(workflow.id, "P".into(), None, 1, None);
        store.insert_phase(&phase).await.unwrap();
        let mk = |name: &str| Task::new(phase.id, name.into(), None, 1.0, Priority::Low, vec![], None);
        let (a, b, c) = (mk("a"), mk("b"), mk("c"));
        for t in [&a, &b, &c] {
            store.insert_task(t).await.unwrap();
        }
        store
            .insert_dependency(&Dependency::new(a.id, b.id, DependencyType::FinishToStart))
            .await
            .unwrap();

        let replacement = Dependency::new(b.id, c.id, DependencyType::FinishToStart);
        store
            .replace_dependencies(&[a.id, b.id, c.id], std::slice::from_ref(&replacement))
            .await
            .unwrap();

        let edges = store.workflow_dependencies(workflow.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_task_id, b.id);
        assert_eq!(edges[0].target_task_id, c.id);
    }

    #[tokio::test]
    async fn test_live_project_count_ignores_finished() {
        let store = store().await;
        let workflow = sample_workflow("Counts");
        store.insert_workflow(&workflow).await.unwrap();

        store
            .insert_project(&Project::new(workflow.id, "p1".into(), ProjectStatus::Active))
            .await
            .unwrap();
        store
            .insert_project(&Project::new(workflow.id, "p2".into(), ProjectStatus::Completed))
            .await
            .unwrap();

        assert_eq!(store.live_project_count(workflow.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("flowforge.db")).await.unwrap();
        let workflow = sample_workflow("Persisted");
        store.insert_workflow(&workflow).await.unwrap();
        assert!(store.workflow_by_name("Persisted").await.unwrap().is_some());
    }
}
