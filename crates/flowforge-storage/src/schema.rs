//! SQLite schema for the workflow template tables.
//!
//! Uniqueness constraints here are the authoritative guard against
//! concurrent duplicate-name submissions; the engine's pre-checks exist to
//! produce friendly errors. Foreign-key ordering is handled by the store's
//! write paths (phases before tasks before dependencies).

pub const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        version TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS phases (
        id TEXT PRIMARY KEY NOT NULL,
        workflow_id TEXT NOT NULL REFERENCES workflows(id),
        name TEXT NOT NULL,
        description TEXT,
        sort_order INTEGER NOT NULL,
        estimated_duration INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(workflow_id, name)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        phase_id TEXT NOT NULL REFERENCES phases(id),
        name TEXT NOT NULL,
        description TEXT,
        estimated_hours REAL NOT NULL,
        priority TEXT NOT NULL,
        required_skills TEXT NOT NULL,
        form_template TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(phase_id, name)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS dependencies (
        id TEXT PRIMARY KEY NOT NULL,
        source_task_id TEXT NOT NULL REFERENCES tasks(id),
        target_task_id TEXT NOT NULL REFERENCES tasks(id),
        dependency_type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(source_task_id, target_task_id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY NOT NULL,
        workflow_id TEXT NOT NULL REFERENCES workflows(id),
        name TEXT NOT NULL,
        status TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS project_phases (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id),
        phase_id TEXT NOT NULL REFERENCES phases(id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS project_tasks (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id),
        task_id TEXT NOT NULL REFERENCES tasks(id)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_phases_workflow ON phases(workflow_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_phase ON tasks(phase_id)",
    "CREATE INDEX IF NOT EXISTS idx_deps_source ON dependencies(source_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_deps_target ON dependencies(target_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_projects_workflow ON projects(workflow_id)",
    "CREATE INDEX IF NOT EXISTS idx_project_phases_phase ON project_phases(phase_id)",
    "CREATE INDEX IF NOT EXISTS idx_project_tasks_task ON project_tasks(task_id)",
];
