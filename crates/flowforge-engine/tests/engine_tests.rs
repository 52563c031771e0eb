//! End-to-end engine tests over an in-memory store.

use flowforge_core::{
    CreatePhase, CreateTask, CreateWorkflow, DependencyType, DuplicateWorkflow, ForgeError,
    ForgeId, NewDependency, PhaseBatchItem, PhaseOrder, Principal, Priority, ProjectStatus,
    ReorderPhases, Role, TaskBatchItem, UpdateWorkflow, Workflow, WorkflowTree,
};
use flowforge_engine::WorkflowEngine;
use flowforge_storage::SqliteStore;
use std::collections::HashSet;

async fn engine() -> WorkflowEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    WorkflowEngine::new(SqliteStore::in_memory().await.unwrap())
}

fn admin() -> Principal {
    Principal::new(ForgeId::new(), Role::Administrator)
}

fn manager() -> Principal {
    Principal::new(ForgeId::new(), Role::Manager)
}

fn member() -> Principal {
    Principal::new(ForgeId::new(), Role::TeamMember)
}

fn workflow_req(name: &str) -> CreateWorkflow {
    CreateWorkflow {
        name: name.into(),
        description: Some("full vehicle wrap".into()),
        version: "1.0".into(),
        is_active: true,
    }
}

fn phase_req(name: &str, order: u32) -> CreatePhase {
    CreatePhase {
        name: name.into(),
        description: None,
        order,
        estimated_duration: Some(5),
    }
}

fn task_req(name: &str) -> CreateTask {
    CreateTask {
        name: name.into(),
        description: None,
        estimated_hours: 4.0,
        priority: Priority::Medium,
        required_skills: vec!["vinyl".into()],
        form_template: None,
    }
}

/// Workflow "Standard Wrap" with phases Design and Marketing, three tasks
/// and two dependency edges between them.
async fn seed_standard_wrap(engine: &WorkflowEngine, principal: &Principal) -> WorkflowTree {
    let p = Some(principal);
    let workflow = engine
        .create_workflow(p, workflow_req("Standard Wrap"))
        .await
        .unwrap();
    let design = engine
        .create_phase(p, workflow.id, phase_req("Design", 1))
        .await
        .unwrap();
    let marketing = engine
        .create_phase(p, workflow.id, phase_req("Marketing", 2))
        .await
        .unwrap();
    let survey = engine
        .create_task(p, design.id, task_req("Survey vehicle"))
        .await
        .unwrap();
    let mockup = engine
        .create_task(p, design.id, task_req("Prepare mockup"))
        .await
        .unwrap();
    let photos = engine
        .create_task(p, marketing.id, task_req("Shoot photos"))
        .await
        .unwrap();
    for (source, target) in [(survey.id, mockup.id), (mockup.id, photos.id)] {
        engine
            .add_dependency(
                p,
                NewDependency {
                    source_task_id: source,
                    target_task_id: target,
                    dependency_type: DependencyType::FinishToStart,
                },
            )
            .await
            .unwrap();
    }
    engine.get_workflow_tree(p, workflow.id).await.unwrap()
}

#[tokio::test]
async fn test_mutation_requires_mutator_role() {
    let engine = engine().await;
    let err = engine
        .create_workflow(None, workflow_req("W"))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::Unauthorized));

    let err = engine
        .create_workflow(Some(&member()), workflow_req("W"))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::InsufficientPermissions { .. }));

    // Managers and administrators both pass the gate
    engine
        .create_workflow(Some(&manager()), workflow_req("By Manager"))
        .await
        .unwrap();
    engine
        .create_workflow(Some(&admin()), workflow_req("By Admin"))
        .await
        .unwrap();

    // A team member can still read
    let listed = engine.list_workflows(Some(&member())).await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_workflow_names_are_unique() {
    let engine = engine().await;
    let admin = admin();
    engine
        .create_workflow(Some(&admin), workflow_req("Standard Wrap"))
        .await
        .unwrap();
    let err = engine
        .create_workflow(Some(&admin), workflow_req("Standard Wrap"))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::DuplicateName { .. }));
}

#[tokio::test]
async fn test_duplication_preserves_shape_with_fresh_ids() {
    let engine = engine().await;
    let creator = admin();
    let source = seed_standard_wrap(&engine, &creator).await;

    let duplicator = manager();
    let copy = engine
        .duplicate_workflow(
            Some(&duplicator),
            DuplicateWorkflow {
                source_workflow_id: source.workflow.id,
                name: "Standard Wrap v2".into(),
                description: None,
                version: None,
                is_active: None,
            },
        )
        .await
        .unwrap();

    // Same shape
    assert_eq!(copy.phases.len(), source.phases.len());
    assert_eq!(copy.task_count(), source.task_count());
    assert_eq!(copy.phases[0].phase.name, "Design");
    assert_eq!(copy.phases[0].phase.order, 1);

    // Overrides not supplied fall back to the source record
    assert_eq!(copy.workflow.version, source.workflow.version);
    assert_eq!(copy.workflow.description, source.workflow.description);
    assert_eq!(copy.workflow.created_by, duplicator.user_id);

    // No id is shared between the trees
    let source_ids: HashSet<ForgeId> = source.task_ids().into_iter().collect();
    let copy_ids: HashSet<ForgeId> = copy.task_ids().into_iter().collect();
    assert!(source_ids.is_disjoint(&copy_ids));

    // Edges were remapped: same count, endpoints inside the copy only
    let copy_edges = engine
        .list_dependencies(Some(&duplicator), copy.workflow.id)
        .await
        .unwrap();
    assert_eq!(copy_edges.len(), 2);
    for edge in &copy_edges {
        assert!(copy_ids.contains(&edge.source_task_id));
        assert!(copy_ids.contains(&edge.target_task_id));
    }

    // The source is untouched
    let source_edges = engine
        .list_dependencies(Some(&duplicator), source.workflow.id)
        .await
        .unwrap();
    assert_eq!(source_edges.len(), 2);
}

#[tokio::test]
async fn test_cycle_rejected_before_any_write() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let tasks = tree.task_ids();
    let (survey, photos) = (tasks[0], tasks[2]);

    // survey -> mockup -> photos already exists; photos -> survey closes it
    let err = engine
        .add_dependency(
            Some(&admin),
            NewDependency {
                source_task_id: photos,
                target_task_id: survey,
                dependency_type: DependencyType::FinishToStart,
            },
        )
        .await
        .unwrap_err();
    match err {
        ForgeError::CircularDependency { cycle } => assert_eq!(cycle.len(), 3),
        other => panic!("unexpected error: {other}"),
    }

    // Self-loop is a one-node cycle
    let err = engine
        .add_dependency(
            Some(&admin),
            NewDependency {
                source_task_id: survey,
                target_task_id: survey,
                dependency_type: DependencyType::StartToStart,
            },
        )
        .await
        .unwrap_err();
    match err {
        ForgeError::CircularDependency { cycle } => assert_eq!(cycle, vec![survey]),
        other => panic!("unexpected error: {other}"),
    }

    // The rejected edits left the graph unchanged
    let edges = engine
        .list_dependencies(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
    assert_eq!(edges.len(), 2);
}

#[tokio::test]
async fn test_duplicate_edge_rejected() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let tasks = tree.task_ids();

    let err = engine
        .add_dependency(
            Some(&admin),
            NewDependency {
                source_task_id: tasks[0],
                target_task_id: tasks[1],
                dependency_type: DependencyType::StartToStart,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::DuplicateEdge { .. }));
}

#[tokio::test]
async fn test_edges_may_not_span_workflows() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let other = engine
        .create_workflow(Some(&admin), workflow_req("Other"))
        .await
        .unwrap();
    let other_phase = engine
        .create_phase(Some(&admin), other.id, phase_req("P", 1))
        .await
        .unwrap();
    let other_task = engine
        .create_task(Some(&admin), other_phase.id, task_req("Elsewhere"))
        .await
        .unwrap();

    let err = engine
        .add_dependency(
            Some(&admin),
            NewDependency {
                source_task_id: tree.task_ids()[0],
                target_task_id: other_task.id,
                dependency_type: DependencyType::FinishToStart,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::Validation(_)));
}

#[tokio::test]
async fn test_replace_dependencies_is_atomic() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let tasks = tree.task_ids();
    let (survey, mockup, photos) = (tasks[0], tasks[1], tasks[2]);

    // A replacement set containing a cycle is rejected whole
    let cyclic = vec![
        NewDependency {
            source_task_id: survey,
            target_task_id: mockup,
            dependency_type: DependencyType::FinishToStart,
        },
        NewDependency {
            source_task_id: mockup,
            target_task_id: survey,
            dependency_type: DependencyType::FinishToStart,
        },
    ];
    let err = engine
        .replace_dependencies(Some(&admin), cyclic)
        .await
        .unwrap_err();
    assert!(err.is_circular());
    let edges = engine
        .list_dependencies(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
    assert_eq!(edges.len(), 2);

    // A valid set swaps the edges touching its tasks
    let replacement = vec![NewDependency {
        source_task_id: photos,
        target_task_id: mockup,
        dependency_type: DependencyType::StartToStart,
    }];
    engine
        .replace_dependencies(Some(&admin), replacement)
        .await
        .unwrap();
    let edges = engine
        .list_dependencies(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_task_id, photos);
    assert_eq!(edges[0].target_task_id, mockup);
}

#[tokio::test]
async fn test_inactive_workflow_blocks_structural_edits() {
    let engine = engine().await;
    let admin = admin();
    let workflow = engine
        .create_workflow(Some(&admin), workflow_req("Retiring"))
        .await
        .unwrap();
    engine
        .update_workflow(
            Some(&admin),
            workflow.id,
            UpdateWorkflow {
                name: "Retiring".into(),
                description: None,
                version: "1.0".into(),
                is_active: false,
            },
        )
        .await
        .unwrap();

    let err = engine
        .create_phase(Some(&admin), workflow.id, phase_req("P", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::InactiveWorkflow { .. }));

    // The workflow record itself stays editable, so it can be reactivated
    let reactivated = engine
        .update_workflow(
            Some(&admin),
            workflow.id,
            UpdateWorkflow {
                name: "Retiring".into(),
                description: None,
                version: "1.1".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();
    assert!(reactivated.is_active);
    engine
        .create_phase(Some(&admin), workflow.id, phase_req("P", 1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_live_references_block_deletion() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let design = tree.phases[0].phase.clone();

    let project = engine
        .register_project(
            Some(&admin),
            tree.workflow.id,
            "Truck 14".into(),
            ProjectStatus::Active,
        )
        .await
        .unwrap();
    engine
        .link_project_phase(Some(&admin), project.id, design.id)
        .await
        .unwrap();

    let err = engine
        .delete_workflow(Some(&admin), tree.workflow.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));

    let err = engine.delete_phase(Some(&admin), design.id).await.unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));

    // A completed project no longer blocks the workflow
    engine
        .set_project_status(Some(&admin), project.id, ProjectStatus::Completed)
        .await
        .unwrap();
    engine
        .delete_workflow(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_project_task_link_blocks_task_delete() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let photos = tree.task_ids()[2];

    let project = engine
        .register_project(
            Some(&admin),
            tree.workflow.id,
            "Van 3".into(),
            ProjectStatus::OnHold,
        )
        .await
        .unwrap();
    engine
        .link_project_task(Some(&admin), project.id, photos)
        .await
        .unwrap();

    let err = engine
        .batch_delete_tasks(Some(&admin), &[photos])
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));
    assert!(engine.get_task(Some(&admin), photos).await.is_ok());
}

#[tokio::test]
async fn test_edge_bearing_task_needs_batch_delete() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let mockup = tree.task_ids()[1];

    let err = engine.delete_task(Some(&admin), mockup).await.unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));

    // Batch delete removes the edges along with the task
    engine
        .batch_delete_tasks(Some(&admin), &[mockup])
        .await
        .unwrap();
    let edges = engine
        .list_dependencies(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
    assert!(edges.is_empty());
}

#[tokio::test]
async fn test_batch_update_is_all_or_nothing() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let design = &tree.phases[0].phase;

    // Renaming Design to Marketing collides with the untouched sibling;
    // the valid order change in the same batch must not land either.
    let items = vec![PhaseBatchItem {
        id: design.id,
        name: "Marketing".into(),
        description: design.description.clone(),
        order: 3,
        estimated_duration: design.estimated_duration,
    }];
    let err = engine
        .batch_update_phases(Some(&admin), items)
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::DuplicateName { .. }));

    let reloaded = engine.get_phase(Some(&admin), design.id).await.unwrap();
    assert_eq!(reloaded.name, "Design");
    assert_eq!(reloaded.order, 1);
}

#[tokio::test]
async fn test_batch_size_bound() {
    let engine = engine().await;
    let admin = admin();
    let ids: Vec<ForgeId> = (0..51).map(|_| ForgeId::new()).collect();
    let err = engine
        .batch_delete_tasks(Some(&admin), &ids)
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::Validation(_)));
}

#[tokio::test]
async fn test_reorder_validates_final_order_set() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let (design, marketing) = (tree.phases[0].phase.id, tree.phases[1].phase.id);

    // Order beyond the phase count
    let err = engine
        .reorder_phases(
            Some(&admin),
            ReorderPhases {
                workflow_id: tree.workflow.id,
                phases: vec![PhaseOrder {
                    id: design,
                    order: 3,
                }],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::OrderOutOfRange { .. }));

    // Partial set colliding with an untouched phase
    let err = engine
        .reorder_phases(
            Some(&admin),
            ReorderPhases {
                workflow_id: tree.workflow.id,
                phases: vec![PhaseOrder {
                    id: design,
                    order: 2,
                }],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::DuplicateOrder { .. }));

    // A full swap goes through
    let reordered = engine
        .reorder_phases(
            Some(&admin),
            ReorderPhases {
                workflow_id: tree.workflow.id,
                phases: vec![
                    PhaseOrder {
                        id: design,
                        order: 2,
                    },
                    PhaseOrder {
                        id: marketing,
                        order: 1,
                    },
                ],
            },
        )
        .await
        .unwrap();
    assert_eq!(reordered[0].name, "Marketing");
    assert_eq!(reordered[1].name, "Design");
}

#[tokio::test]
async fn test_batch_update_workflows_rename() {
    let engine = engine().await;
    let admin = admin();
    let a = engine
        .create_workflow(Some(&admin), workflow_req("A"))
        .await
        .unwrap();
    let b = engine
        .create_workflow(Some(&admin), workflow_req("B"))
        .await
        .unwrap();

    // Swapping two names inside one batch is legal because the batch is
    // checked as a whole against the rows outside it.
    let items = vec![
        flowforge_core::WorkflowBatchItem {
            id: a.id,
            name: "B".into(),
            description: a.description.clone(),
            version: a.version.clone(),
            is_active: true,
        },
        flowforge_core::WorkflowBatchItem {
            id: b.id,
            name: "A".into(),
            description: b.description.clone(),
            version: b.version.clone(),
            is_active: true,
        },
    ];
    let updated: Vec<Workflow> = engine
        .batch_update_workflows(Some(&admin), items)
        .await
        .unwrap();
    assert_eq!(updated[0].name, "B");
    assert_eq!(updated[1].name, "A");
}

#[tokio::test]
async fn test_file_backed_engine_persists_form_template() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("forge.db")).await.unwrap();
    let engine = WorkflowEngine::new(store);
    let admin = admin();

    let workflow = engine
        .create_workflow(Some(&admin), workflow_req("Persisted"))
        .await
        .unwrap();
    let phase = engine
        .create_phase(Some(&admin), workflow.id, phase_req("Intake", 1))
        .await
        .unwrap();
    let template = serde_json::json!({
        "fields": [{"name": "photos", "kind": "upload", "required": true}]
    });
    let task = engine
        .create_task(
            Some(&admin),
            phase.id,
            CreateTask {
                form_template: Some(template.clone()),
                ..task_req("Collect photos")
            },
        )
        .await
        .unwrap();

    let loaded = engine.get_task(Some(&admin), task.id).await.unwrap();
    assert_eq!(loaded.form_template, Some(template));
}

#[tokio::test]
async fn test_batch_update_phases_name_swap() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let design = &tree.phases[0].phase;
    let marketing = &tree.phases[1].phase;

    // Each phase takes the other's name; orders stay put
    let items = vec![
        PhaseBatchItem {
            id: design.id,
            name: "Marketing".into(),
            description: design.description.clone(),
            order: design.order,
            estimated_duration: design.estimated_duration,
        },
        PhaseBatchItem {
            id: marketing.id,
            name: "Design".into(),
            description: marketing.description.clone(),
            order: marketing.order,
            estimated_duration: marketing.estimated_duration,
        },
    ];
    engine.batch_update_phases(Some(&admin), items).await.unwrap();

    let reloaded = engine
        .list_phases(Some(&admin), tree.workflow.id)
        .await
        .unwrap();
    assert_eq!(reloaded[0].name, "Marketing");
    assert_eq!(reloaded[1].name, "Design");
}

#[tokio::test]
async fn test_batch_update_tasks_name_swap() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let survey = tree.phases[0].tasks[0].clone();
    let mockup = tree.phases[0].tasks[1].clone();

    let item = |task: &flowforge_core::Task, name: &str| TaskBatchItem {
        id: task.id,
        name: name.into(),
        description: task.description.clone(),
        estimated_hours: task.estimated_hours,
        priority: task.priority,
        required_skills: task.required_skills.clone(),
        form_template: task.form_template.clone(),
    };
    engine
        .batch_update_tasks(
            Some(&admin),
            vec![
                item(&survey, "Prepare mockup"),
                item(&mockup, "Survey vehicle"),
            ],
        )
        .await
        .unwrap();

    let renamed = engine.get_task(Some(&admin), survey.id).await.unwrap();
    assert_eq!(renamed.name, "Prepare mockup");
}

#[tokio::test]
async fn test_live_projects_block_batch_task_mutation() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let survey = tree.phases[0].tasks[0].clone();

    // Live project on the workflow, no project-task rows at all
    engine
        .register_project(
            Some(&admin),
            tree.workflow.id,
            "Truck 7".into(),
            ProjectStatus::Active,
        )
        .await
        .unwrap();

    let items = vec![TaskBatchItem {
        id: survey.id,
        name: "Survey trailer".into(),
        description: survey.description.clone(),
        estimated_hours: survey.estimated_hours,
        priority: survey.priority,
        required_skills: survey.required_skills.clone(),
        form_template: survey.form_template.clone(),
    }];
    let err = engine
        .batch_update_tasks(Some(&admin), items)
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));

    let err = engine
        .batch_delete_tasks(Some(&admin), &[survey.id])
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::HasLiveReferences { .. }));

    let untouched = engine.get_task(Some(&admin), survey.id).await.unwrap();
    assert_eq!(untouched.name, "Survey vehicle");
}

#[tokio::test]
async fn test_inactive_workflow_blocks_batch_phase_delete() {
    let engine = engine().await;
    let admin = admin();
    let workflow = engine
        .create_workflow(Some(&admin), workflow_req("Retired"))
        .await
        .unwrap();
    let phase = engine
        .create_phase(Some(&admin), workflow.id, phase_req("Intake", 1))
        .await
        .unwrap();
    engine
        .update_workflow(
            Some(&admin),
            workflow.id,
            UpdateWorkflow {
                name: "Retired".into(),
                description: None,
                version: "1.0".into(),
                is_active: false,
            },
        )
        .await
        .unwrap();

    let err = engine
        .batch_delete_phases(Some(&admin), &[phase.id])
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::InactiveWorkflow { .. }));
    assert!(engine.get_phase(Some(&admin), phase.id).await.is_ok());
}

#[tokio::test]
async fn test_task_with_edges_view() {
    let engine = engine().await;
    let admin = admin();
    let tree = seed_standard_wrap(&engine, &admin).await;
    let mockup = tree.task_ids()[1];

    let view = engine
        .get_task_with_edges(Some(&admin), mockup)
        .await
        .unwrap();
    assert_eq!(view.task.name, "Prepare mockup");
    assert_eq!(view.depends_on.len(), 1); // survey -> mockup
    assert_eq!(view.depended_on_by.len(), 1); // mockup -> photos
}
