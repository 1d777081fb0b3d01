//! A full planning workflow: build an epic with subtasks and blocking
//! edges through the store, then answer readiness, closability, and
//! implementation-order questions over the loaded snapshot.

use tempfile::TempDir;

use taskgraph::error::Error;
use taskgraph::store::TaskStore;
use taskgraph::task::{DependencyType, Priority, Task, TaskStatus, TaskType};
use taskgraph::{analysis, graph};

mod common;

fn seeded_store(dir: &TempDir) -> TaskStore {
    let store = TaskStore::open(dir.path().join("tasks.jsonl"));

    store
        .save(&Task::new("epic-1", "Ship the importer", TaskType::Epic))
        .unwrap();
    let mut design = Task::new("task-design", "Design the format", TaskType::Task);
    design.priority = Some(Priority::High);
    store.save(&design).unwrap();
    let mut build = Task::new("task-build", "Build the importer", TaskType::Feature);
    build.priority = Some(Priority::Urgent);
    store.save(&build).unwrap();
    store
        .save(&Task::new("task-docs", "Write the docs", TaskType::Docs))
        .unwrap();

    // Wire up the graph via the store's reload-mutate-persist path.
    store
        .update_all(|tasks| {
            let tasks =
                graph::add_dependency("task-design", "epic-1", DependencyType::ParentChild, &tasks)
                    .unwrap();
            let tasks =
                graph::add_dependency("task-build", "epic-1", DependencyType::ParentChild, &tasks)
                    .unwrap();
            let tasks =
                graph::add_dependency("task-build", "task-design", DependencyType::BlockedBy, &tasks)
                    .unwrap();
            graph::add_dependency("task-docs", "task-build", DependencyType::BlockedBy, &tasks)
                .unwrap()
        })
        .unwrap();

    store
}

#[test]
fn readiness_follows_blocking_edges() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let tasks = store.load().unwrap();

    let ready: Vec<String> = graph::get_ready_work(&tasks)
        .into_iter()
        .map(|t| t.id)
        .collect();
    // Only the unblocked leaves are ready; the epic has no blockers either.
    assert!(ready.contains(&"task-design".to_string()));
    assert!(ready.contains(&"epic-1".to_string()));
    assert!(!ready.contains(&"task-build".to_string()));
    assert!(!ready.contains(&"task-docs".to_string()));

    // Closing the design task unblocks the build.
    let tasks = store
        .update_all(|mut tasks| {
            for task in tasks.iter_mut() {
                if task.id == "task-design" {
                    task.set_status(TaskStatus::Closed);
                }
            }
            tasks
        })
        .unwrap();
    let ready: Vec<String> = graph::get_ready_work(&tasks)
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert!(ready.contains(&"task-build".to_string()));
    assert!(!ready.contains(&"task-docs".to_string()));
}

#[test]
fn epic_closability_rolls_up_from_subtasks() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let tasks = store.load().unwrap();

    let check = graph::can_close_task("epic-1", &tasks).unwrap();
    assert!(!check.can_close);
    let mut open = check.open_subtasks.clone();
    open.sort();
    assert_eq!(open, vec!["task-build", "task-design"]);
    assert!(!analysis::should_close_epic("epic-1", &tasks));

    let tasks = store
        .update_all(|mut tasks| {
            for task in tasks.iter_mut() {
                if task.id == "task-design" || task.id == "task-build" {
                    task.set_status(TaskStatus::Closed);
                }
            }
            tasks
        })
        .unwrap();

    let progress = analysis::epic_progress("epic-1", &tasks);
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.total, 2);
    assert_eq!(progress.percentage, 100);
    assert!(analysis::should_close_epic("epic-1", &tasks));

    let check = graph::can_close_task("epic-1", &tasks).unwrap();
    assert!(check.can_close);
    assert_eq!(check.completion_percentage, 100);
}

#[test]
fn cycle_prevention_protects_the_stored_graph() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let tasks = store.load().unwrap();

    // task-build is blocked by task-design; the reverse edge must be refused.
    assert!(graph::would_create_cycle(
        "task-design",
        "task-build",
        DependencyType::BlockedBy,
        &tasks
    ));
    let err = graph::add_dependency("task-design", "task-build", DependencyType::BlockedBy, &tasks)
        .expect_err("cycle");
    assert!(matches!(err, Error::Cycle { .. }));

    // Nothing was persisted by the refused call.
    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, tasks);
}

#[test]
fn implementation_order_respects_depth_and_priority() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let tasks = store.load().unwrap();

    let phases = analysis::implementation_order(&tasks);
    assert_eq!(phases.len(), 3);

    // Level 0: no blockers. epic-1 has no priority, task-design is high.
    assert_eq!(phases[0].task_ids, vec!["task-design", "epic-1"]);
    assert_eq!(phases[1].task_ids, vec!["task-build"]);
    assert_eq!(phases[2].task_ids, vec!["task-docs"]);

    let subset: Vec<String> = ["task-docs", "task-build", "task-design"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let order = analysis::topological_sort(&subset, &tasks);
    assert_eq!(order, vec!["task-design", "task-build", "task-docs"]);
}

#[test]
fn completion_blends_criteria_and_subtasks_through_the_store() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);

    let tasks = store
        .update_all(|mut tasks| {
            for task in tasks.iter_mut() {
                if task.id == "task-design" {
                    task.set_status(TaskStatus::Closed);
                }
                if task.id == "task-build" {
                    task.set_status(TaskStatus::Closed);
                }
            }
            tasks
        })
        .unwrap();

    let epic = tasks.iter().find(|t| t.id == "epic-1").unwrap();
    // No criteria of its own (0) blended with fully closed children (100).
    assert_eq!(epic.completion_percentage, 50);
}
