//! Dependency graph engine.
//!
//! Pure, synchronous queries and list-transformations over an in-memory task
//! list. The graph is never materialized: every call rebuilds the adjacency
//! it needs from the flat record list, and every traversal carries an
//! explicit visited set so cyclic data stays a bounded case.
//!
//! This module performs no I/O; the store feeds it snapshots.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::task::{Dependency, DependencyType, Task, TaskStatus};

/// O(n) id index, rebuilt per call.
pub fn build_index(tasks: &[Task]) -> HashMap<&str, &Task> {
    tasks.iter().map(|task| (task.id.as_str(), task)).collect()
}

/// Children of `parent_id` under the parent-child relation. The edge is
/// stored child-side, so this scans for dependencies pointing back.
pub fn children_of<'a>(parent_id: &str, tasks: &'a [Task]) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| task.has_dependency(parent_id, DependencyType::ParentChild))
        .collect()
}

/// Read-only reachability check: would adding `from -> to` of `dep_type`
/// close a cycle in that type's semantic class? Always false for relation
/// types with no acyclicity requirement.
pub fn would_create_cycle(from: &str, to: &str, dep_type: DependencyType, tasks: &[Task]) -> bool {
    if dep_type.semantic_class().is_none() {
        return false;
    }

    let index = build_index(tasks);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![to];

    while let Some(id) = stack.pop() {
        if id == from {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        if let Some(task) = index.get(id) {
            stack.extend(task.targets_of(dep_type));
        }
    }

    false
}

/// Return a new list with the edge appended to `from`'s dependency list.
///
/// Acyclicity is enforced here, not just advisorily: for blocking and
/// parent-child edges the call fails with `Error::Cycle` rather than
/// creating a cycle. Re-adding an existing edge is a no-op.
pub fn add_dependency(
    from: &str,
    to: &str,
    dep_type: DependencyType,
    tasks: &[Task],
) -> Result<Vec<Task>> {
    if from == to {
        return Err(Error::InvalidArgument(format!(
            "task cannot depend on itself: {from}"
        )));
    }
    if !tasks.iter().any(|task| task.id == from) {
        return Err(Error::TaskNotFound(from.to_string()));
    }

    if tasks
        .iter()
        .any(|task| task.id == from && task.has_dependency(to, dep_type))
    {
        return Ok(tasks.to_vec());
    }

    if let Some(class) = dep_type.semantic_class() {
        if would_create_cycle(from, to, dep_type, tasks) {
            return Err(Error::Cycle {
                from: from.to_string(),
                to: to.to_string(),
                class: class.to_string(),
            });
        }
    }

    let mut next = tasks.to_vec();
    for task in next.iter_mut() {
        if task.id == from {
            task.dependencies.push(Dependency::new(to, dep_type));
        }
    }
    Ok(next)
}

/// Return a new list with every `from -> to` edge removed, regardless of
/// type. No-op if no such edge exists.
pub fn remove_dependency(from: &str, to: &str, tasks: &[Task]) -> Vec<Task> {
    let mut next = tasks.to_vec();
    for task in next.iter_mut() {
        if task.id == from {
            task.dependencies.retain(|dep| dep.id != to);
        }
    }
    next
}

/// Return a new list without the task and without any dependency edge on a
/// surviving task that targets it.
pub fn remove_task(id: &str, tasks: &[Task]) -> Vec<Task> {
    let mut next: Vec<Task> = tasks.iter().filter(|task| task.id != id).cloned().collect();
    for task in next.iter_mut() {
        task.dependencies.retain(|dep| dep.id != id);
    }
    next
}

/// The derived "blocked" display state: not closed, and at least one
/// resolvable blocking dependency is still open. Targets referencing unknown
/// ids are tolerated and do not block.
pub fn is_blocked(task: &Task, tasks: &[Task]) -> bool {
    if task.is_closed() {
        return false;
    }
    let index = build_index(tasks);
    task.targets_of(DependencyType::BlockedBy)
        .any(|target| index.get(target).is_some_and(|dep| !dep.is_closed()))
}

/// All open tasks whose every resolvable blocking dependency is closed.
/// Non-blocking relationship types never affect readiness.
pub fn get_ready_work(tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Open && !is_blocked(task, tasks))
        .cloned()
        .collect()
}

/// Recursively derived 0-100 progress value.
///
/// Closed tasks are 100. Otherwise the task's own acceptance-criteria
/// completion is blended 50/50 with the average completion of its
/// parent-child children; tasks already on the current recursion path
/// contribute 0 instead of recursing again, so cyclic parent-child data
/// still terminates.
pub fn calculate_completion_percentage(task: &Task, tasks: &[Task]) -> u8 {
    let mut path = HashSet::new();
    completion(task, tasks, &mut path) as u8
}

fn completion(task: &Task, tasks: &[Task], path: &mut HashSet<String>) -> f64 {
    if task.is_closed() {
        return 100.0;
    }
    if !path.insert(task.id.clone()) {
        return 0.0;
    }

    let own = if task.acceptance_criteria.is_empty() {
        0.0
    } else {
        let completed = task
            .acceptance_criteria
            .iter()
            .filter(|criterion| criterion.completed)
            .count();
        completed as f64 / task.acceptance_criteria.len() as f64 * 100.0
    };

    let children = children_of(&task.id, tasks);
    let result = if children.is_empty() {
        own.round()
    } else {
        let sum: f64 = children
            .iter()
            .map(|child| completion(child, tasks, path))
            .sum();
        let child_avg = sum / children.len() as f64;
        ((own + child_avg) / 2.0).round()
    };

    path.remove(&task.id);
    result
}

/// Recompute `completion_percentage` for a whole set. The store runs this on
/// every load and before every persist; stored values are never trusted.
pub fn recompute_completion(tasks: &mut [Task]) {
    let values: Vec<u8> = tasks
        .iter()
        .map(|task| calculate_completion_percentage(task, tasks))
        .collect();
    for (task, value) in tasks.iter_mut().zip(values) {
        task.completion_percentage = value;
    }
}

/// Result of a close-eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseCheck {
    pub can_close: bool,
    /// Human-readable refusal reason, present iff `can_close` is false.
    pub reason: Option<String>,
    /// Ids of not-yet-closed parent-child children, for the caller to present.
    pub open_subtasks: Vec<String>,
    pub completion_percentage: u8,
}

/// Closing is permitted only at exactly 100% completion. A refusal carries
/// the open subtasks and a reason the caller can show as-is.
pub fn can_close_task(id: &str, tasks: &[Task]) -> Result<CloseCheck> {
    let task = tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

    let percentage = calculate_completion_percentage(task, tasks);
    if percentage == 100 {
        return Ok(CloseCheck {
            can_close: true,
            reason: None,
            open_subtasks: Vec::new(),
            completion_percentage: percentage,
        });
    }

    let open_subtasks: Vec<String> = children_of(id, tasks)
        .into_iter()
        .filter(|child| !child.is_closed())
        .map(|child| child.id.clone())
        .collect();

    let reason = if open_subtasks.is_empty() {
        format!("completion is {percentage}%, not 100%")
    } else {
        format!(
            "completion is {percentage}%, not 100% ({} open subtask{})",
            open_subtasks.len(),
            if open_subtasks.len() == 1 { "" } else { "s" }
        )
    };

    Ok(CloseCheck {
        can_close: false,
        reason: Some(reason),
        open_subtasks,
        completion_percentage: percentage,
    })
}
