//! Epic roll-ups and implementation-order analysis.
//!
//! Composite read-only queries layered on the graph engine, used for
//! human-facing reports: which subtasks an epic still has open, whether it
//! can roll up, which tasks form blocking cycles, and what order the set
//! should be implemented in.

use std::collections::{HashMap, HashSet};

use crate::graph::{build_index, children_of};
use crate::task::{priority_weight, DependencyType, Task};

/// Subtasks of an epic: tasks with a parent-child edge pointing at it.
pub fn epic_subtasks<'a>(id: &str, tasks: &'a [Task]) -> Vec<&'a Task> {
    children_of(id, tasks)
}

/// Tasks with no parent, i.e. the top level of the hierarchy view.
pub fn non_parented_tasks(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| {
            !task
                .dependencies
                .iter()
                .any(|dep| dep.dep_type == DependencyType::ParentChild)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpicProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

/// Closed-subtask count for an epic. An epic with no subtasks reports 0/0/0.
pub fn epic_progress(id: &str, tasks: &[Task]) -> EpicProgress {
    let subtasks = epic_subtasks(id, tasks);
    let total = subtasks.len();
    let completed = subtasks.iter().filter(|task| task.is_closed()).count();
    let percentage = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u8
    };
    EpicProgress {
        completed,
        total,
        percentage,
    }
}

/// True iff every subtask is closed. An epic with no subtasks rolls up.
pub fn should_close_epic(id: &str, tasks: &[Task]) -> bool {
    epic_subtasks(id, tasks).iter().all(|task| task.is_closed())
}

/// Find every distinct blocking cycle, each reported once as an ordered id
/// sequence canonicalized to start at its smallest member.
pub fn detect_cycles(tasks: &[Task]) -> Vec<Vec<String>> {
    let index = build_index(tasks);
    let mut done: HashSet<&str> = HashSet::new();
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();
    let mut cycles = Vec::new();

    for task in tasks {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        dfs_cycles(
            task.id.as_str(),
            &index,
            &mut path,
            &mut on_path,
            &mut done,
            &mut seen_cycles,
            &mut cycles,
        );
    }

    cycles
}

fn dfs_cycles<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a Task>,
    path: &mut Vec<&'a str>,
    on_path: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
    seen_cycles: &mut HashSet<Vec<String>>,
    cycles: &mut Vec<Vec<String>>,
) {
    if on_path.contains(id) {
        let start = path.iter().position(|entry| *entry == id).unwrap_or(0);
        let cycle = canonical_cycle(&path[start..]);
        if seen_cycles.insert(cycle.clone()) {
            cycles.push(cycle);
        }
        return;
    }
    if done.contains(id) {
        return;
    }

    let Some(task) = index.get(id) else {
        return;
    };

    path.push(id);
    on_path.insert(id);
    for target in task.targets_of(DependencyType::BlockedBy) {
        dfs_cycles(target, index, path, on_path, done, seen_cycles, cycles);
    }
    on_path.remove(id);
    path.pop();
    done.insert(id);
}

/// Rotate a cycle so it starts at its smallest id, preserving edge order.
fn canonical_cycle(ids: &[&str]) -> Vec<String> {
    let Some(min_pos) = (0..ids.len()).min_by_key(|&pos| ids[pos]) else {
        return Vec::new();
    };
    ids[min_pos..]
        .iter()
        .chain(ids[..min_pos].iter())
        .map(|id| id.to_string())
        .collect()
}

/// Dependency-respecting order for a subset of tasks: every task appears
/// after the blockers it depends on (postorder DFS, so blockers are emitted
/// first). Only blocking edges with both endpoints in the subset count;
/// cyclic members are emitted in visit order.
pub fn topological_sort(subset: &[String], tasks: &[Task]) -> Vec<String> {
    let members: HashSet<&str> = subset.iter().map(String::as_str).collect();
    let index = build_index(tasks);
    let mut order: Vec<String> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    for id in subset {
        visit_postorder(id.as_str(), &members, &index, &mut visited, &mut order);
    }

    order
}

fn visit_postorder<'a>(
    id: &'a str,
    members: &HashSet<&str>,
    index: &HashMap<&'a str, &'a Task>,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) {
    if !members.contains(id) || !visited.insert(id) {
        return;
    }
    if let Some(task) = index.get(id) {
        for target in task.targets_of(DependencyType::BlockedBy) {
            visit_postorder(target, members, index, visited, order);
        }
    }
    // Blockers were appended first, so dependents land after them.
    order.push(id.to_string());
}

/// Blocking depth of one task: 0 with no resolvable blocking dependencies,
/// else one more than the deepest blocker. Memoized; a blocker already on
/// the recursion path contributes 0.
pub fn priority_level(id: &str, tasks: &[Task]) -> u32 {
    let index = build_index(tasks);
    let mut memo = HashMap::new();
    let mut on_path = HashSet::new();
    level_of(id, &index, &mut memo, &mut on_path)
}

fn level_of<'a>(
    id: &'a str,
    index: &HashMap<&'a str, &'a Task>,
    memo: &mut HashMap<&'a str, u32>,
    on_path: &mut HashSet<&'a str>,
) -> u32 {
    if let Some(level) = memo.get(id) {
        return *level;
    }
    if !on_path.insert(id) {
        return 0;
    }

    let level = match index.get(id) {
        Some(task) => task
            .targets_of(DependencyType::BlockedBy)
            .filter(|target| index.contains_key(target))
            .map(|target| level_of(target, index, memo, on_path))
            .max()
            .map(|deepest| deepest + 1)
            .unwrap_or(0),
        None => 0,
    };

    on_path.remove(id);
    memo.insert(id, level);
    level
}

/// One phase of the implementation-order report: tasks whose blocking depth
/// is `level`, ordered by priority weight descending (ties by id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseGroup {
    pub level: u32,
    pub task_ids: Vec<String>,
}

/// Group the whole set by blocking depth for a priority-ordered
/// implementation sequence: shallow phases first, urgent work first within
/// each phase.
pub fn implementation_order(tasks: &[Task]) -> Vec<PhaseGroup> {
    let index = build_index(tasks);
    let mut memo = HashMap::new();
    let mut by_level: HashMap<u32, Vec<&Task>> = HashMap::new();

    for task in tasks {
        let mut on_path = HashSet::new();
        let level = level_of(task.id.as_str(), &index, &mut memo, &mut on_path);
        by_level.entry(level).or_default().push(task);
    }

    let mut levels: Vec<u32> = by_level.keys().copied().collect();
    levels.sort_unstable();

    levels
        .into_iter()
        .map(|level| {
            let mut members = by_level.remove(&level).unwrap_or_default();
            members.sort_by(|a, b| {
                priority_weight(b.priority)
                    .cmp(&priority_weight(a.priority))
                    .then_with(|| a.id.cmp(&b.id))
            });
            PhaseGroup {
                level,
                task_ids: members.into_iter().map(|task| task.id.clone()).collect(),
            }
        })
        .collect()
}
