//! Schema migration for the record file.
//!
//! The store converges the on-disk format to canonical form on first touch:
//! every line is normalized while it is still raw JSON (legacy status and
//! dependency-type spellings), then decoded, then the typed record set gets a
//! migration pass (duplicate ids, mutual blocked_by pairs). If anything
//! changed, the caller re-persists the corrected list before using it.
//!
//! Lines that cannot be salvaged are skipped, never fatal: their errors are
//! collected as diagnostics and loading proceeds with the rest.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::warn;

use crate::task::{DependencyType, Task};

/// A skipped or altered line, reported alongside the parsed records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiagnostic {
    /// 1-based line number in the record file.
    pub line: usize,
    pub message: String,
}

/// Outcome of parsing and migrating the raw record file contents.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub tasks: Vec<Task>,
    pub skipped: Vec<LineDiagnostic>,
    /// True when the canonical form differs from what was read, meaning the
    /// file should be rewritten.
    pub changed: bool,
}

/// Map a dependency-type spelling to its canonical wire name.
/// Returns `None` for unmappable values; those dependencies are dropped.
fn canonical_dep_type(raw: &str) -> Option<&'static str> {
    match raw {
        "blocked_by" | "blocked-by" | "depends_on" | "depends-on" => Some("blocked_by"),
        "parent-child" | "parent_child" | "child-of" | "subtask-of" => Some("parent-child"),
        "related" | "related_to" | "related-to" | "relates-to" => Some("related"),
        "discovered-from" | "discovered_from" => Some("discovered-from"),
        _ => None,
    }
}

/// Normalize one raw record in place. Returns whether anything was rewritten
/// plus human-readable notes for dropped dependencies.
fn normalize_record(value: &mut Value) -> (bool, Vec<String>) {
    let mut changed = false;
    let mut notes = Vec::new();

    let Some(obj) = value.as_object_mut() else {
        return (changed, notes);
    };

    // "blocked" was never a real status; it is derived from blocking edges.
    if obj.get("status").and_then(Value::as_str) == Some("blocked") {
        obj.insert("status".to_string(), Value::String("open".to_string()));
        changed = true;
    }

    if let Some(deps) = obj.get_mut("dependencies").and_then(Value::as_array_mut) {
        deps.retain_mut(|dep| {
            let Some(raw) = dep.get("type").and_then(Value::as_str) else {
                notes.push("dropped dependency with missing type".to_string());
                changed = true;
                return false;
            };
            match canonical_dep_type(raw) {
                Some(canonical) => {
                    if canonical != raw {
                        changed = true;
                        if let Some(dep_obj) = dep.as_object_mut() {
                            dep_obj.insert(
                                "type".to_string(),
                                Value::String(canonical.to_string()),
                            );
                        }
                    }
                    true
                }
                None => {
                    notes.push(format!("dropped dependency with unknown type '{raw}'"));
                    changed = true;
                    false
                }
            }
        });
    }

    (changed, notes)
}

/// For each pair of tasks that mutually declare `blocked_by` on each other,
/// keep exactly one direction: the edge stored on the task with the smaller
/// id survives, the edge on the larger id is removed.
pub fn dedupe_mutual_blocks(tasks: &mut [Task]) -> bool {
    let blocks: HashSet<(String, String)> = tasks
        .iter()
        .flat_map(|task| {
            task.targets_of(DependencyType::BlockedBy)
                .map(|target| (task.id.clone(), target.to_string()))
        })
        .collect();

    let mut changed = false;
    for task in tasks.iter_mut() {
        let id = task.id.clone();
        task.dependencies.retain(|dep| {
            let mutual = dep.dep_type == DependencyType::BlockedBy
                && blocks.contains(&(dep.id.clone(), id.clone()));
            if mutual && id > dep.id {
                changed = true;
                false
            } else {
                true
            }
        });
    }
    changed
}

/// Parse the raw record file contents: one JSON object per line. Malformed or
/// schema-invalid lines are skipped with a diagnostic; duplicate ids keep the
/// first occurrence; mutual blocked_by pairs are reduced to one direction.
pub fn parse_records(content: &str) -> ParsedRecords {
    let mut parsed = ParsedRecords::default();
    let mut seen_ids: HashMap<String, usize> = HashMap::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let mut value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                parsed.skip(line_no, format!("malformed JSON: {e}"));
                continue;
            }
        };

        let (changed, notes) = normalize_record(&mut value);
        parsed.changed |= changed;
        for note in notes {
            parsed.skip(line_no, note);
        }

        let task: Task = match serde_json::from_value(value) {
            Ok(task) => task,
            Err(e) => {
                parsed.skip(line_no, format!("schema-invalid record: {e}"));
                continue;
            }
        };

        if let Err(e) = task.validate() {
            parsed.skip(line_no, format!("invalid record: {e}"));
            continue;
        }

        if let Some(first) = seen_ids.get(&task.id) {
            parsed.skip(
                line_no,
                format!("duplicate id '{}' (first seen on line {first})", task.id),
            );
            parsed.changed = true;
            continue;
        }
        seen_ids.insert(task.id.clone(), line_no);
        parsed.tasks.push(task);
    }

    parsed.changed |= dedupe_mutual_blocks(&mut parsed.tasks);
    parsed
}

impl ParsedRecords {
    fn skip(&mut self, line: usize, message: String) {
        warn!(line, %message, "record file diagnostic");
        self.skipped.push(LineDiagnostic { line, message });
    }
}
