//! Task data model for taskgraph.
//!
//! Tasks are stored one JSON object per line in `tasks.jsonl`. The schema is
//! fixed: a task carries its status, priority, acceptance criteria, comments,
//! and the outgoing half of every typed relationship. Inverse relations
//! (who blocks me, who are my children) are always computed by scanning the
//! record set, never stored redundantly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Epic,
    Feature,
    Task,
    Bug,
    Chore,
    Docs,
    Refactor,
}

/// Stored status values. "blocked" is a derived display state computed from
/// blocking dependencies and is never persisted; any legacy stored "blocked"
/// is rewritten to `Open` by migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Closed,
}

impl TaskStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Ordering weight used by implementation-order planning.
    pub fn weight(self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// Weight for an optional priority; tasks without one sort last.
pub fn priority_weight(priority: Option<Priority>) -> u8 {
    priority.map(Priority::weight).unwrap_or(0)
}

/// The canonical relationship types. `BlockedBy` and `ParentChild` each form
/// a semantic class that must stay acyclic; `Related` and `DiscoveredFrom`
/// are annotations with no structural meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    #[serde(rename = "blocked_by")]
    BlockedBy,
    #[serde(rename = "parent-child")]
    ParentChild,
    #[serde(rename = "related")]
    Related,
    #[serde(rename = "discovered-from")]
    DiscoveredFrom,
}

impl DependencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyType::BlockedBy => "blocked_by",
            DependencyType::ParentChild => "parent-child",
            DependencyType::Related => "related",
            DependencyType::DiscoveredFrom => "discovered-from",
        }
    }

    /// Name of the acyclic semantic class this type belongs to, if any.
    pub fn semantic_class(self) -> Option<&'static str> {
        match self {
            DependencyType::BlockedBy => Some("blocking"),
            DependencyType::ParentChild => Some("parent-child"),
            DependencyType::Related | DependencyType::DiscoveredFrom => None,
        }
    }
}

/// A typed edge from the task that stores it to `id`.
///
/// `blocked_by`: this task is not ready/closable until `id` is closed.
/// `parent-child`: this task is a child of `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
}

impl Dependency {
    pub fn new(id: impl Into<String>, dep_type: DependencyType) -> Self {
        Self {
            id: id.into(),
            dep_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author: author.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, caller-assigned, immutable.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    /// Derived; recomputed on every load and write, never trusted as input.
    #[serde(default)]
    pub completion_percentage: u8,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            task_type,
            status: TaskStatus::Open,
            priority: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            dependencies: Vec::new(),
            acceptance_criteria: Vec::new(),
            comments: Vec::new(),
            completion_percentage: 0,
        }
    }

    /// Set the status, maintaining `closed_at` and `updated_at`. Reopening a
    /// closed task clears `closed_at`; there is no terminal-state restriction.
    pub fn set_status(&mut self, status: TaskStatus) {
        let now = Utc::now();
        if status.is_closed() {
            if self.closed_at.is_none() {
                self.closed_at = Some(now);
            }
        } else {
            self.closed_at = None;
        }
        self.status = status;
        self.updated_at = now;
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Outgoing dependency targets of the given type.
    pub fn targets_of(&self, dep_type: DependencyType) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(move |dep| dep.dep_type == dep_type)
            .map(|dep| dep.id.as_str())
    }

    pub fn has_dependency(&self, target: &str, dep_type: DependencyType) -> bool {
        self.dependencies
            .iter()
            .any(|dep| dep.id == target && dep.dep_type == dep_type)
    }

    /// Schema rules enforced on save/update. Targets referencing unknown ids
    /// are tolerated here; resolvability is a graph concern.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation {
                id: self.id.clone(),
                reason: "task id cannot be empty".to_string(),
            });
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation {
                id: self.id.clone(),
                reason: "task title cannot be empty".to_string(),
            });
        }
        for dep in &self.dependencies {
            if dep.id.trim().is_empty() {
                return Err(Error::Validation {
                    id: self.id.clone(),
                    reason: "dependency target cannot be empty".to_string(),
                });
            }
            if dep.id == self.id {
                return Err(Error::Validation {
                    id: self.id.clone(),
                    reason: format!("dependency on itself ({})", dep.dep_type.as_str()),
                });
            }
        }
        Ok(())
    }
}

/// Validate every task plus set-wide id uniqueness. Used by `update_all`
/// before anything touches disk (all-or-nothing).
pub fn validate_all(tasks: &[Task]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for task in tasks {
        task.validate()?;
        if !seen.insert(task.id.as_str()) {
            return Err(Error::Validation {
                id: task.id.clone(),
                reason: "duplicate task id".to_string(),
            });
        }
    }
    Ok(())
}
