//! Record store for taskgraph
//!
//! Durable, validated, cross-process-safe persistence of the task list.
//!
//! # On-disk layout
//!
//! ```text
//! tasks.jsonl       # one JSON task per line, trailing newline, no envelope
//! tasks.lock        # held lock: { "owner_pid": .., "timestamp": epoch-ms }
//! tasks.json        # legacy name, adopted (copied) on first touch
//! ```
//!
//! Every mutating call runs reload-mutate-rewrite: the current list is
//! re-read under the cross-process lock (never the caller's stale copy),
//! mutated, re-validated as a whole, completion-recomputed, and atomically
//! rewritten. An in-process write gate serializes mutating calls from the
//! same process before they reach the file lock.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::graph;
use crate::lock::{self, StoreLock};
use crate::migrate::{self, LineDiagnostic};
use crate::task::{validate_all, Comment, Task};

/// Outcome of a full load, including what was skipped or rewritten.
#[derive(Debug)]
pub struct LoadReport {
    pub tasks: Vec<Task>,
    /// Lines that failed to parse or validate, recovered by skipping.
    pub skipped: Vec<LineDiagnostic>,
    /// True when migration changed the record set and the file was rewritten
    /// to canonical form.
    pub migrated: bool,
}

/// Handle to one record file. Cheap to clone; clones share the in-process
/// write gate.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
    config: StoreConfig,
    write_gate: Arc<Mutex<()>>,
}

impl TaskStore {
    /// Open a store at the given record-file path with default configuration.
    /// The file does not need to exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, StoreConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            path: path.into(),
            config,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the canonical record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling lock file, distinguished only by extension.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn legacy_path(&self) -> Option<PathBuf> {
        let legacy = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.config.legacy_file);
        (legacy != self.path).then_some(legacy)
    }

    fn acquire_lock(&self) -> Result<StoreLock> {
        StoreLock::acquire_with(
            self.lock_path(),
            self.config.stale_lock_ms,
            self.config.lock_retry_ms,
            self.config.lock_attempts,
        )
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        // A poisoned gate only means another caller panicked mid-operation;
        // the file itself is still consistent (atomic rewrites).
        self.write_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One-time adoption of a legacy-named record file: if the canonical file
    /// is absent but the legacy sibling exists, copy its bytes over. The
    /// legacy file stays in place unless `remove_legacy` is configured.
    fn adopt_legacy_file(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let Some(legacy) = self.legacy_path() else {
            return Ok(());
        };
        if !legacy.exists() {
            return Ok(());
        }

        debug!(
            legacy = %legacy.display(),
            canonical = %self.path.display(),
            "adopting legacy record file"
        );
        fs::copy(&legacy, &self.path)?;
        if self.config.remove_legacy {
            if let Err(e) = fs::remove_file(&legacy) {
                warn!(legacy = %legacy.display(), error = %e, "failed to remove legacy file");
            }
        }
        Ok(())
    }

    /// Read and migrate the current on-disk state. Does not persist anything;
    /// `changed` tells the caller whether convergence needs a rewrite.
    fn read_current(&self) -> Result<migrate::ParsedRecords> {
        self.adopt_legacy_file()?;

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(migrate::ParsedRecords::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut parsed = migrate::parse_records(&content);
        graph::recompute_completion(&mut parsed.tasks);
        Ok(parsed)
    }

    /// Load the record set, skipping unreadable lines. If migration changed
    /// anything the corrected list is re-persisted before returning, so the
    /// on-disk format converges to canonical form on first touch.
    pub fn load(&self) -> Result<Vec<Task>> {
        self.load_report().map(|report| report.tasks)
    }

    /// Like `load`, but also reports skipped-line diagnostics and whether a
    /// migration rewrite happened.
    pub fn load_report(&self) -> Result<LoadReport> {
        let parsed = self.read_current()?;
        if !parsed.changed {
            return Ok(LoadReport {
                tasks: parsed.tasks,
                skipped: parsed.skipped,
                migrated: false,
            });
        }

        // Converge the file under the lock. Re-read inside it: another
        // process may have written (or already converged) in between, so
        // only the locked re-read decides whether this call migrates.
        let _gate = self.gate();
        let _lock = self.acquire_lock()?;
        let parsed = self.read_current()?;
        let migrated = parsed.changed;
        if migrated {
            self.rewrite(&parsed.tasks)
                .map_err(|e| Error::Migration(format!("could not re-persist migrated records: {e}")))?;
            debug!(path = %self.path.display(), "migrated record file rewritten");
        }
        Ok(LoadReport {
            tasks: parsed.tasks,
            skipped: parsed.skipped,
            migrated,
        })
    }

    /// Persist a new task. If a task with the same id already exists the call
    /// is a silent no-op (idempotent create); otherwise one line is appended
    /// under the lock.
    pub fn save(&self, task: &Task) -> Result<()> {
        task.validate()?;

        let _gate = self.gate();
        let _lock = self.acquire_lock()?;
        let parsed = self.read_current()?;

        if parsed.tasks.iter().any(|existing| existing.id == task.id) {
            debug!(id = %task.id, "save is a no-op: id already exists");
            return Ok(());
        }

        let mut all = parsed.tasks;
        all.push(task.clone());
        graph::recompute_completion(&mut all);

        if parsed.changed {
            // The read needed migration anyway; converge with a full rewrite.
            return self.rewrite(&all);
        }

        let new_task = all.last().ok_or_else(|| {
            Error::InvalidArgument("record set empty after append".to_string())
        })?;
        self.append_line(new_task)
    }

    /// Reload-mutate-persist under the lock. The updater sees the freshly
    /// reloaded list, never the caller's stale copy. Every resulting task is
    /// validated and completion is recomputed for the whole set before the
    /// file is atomically rewritten; any validation failure aborts with
    /// nothing written.
    pub fn update_all<F>(&self, updater: F) -> Result<Vec<Task>>
    where
        F: FnOnce(Vec<Task>) -> Vec<Task>,
    {
        self.mutate(|tasks| Ok(updater(tasks)))
    }

    /// Append a comment with a generated id and current timestamp.
    pub fn add_comment(&self, task_id: &str, author: &str, text: &str) -> Result<Comment> {
        let comment = Comment::new(author, text);
        let appended = comment.clone();
        let task_id = task_id.to_string();

        self.mutate(move |mut tasks| {
            let task = tasks
                .iter_mut()
                .find(|task| task.id == task_id)
                .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
            task.updated_at = comment.created_at;
            task.comments.push(comment);
            Ok(tasks)
        })?;

        Ok(appended)
    }

    /// Remove a task and every dependency edge on surviving tasks that
    /// targets it.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.mutate(move |tasks| {
            if !tasks.iter().any(|task| task.id == id) {
                return Err(Error::TaskNotFound(id.clone()));
            }
            Ok(graph::remove_task(&id, &tasks))
        })?;
        Ok(())
    }

    fn mutate<F>(&self, updater: F) -> Result<Vec<Task>>
    where
        F: FnOnce(Vec<Task>) -> Result<Vec<Task>>,
    {
        let _gate = self.gate();
        let _lock = self.acquire_lock()?;

        let parsed = self.read_current()?;
        let mut next = updater(parsed.tasks)?;
        validate_all(&next)?;
        graph::recompute_completion(&mut next);
        self.rewrite(&next)?;
        Ok(next)
    }

    /// Full rewrite: temp file in the same directory, then rename into
    /// place, so concurrent unlocked readers never observe a partial file.
    fn rewrite(&self, tasks: &[Task]) -> Result<()> {
        let mut buffer = Vec::new();
        for task in tasks {
            let json = serde_json::to_string(task)?;
            buffer.extend_from_slice(json.as_bytes());
            buffer.push(b'\n');
        }
        lock::write_atomic(&self.path, &buffer)
    }

    fn append_line(&self, task: &Task) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(task)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Dependency, DependencyType, TaskStatus, TaskType};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TaskStore {
        TaskStore::open(dir.path().join("tasks.jsonl"))
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let task = Task::new("t-1", "First", TaskType::Feature);
        store.save(&task).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "t-1");
        assert_eq!(loaded[0].title, "First");
        assert_eq!(loaded[0].task_type, TaskType::Feature);
    }

    #[test]
    fn save_with_existing_id_is_a_silent_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&Task::new("t-1", "Original", TaskType::Task)).unwrap();
        store.save(&Task::new("t-1", "Imposter", TaskType::Task)).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "Original");
    }

    #[test]
    fn record_file_ends_with_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("t-1", "First", TaskType::Task)).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn update_all_sees_fresh_state_and_rewrites() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("t-1", "First", TaskType::Task)).unwrap();

        let updated = store
            .update_all(|mut tasks| {
                tasks[0].set_status(TaskStatus::InProgress);
                tasks.push(Task::new("t-2", "Second", TaskType::Task));
                tasks
            })
            .unwrap();
        assert_eq!(updated.len(), 2);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn failed_update_all_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("t-1", "First", TaskType::Task)).unwrap();
        let before = fs::read(store.path()).unwrap();

        let result = store.update_all(|mut tasks| {
            tasks[0].title = String::new();
            tasks
        });
        assert!(matches!(result, Err(Error::Validation { .. })));

        let after = fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn update_all_rejects_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("t-1", "First", TaskType::Task)).unwrap();

        let result = store.update_all(|mut tasks| {
            tasks.push(Task::new("t-1", "Clone", TaskType::Task));
            tasks
        });
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn completion_is_recomputed_not_trusted() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut task = Task::new("t-1", "First", TaskType::Task);
        task.completion_percentage = 87;
        store.save(&task).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].completion_percentage, 0);
    }

    #[test]
    fn add_comment_generates_id_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("t-1", "First", TaskType::Task)).unwrap();

        let comment = store.add_comment("t-1", "agent-7", "looks good").unwrap();
        assert!(!comment.id.is_empty());

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].comments.len(), 1);
        assert_eq!(loaded[0].comments[0].author, "agent-7");
        assert_eq!(loaded[0].comments[0].content, "looks good");
        assert_eq!(loaded[0].updated_at, comment.created_at);
    }

    #[test]
    fn add_comment_to_missing_task_errors() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let err = store.add_comment("ghost", "a", "b").expect_err("missing");
        assert!(matches!(err, Error::TaskNotFound(_)));
    }

    #[test]
    fn delete_task_clears_edges_pointing_at_it() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Task::new("parent", "Parent", TaskType::Epic)).unwrap();
        let mut child = Task::new("child", "Child", TaskType::Task);
        child
            .dependencies
            .push(Dependency::new("parent", DependencyType::ParentChild));
        store.save(&child).unwrap();

        store.delete_task("parent").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "child");
        assert!(loaded[0].dependencies.is_empty());
    }

    #[test]
    fn legacy_file_is_adopted_non_destructively() {
        let dir = TempDir::new().unwrap();
        let legacy_path = dir.path().join("tasks.json");
        let task = Task::new("t-1", "From legacy", TaskType::Task);
        let line = serde_json::to_string(&task).unwrap();
        fs::write(&legacy_path, format!("{line}\n")).unwrap();

        let store = store_in(&dir);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "From legacy");
        assert!(store.path().exists());
        assert!(legacy_path.exists());
    }

    #[test]
    fn legacy_file_removal_is_opt_in() {
        let dir = TempDir::new().unwrap();
        let legacy_path = dir.path().join("tasks.json");
        let task = Task::new("t-1", "From legacy", TaskType::Task);
        let line = serde_json::to_string(&task).unwrap();
        fs::write(&legacy_path, format!("{line}\n")).unwrap();

        let mut config = StoreConfig::default();
        config.remove_legacy = true;
        let store = TaskStore::with_config(dir.path().join("tasks.jsonl"), config);

        assert_eq!(store.load().unwrap().len(), 1);
        assert!(!legacy_path.exists());
    }

    #[test]
    fn migration_rewrites_file_on_first_touch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        let task = Task::new("t-1", "Legacy status", TaskType::Task);
        let line = serde_json::to_string(&task)
            .unwrap()
            .replace("\"open\"", "\"blocked\"");
        fs::write(&path, format!("{line}\n")).unwrap();

        let store = TaskStore::open(&path);
        let report = store.load_report().unwrap();
        assert!(report.migrated);
        assert_eq!(report.tasks[0].status, TaskStatus::Open);

        // On-disk form converged: a second load sees canonical records.
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("blocked"));
        let report = store.load_report().unwrap();
        assert!(!report.migrated);
    }

    #[test]
    fn skipped_lines_are_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        let good = serde_json::to_string(&Task::new("t-1", "Good", TaskType::Task)).unwrap();
        fs::write(&path, format!("{{ broken\n{good}\n")).unwrap();

        let store = TaskStore::open(&path);
        let report = store.load_report().unwrap();
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.skipped.len(), 1);
    }
}
