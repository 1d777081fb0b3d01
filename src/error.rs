//! Error types for taskgraph
//!
//! Failure policy:
//! - load-time record errors are recovered locally (skip + report); they never
//!   surface as `Error`
//! - everything else propagates to the caller unmodified
//! - no operation leaves a partially written record file behind

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for taskgraph operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A task or dependency failed schema rules on save/update.
    /// For `update_all` this rejects the whole batch.
    #[error("Validation failed for task '{id}': {reason}")]
    Validation { id: String, reason: String },

    /// The exclusive lock could not be acquired within the retry budget.
    /// The store does not retry on its own; the caller may.
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(PathBuf),

    /// The requested edge would close a cycle in a semantic class that must
    /// stay acyclic (blocking, parent-child).
    #[error("Dependency {from} -> {to} would create a {class} cycle")]
    Cycle {
        from: String,
        to: String,
        class: String,
    },

    /// Schema migration could not be completed or re-persisted. Surfaced
    /// loudly rather than silently dropping unmigrated data.
    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for taskgraph operations
pub type Result<T> = std::result::Result<T, Error>;
