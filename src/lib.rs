//! taskgraph - Task Dependency Graph + Durable Record Store
//!
//! A small persistent task-tracking store for collaborative (human + agent)
//! software work: tasks with status, priority, acceptance criteria, and typed
//! relationships to other tasks, durable on disk as newline-delimited JSON
//! and safe under concurrent access from multiple processes.
//!
//! # Core Concepts
//!
//! - **Record store**: owns all I/O and cross-process coordination; loads,
//!   appends, and atomically rewrites the record file under a lock
//! - **Dependency graph engine**: pure queries over an in-memory snapshot -
//!   readiness, closability, completion roll-up, cycle detection
//! - **Analysis layer**: epic progress and priority-ordered implementation
//!   sequencing built on the graph engine
//! - **Migration**: legacy spellings converge to canonical form on first
//!   touch; unreadable lines are skipped and reported, never fatal
//!
//! # Module Organization
//!
//! - `analysis`: epic roll-ups, cycle reports, implementation ordering
//! - `config`: store tunables, loadable from TOML
//! - `error`: error types and result alias
//! - `graph`: pure dependency-graph queries and list transformations
//! - `lock`: cross-process lock file protocol and atomic writes
//! - `migrate`: record normalization and schema migration
//! - `store`: durable record store (load / save / update_all)
//! - `task`: the task data model and validation

pub mod analysis;
pub mod config;
pub mod error;
pub mod graph;
pub mod lock;
pub mod migrate;
pub mod store;
pub mod task;

pub use error::{Error, Result};
