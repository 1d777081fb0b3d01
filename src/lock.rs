//! Cross-process locking and atomic writes
//!
//! This module provides concurrency-safe file operations:
//! - A sibling lock file (`tasks.lock`) created with exclusive-create,
//!   holding the owner pid and an epoch-millis timestamp
//! - Stale-lock recovery: a lock older than the configured timeout is
//!   removed and acquisition retried
//! - Bounded retry with fixed back-off, failing with `LockTimeout`
//! - Atomic write pattern (write temp + rename)
//!
//! The lock grants mutual exclusion for the reload-mutate-rewrite critical
//! section only; readers outside the lock rely on atomic rewrites never
//! exposing a partial file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default age in milliseconds after which a lock is considered abandoned.
pub const DEFAULT_STALE_LOCK_MS: u64 = 30_000;

/// Default back-off between acquisition attempts.
pub const DEFAULT_LOCK_RETRY_MS: u64 = 50;

/// Default total acquisition attempts before giving up.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 100;

/// Contents of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner_pid: u32,
    /// Epoch millis at acquisition time.
    pub timestamp: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// A held cross-process lock. The lock file is removed on drop, including
/// the unwind path when the protected operation panics.
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock with the default retry budget.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        Self::acquire_with(
            path,
            DEFAULT_STALE_LOCK_MS,
            DEFAULT_LOCK_RETRY_MS,
            DEFAULT_LOCK_ATTEMPTS,
        )
    }

    /// Acquire the lock with an explicit stale timeout, retry delay, and
    /// attempt budget.
    ///
    /// Each attempt tries an exclusive create of the lock file. If the file
    /// already exists and its recorded timestamp (or, for an unreadable
    /// body, its mtime) is older than `stale_ms`, the lock is removed and
    /// creation retried without sleeping; otherwise the attempt backs off
    /// `retry_ms` before the next try.
    pub fn acquire_with(
        path: impl AsRef<Path>,
        stale_ms: u64,
        retry_ms: u64,
        attempts: u32,
    ) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        for attempt in 0..attempts.max(1) {
            match try_create(path) {
                Ok(()) => return Ok(StoreLock {
                    path: path.to_path_buf(),
                }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(path, stale_ms) {
                        warn!(lock = %path.display(), "removing stale lock file");
                        match fs::remove_file(path) {
                            Ok(()) => continue,
                            // Lost the race to another remover; retry create.
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(Error::Io(e)),
                        }
                    }
                    if attempt + 1 < attempts {
                        std::thread::sleep(Duration::from_millis(retry_ms));
                    }
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::LockTimeout(path.to_path_buf()))
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Release the lock - ignore errors during drop
        let _ = fs::remove_file(&self.path);
    }
}

fn try_create(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let info = LockInfo {
        owner_pid: std::process::id(),
        timestamp: now_ms(),
    };
    let body = serde_json::to_string(&info).map_err(io::Error::other)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Read the lock file and decide whether the holder has exceeded the stale
/// timeout. A vanished file is not stale (the next create attempt will just
/// succeed); an unreadable body falls back to the file mtime, and a file
/// with no usable age at all is treated as stale.
fn lock_is_stale(path: &Path, stale_ms: u64) -> bool {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
        Err(_) => return mtime_is_stale(path, stale_ms),
    };

    match serde_json::from_str::<LockInfo>(&body) {
        Ok(info) => now_ms().saturating_sub(info.timestamp) > stale_ms,
        Err(_) => mtime_is_stale(path, stale_ms),
    }
}

fn mtime_is_stale(path: &Path, stale_ms: u64) -> bool {
    match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => match modified.elapsed() {
            Ok(age) => age > Duration::from_millis(stale_ms),
            Err(_) => false,
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(_) => true,
    }
}

/// Atomically write data to a file
///
/// This writes to a temporary file in the same directory, then renames
/// it to the target path. This ensures the file is either fully written
/// or not modified at all.
///
/// Note: This does NOT acquire a lock. Callers coordinating with other
/// processes hold a `StoreLock` around the whole reload-mutate-rewrite
/// sequence.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Temp file in the same directory (required for atomic rename)
    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;

    Ok(())
}
