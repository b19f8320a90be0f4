// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution lease files.
//!
//! A running session heartbeats its lease file at a configurable
//! interval. After a crash the stale mtime lets the next startup detect
//! sessions that died without cleanup.

use crate::error::StorageError;
use crate::paths;
use tf_core::TaskId;

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Heartbeat file for one task's execution session.
#[derive(Debug, Clone)]
pub struct LeaseFile {
    path: PathBuf,
}

impl LeaseFile {
    pub fn new(root: impl Into<PathBuf>, task_id: &TaskId) -> Self {
        Self {
            path: paths::lease(&root.into(), task_id.as_str()),
        }
    }

    /// Touch the lease, creating it if needed.
    pub fn touch(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Rewrite the timestamp as content; mtime follows the write.
        std::fs::write(
            &self.path,
            format!("{}\n", chrono::Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    /// Remove the lease. Missing files are fine: clearing is idempotent.
    pub fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Age of the lease since the last heartbeat, if it exists.
    pub fn age(&self) -> Result<Option<Duration>, StorageError> {
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };
        let mtime = meta.modified()?;
        Ok(Some(
            SystemTime::now()
                .duration_since(mtime)
                .unwrap_or(Duration::ZERO),
        ))
    }
}

/// List task ids with a lease on disk, stale or not.
pub fn list_leases(root: &std::path::Path) -> Result<Vec<TaskId>, StorageError> {
    let dir = paths::leases_dir(root);
    let mut ids = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(StorageError::Io(e)),
    };
    for entry in entries {
        let entry = entry?;
        ids.push(TaskId::new(entry.file_name().to_string_lossy().to_string()));
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
