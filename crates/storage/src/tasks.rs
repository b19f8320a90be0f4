// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task on-disk records.
//!
//! Each task lives in `tasks/<id>/` with a YAML record next to its
//! attachments and summary. The task directory is the serialization
//! boundary for one task: callers that mutate must re-read then write
//! under the task mutex held by the engine.

use crate::error::StorageError;
use crate::paths;
use crate::write_atomic;
use tf_core::{Task, TaskId};

use std::path::{Path, PathBuf};

/// Reads and writes task records under a workspace root.
#[derive(Debug, Clone)]
pub struct TaskDir {
    root: PathBuf,
}

impl TaskDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a single task.
    pub fn dir(&self, id: &TaskId) -> PathBuf {
        paths::task_dir(&self.root, id.as_str())
    }

    /// Load one task record.
    pub fn load(&self, id: &TaskId) -> Result<Task, StorageError> {
        let path = paths::task_record(&self.root, id.as_str());
        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(format!("task {}", id)),
            _ => StorageError::Io(e),
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Persist one task record atomically.
    pub fn save(&self, task: &Task) -> Result<(), StorageError> {
        let raw = serde_yaml::to_string(task)?;
        write_atomic(
            &paths::task_record(&self.root, task.id.as_str()),
            raw.as_bytes(),
        )?;
        Ok(())
    }

    /// Load every task record in the workspace. Records that fail to
    /// parse are skipped with a warning rather than failing the scan.
    pub fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        let mut tasks = Vec::new();
        let dir = paths::tasks_dir(&self.root);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
            Err(e) => return Err(StorageError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let id = TaskId::new(entry.file_name().to_string_lossy().to_string());
            match self.load(&id) {
                Ok(task) => tasks.push(task),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "skipping unreadable task record");
                }
            }
        }
        Ok(tasks)
    }

    /// Remove a task directory and everything in it.
    pub fn delete(&self, id: &TaskId) -> Result<(), StorageError> {
        let dir = self.dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("task {}", id)))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Highest numeric id suffix among tasks currently on disk.
    ///
    /// Used as a floor for the workspace id high-water mark when a
    /// config predates the mark.
    pub fn max_numeric_suffix(&self) -> Result<u64, StorageError> {
        Ok(self
            .load_all()?
            .iter()
            .filter_map(|t| t.id.numeric_suffix())
            .max()
            .unwrap_or(0))
    }

    /// Write the post-execution summary for a task.
    pub fn save_summary(&self, id: &TaskId, summary: &str) -> Result<(), StorageError> {
        write_atomic(
            &paths::task_summary(&self.root, id.as_str()),
            summary.as_bytes(),
        )?;
        Ok(())
    }

    /// Read the post-execution summary, if one exists.
    pub fn load_summary(&self, id: &TaskId) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(paths::task_summary(&self.root, id.as_str())) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
