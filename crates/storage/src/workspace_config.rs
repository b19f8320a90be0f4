// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace config record (`workspace.toml`).

use crate::error::StorageError;
use crate::paths;
use crate::write_atomic;
use tf_core::Workspace;

use std::path::{Path, PathBuf};

/// Loads and saves the workspace record.
///
/// The record carries the workflow policy override, the queue toggle and
/// the task-id high-water mark, so it is rewritten on every task
/// creation and policy patch. Writes are atomic.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    root: PathBuf,
}

impl WorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> PathBuf {
        paths::workspace_config(&self.root)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    pub fn load(&self) -> Result<Workspace, StorageError> {
        let path = self.path();
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    StorageError::NotFound(format!("workspace config at {}", path.display()))
                }
                _ => StorageError::Io(e),
            })?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, workspace: &Workspace) -> Result<(), StorageError> {
        let raw = toml::to_string_pretty(workspace)?;
        write_atomic(&self.path(), raw.as_bytes())?;
        Ok(())
    }
}

/// Scan a directory of workspaces, returning roots that carry a config.
pub fn discover_workspaces(data_dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut roots = Vec::new();
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(roots),
        Err(e) => return Err(StorageError::Io(e)),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && paths::workspace_config(&path).exists() {
            roots.push(path);
        }
    }
    roots.sort();
    Ok(roots)
}

#[cfg(test)]
#[path = "workspace_config_tests.rs"]
mod tests;
