// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only activity timeline (`activity.jsonl`).
//!
//! One JSON object per line, in append order. Entries are never mutated
//! or deleted; bounded reads walk the file and keep the tail.

use crate::error::StorageError;
use crate::paths;
use tf_core::{ActivityEntry, TaskId};

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Append-only JSONL log of activity entries for one workspace.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    root: PathBuf,
}

impl ActivityLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self) -> PathBuf {
        paths::activity_log(&self.root)
    }

    /// Append one entry. The line is flushed before returning so the
    /// entry is durable when the caller broadcasts it.
    pub fn append(&self, entry: &ActivityEntry) -> Result<(), StorageError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read the newest `limit` entries, newest first.
    pub fn timeline(&self, limit: usize) -> Result<Vec<ActivityEntry>, StorageError> {
        self.read_filtered(limit, |_| true)
    }

    /// Read the newest `limit` entries for one task, newest first.
    pub fn task_timeline(
        &self,
        task_id: &TaskId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StorageError> {
        self.read_filtered(limit, |entry| entry.task_id.as_ref() == Some(task_id))
    }

    fn read_filtered(
        &self,
        limit: usize,
        keep: impl Fn(&ActivityEntry) -> bool,
    ) -> Result<Vec<ActivityEntry>, StorageError> {
        let file = match std::fs::File::open(self.path()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut kept: Vec<ActivityEntry> = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Unparseable lines are skipped, not fatal: the log outlives
            // format evolution.
            let entry: ActivityEntry = match serde_json::from_str(trimmed) {
                Ok(e) => e,
                Err(_) => continue,
            };
            if keep(&entry) {
                kept.push(entry);
            }
        }

        if limit > 0 && kept.len() > limit {
            kept.drain(..kept.len() - limit);
        }
        kept.reverse();
        Ok(kept)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }
}

#[cfg(test)]
#[path = "activity_log_tests.rs"]
mod tests;
