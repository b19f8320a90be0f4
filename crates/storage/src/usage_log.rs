// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-turn usage ledger (`usage.jsonl`).
//!
//! Append-only JSONL so cost data survives crashes; rotated at 10 MB
//! keeping three older files.

use crate::error::StorageError;
use crate::paths;
use serde::{Deserialize, Serialize};

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Maximum ledger size before rotation (10 MB).
const MAX_USAGE_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated files to keep (usage.jsonl.1, .2, .3).
const MAX_ROTATED_FILES: u32 = 3;

/// One usage record, written per assistant message with usage data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: String,
    pub task_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Append-only usage ledger for one workspace.
#[derive(Debug, Clone)]
pub struct UsageLog {
    root: PathBuf,
}

impl UsageLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self) -> PathBuf {
        paths::usage_log(&self.root)
    }

    /// Append one record, rotating first if the ledger is oversized.
    pub fn append(&self, record: &UsageRecord) -> Result<(), StorageError> {
        self.rotate_if_needed();

        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Rotate the ledger if it exceeds the size limit.
    fn rotate_if_needed(&self) {
        let path = self.path();
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(_) => return,
        };
        if size < MAX_USAGE_SIZE {
            return;
        }

        let path_str = path.display().to_string();

        // Shift older rotations: .3 is deleted, .2→.3, .1→.2
        for i in (1..MAX_ROTATED_FILES).rev() {
            let from = format!("{path_str}.{i}");
            let to = format!("{path_str}.{}", i + 1);
            let _ = std::fs::rename(&from, &to);
        }

        let _ = std::fs::rename(&path, format!("{path_str}.1"));
    }
}

#[cfg(test)]
#[path = "usage_log_tests.rs"]
mod tests;
