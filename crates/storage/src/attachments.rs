// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment byte storage under the task directory.

use crate::error::StorageError;
use crate::paths;
use tf_core::{AttachmentMeta, TaskId};

use chrono::Utc;
use std::path::PathBuf;

/// Stores attachment bytes by stored name and mints their metadata.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist attachment bytes and return the metadata to record on the
    /// task. The stored name is prefixed with a uuid so uploads with the
    /// same filename never collide.
    pub fn store(
        &self,
        task_id: &TaskId,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentMeta, StorageError> {
        let id = uuid::Uuid::new_v4().to_string();
        let stored_name = format!("{}-{}", &id[..8], sanitize_filename(filename));
        let path = paths::attachment(&self.root, task_id.as_str(), &stored_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        Ok(AttachmentMeta {
            id,
            filename: filename.to_string(),
            stored_name,
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            created_at: Utc::now(),
        })
    }

    /// Resolve the on-disk path of a stored attachment.
    pub fn path_of(&self, task_id: &TaskId, stored_name: &str) -> Result<PathBuf, StorageError> {
        // Reject traversal in client-supplied names.
        if stored_name.contains('/') || stored_name.contains("..") {
            return Err(StorageError::NotFound(format!(
                "attachment {}",
                stored_name
            )));
        }
        let path = paths::attachment(&self.root, task_id.as_str(), stored_name);
        if !path.exists() {
            return Err(StorageError::NotFound(format!(
                "attachment {}",
                stored_name
            )));
        }
        Ok(path)
    }

    /// Read attachment bytes back.
    pub fn read(&self, task_id: &TaskId, stored_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(task_id, stored_name)?;
        Ok(std::fs::read(path)?)
    }
}

/// Keep filenames shell- and path-safe.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[path = "attachments_tests.rs"]
mod tests;
