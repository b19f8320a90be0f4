// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace record.

use crate::policy::PolicyOverride;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a workspace.
    pub struct WorkspaceId;
}

/// A workspace: a directory of tasks with a workflow policy.
///
/// The workspace exclusively owns its tasks, activity log and automation
/// state. `last_task_id` is the high-water mark for generated task ids;
/// it only ever increases, so deleted ids are never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "PolicyOverride::is_empty")]
    pub automation: PolicyOverride,
    /// Whether the ready→executing queue is running.
    #[serde(default)]
    pub queue_enabled: bool,
    #[serde(default)]
    pub last_task_id: u64,
    pub created: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: WorkspaceId, name: impl Into<String>, path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            path,
            automation: PolicyOverride::default(),
            queue_enabled: false,
            last_task_id: 0,
            created: now,
        }
    }

    /// Allocate the next task id, advancing the high-water mark.
    pub fn next_task_id(&mut self) -> crate::task::TaskId {
        self.last_task_id += 1;
        crate::task::TaskId::numbered(self.last_task_id)
    }
}
