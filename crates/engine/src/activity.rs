// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity service: persist-then-broadcast timeline appends.
//!
//! The append and the broadcast run under a per-workspace lock, so
//! every subscriber observes persisted entries in append order. Live
//! events interleave best-effort.

use crate::bus::WorkspaceBus;
use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tf_core::{
    ActivityEntry, ActivityKind, ChatRole, LiveEvent, TaskId, TaskPhase, ToolCallMeta, WorkspaceId,
};
use tf_storage::ActivityLog;

struct WorkspaceActivity {
    log: ActivityLog,
    append_lock: Arc<Mutex<()>>,
}

/// Append-only activity timelines plus the live bus, per workspace.
#[derive(Clone)]
pub struct ActivityService {
    bus: WorkspaceBus,
    workspaces: Arc<Mutex<HashMap<WorkspaceId, Arc<WorkspaceActivity>>>>,
}

impl ActivityService {
    pub fn new(bus: WorkspaceBus) -> Self {
        Self {
            bus,
            workspaces: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &WorkspaceBus {
        &self.bus
    }

    /// Register a workspace root so appends know where to persist.
    pub fn register_workspace(&self, workspace_id: &WorkspaceId, root: &Path) {
        self.workspaces.lock().insert(
            workspace_id.clone(),
            Arc::new(WorkspaceActivity {
                log: ActivityLog::new(root.to_path_buf()),
                append_lock: Arc::new(Mutex::new(())),
            }),
        );
    }

    pub fn unregister_workspace(&self, workspace_id: &WorkspaceId) {
        self.workspaces.lock().remove(workspace_id);
    }

    fn workspace(&self, workspace_id: &WorkspaceId) -> Result<Arc<WorkspaceActivity>, EngineError> {
        self.workspaces
            .lock()
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkspaceNotFound(workspace_id.clone()))
    }

    /// Assign id + timestamp, persist, then broadcast. Persistence
    /// failures propagate to the caller; the broadcast only happens for
    /// entries that made it to disk.
    pub fn append(
        &self,
        workspace_id: &WorkspaceId,
        task_id: Option<TaskId>,
        kind: ActivityKind,
    ) -> Result<ActivityEntry, EngineError> {
        let workspace = self.workspace(workspace_id)?;
        let entry = ActivityEntry {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.clone(),
            task_id,
            at: chrono::Utc::now(),
            kind,
        };

        {
            let _serialized = workspace.append_lock.lock();
            workspace.log.append(&entry)?;
            self.bus.broadcast(workspace_id, entry.clone().into());
        }
        Ok(entry)
    }

    /// Newest-first bounded read of the whole workspace timeline.
    pub fn timeline(
        &self,
        workspace_id: &WorkspaceId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, EngineError> {
        Ok(self.workspace(workspace_id)?.log.timeline(limit)?)
    }

    /// Newest-first bounded read filtered to one task.
    pub fn task_timeline(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, EngineError> {
        Ok(self
            .workspace(workspace_id)?
            .log
            .task_timeline(task_id, limit)?)
    }

    /// Broadcast an ephemeral live event; never persisted.
    pub fn emit_live(&self, workspace_id: &WorkspaceId, event: LiveEvent) {
        self.bus.live(workspace_id, event);
    }

    // -------------------------------------------------------------------
    // Entry helpers
    // -------------------------------------------------------------------

    pub fn chat_message(
        &self,
        workspace_id: &WorkspaceId,
        task_id: Option<TaskId>,
        role: ChatRole,
        content: impl Into<String>,
        attachment_ids: Vec<String>,
        tool_call: Option<ToolCallMeta>,
    ) -> Result<ActivityEntry, EngineError> {
        self.append(
            workspace_id,
            task_id,
            ActivityKind::ChatMessage {
                role,
                content: content.into(),
                attachment_ids,
                tool_call,
            },
        )
    }

    /// Exactly one system-event per non-trivial failure or milestone,
    /// with a structured metadata object.
    pub fn system_event(
        &self,
        workspace_id: &WorkspaceId,
        task_id: Option<TaskId>,
        event: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<ActivityEntry, EngineError> {
        self.append(
            workspace_id,
            task_id,
            ActivityKind::SystemEvent {
                event: event.into(),
                message: message.into(),
                metadata,
            },
        )
    }

    pub fn task_separator(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        title: impl Into<String>,
        phase: TaskPhase,
    ) -> Result<ActivityEntry, EngineError> {
        self.append(
            workspace_id,
            Some(task_id.clone()),
            ActivityKind::TaskSeparator {
                title: title.into(),
                phase,
            },
        )
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
