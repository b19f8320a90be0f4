// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted activity timeline entries.
//!
//! Entries are append-only: once written they are never mutated or
//! deleted. Ephemeral live events are a separate type ([`crate::event`]).

use crate::task::{TaskId, TaskPhase};
use crate::workspace::WorkspaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Agent,
    System,
}

/// Tool call metadata attached to a tool-result chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMeta {
    pub tool_name: String,
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Variants of a timeline entry.
///
/// Serializes with `{"kind": "chat-message", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActivityKind {
    ChatMessage {
        role: ChatRole,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachment_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call: Option<ToolCallMeta>,
    },
    SystemEvent {
        event: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    TaskSeparator {
        title: String,
        phase: TaskPhase,
    },
}

/// A persisted, timestamped timeline entry, ordered globally per
/// workspace and optionally scoped to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub workspace_id: WorkspaceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl ActivityEntry {
    /// True for chat messages authored by the agent.
    pub fn is_agent_message(&self) -> bool {
        matches!(
            &self.kind,
            ActivityKind::ChatMessage {
                role: ChatRole::Agent,
                ..
            }
        )
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
