// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral live events carried on the workspace bus.
//!
//! These mirror what the session manager observes from the SDK in real
//! time. They are broadcast to subscribers (WebSocket clients) but never
//! persisted; the durable record is the activity timeline.

use crate::activity::ActivityEntry;
use crate::task::{Task, TaskId, TaskPhase};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse session status surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "streaming")]
    Streaming,
    #[serde(rename = "tool_use")]
    ToolUse,
    #[serde(rename = "awaiting_input")]
    AwaitingInput,
    #[serde(rename = "post-hooks")]
    PostHooks,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Idle => write!(f, "idle"),
            ExecutionStatus::Streaming => write!(f, "streaming"),
            ExecutionStatus::ToolUse => write!(f, "tool_use"),
            ExecutionStatus::AwaitingInput => write!(f, "awaiting_input"),
            ExecutionStatus::PostHooks => write!(f, "post-hooks"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

/// Live events, serialized with `{"type": "agent:...", ...fields}` tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    #[serde(rename = "agent:execution_status")]
    Status {
        task_id: TaskId,
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "agent:streaming_start")]
    StreamingStart { task_id: TaskId },

    #[serde(rename = "agent:streaming_text")]
    StreamingText { task_id: TaskId, text: String },

    #[serde(rename = "agent:streaming_end")]
    StreamingEnd { task_id: TaskId },

    #[serde(rename = "agent:thinking_delta")]
    ThinkingDelta { task_id: TaskId, text: String },

    #[serde(rename = "agent:thinking_end")]
    ThinkingEnd { task_id: TaskId },

    #[serde(rename = "agent:tool_start")]
    ToolStart {
        task_id: TaskId,
        tool_call_id: String,
        tool_name: String,
    },

    #[serde(rename = "agent:tool_update")]
    ToolUpdate {
        task_id: TaskId,
        tool_call_id: String,
        delta: String,
    },

    #[serde(rename = "agent:tool_end")]
    ToolEnd {
        task_id: TaskId,
        tool_call_id: String,
        tool_name: String,
        is_error: bool,
    },

    #[serde(rename = "agent:turn_end")]
    TurnEnd { task_id: TaskId },

    #[serde(rename = "agent:context_usage")]
    ContextUsage {
        task_id: TaskId,
        tokens: u64,
        context_window: u64,
        percent: f64,
    },

    #[serde(rename = "task:updated")]
    TaskUpdated { task: Box<Task> },

    #[serde(rename = "task:moved")]
    TaskMoved {
        task_id: TaskId,
        from: TaskPhase,
        to: TaskPhase,
    },

    #[serde(rename = "task:plan_generated")]
    PlanGenerated { task_id: TaskId },

    #[serde(rename = "task:removed")]
    TaskRemoved { task_id: TaskId },
}

impl LiveEvent {
    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            LiveEvent::Status { task_id, .. }
            | LiveEvent::StreamingStart { task_id }
            | LiveEvent::StreamingText { task_id, .. }
            | LiveEvent::StreamingEnd { task_id }
            | LiveEvent::ThinkingDelta { task_id, .. }
            | LiveEvent::ThinkingEnd { task_id }
            | LiveEvent::ToolStart { task_id, .. }
            | LiveEvent::ToolUpdate { task_id, .. }
            | LiveEvent::ToolEnd { task_id, .. }
            | LiveEvent::TurnEnd { task_id }
            | LiveEvent::ContextUsage { task_id, .. }
            | LiveEvent::TaskMoved { task_id, .. }
            | LiveEvent::PlanGenerated { task_id }
            | LiveEvent::TaskRemoved { task_id } => Some(task_id),
            LiveEvent::TaskUpdated { task } => Some(&task.id),
        }
    }
}

/// What flows on the workspace bus: persisted entries (wrapped in an
/// `activity` envelope for the wire) interleaved with live events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusEvent {
    Activity { activity: ActivityEntry },
    Live(LiveEvent),
}

impl From<ActivityEntry> for BusEvent {
    fn from(activity: ActivityEntry) -> Self {
        BusEvent::Activity { activity }
    }
}

impl From<LiveEvent> for BusEvent {
    fn from(event: LiveEvent) -> Self {
        BusEvent::Live(event)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
