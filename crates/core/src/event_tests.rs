// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::TaskId;
use yare::parameterized;

#[parameterized(
    idle = { ExecutionStatus::Idle, "\"idle\"" },
    streaming = { ExecutionStatus::Streaming, "\"streaming\"" },
    tool_use = { ExecutionStatus::ToolUse, "\"tool_use\"" },
    awaiting = { ExecutionStatus::AwaitingInput, "\"awaiting_input\"" },
    post_hooks = { ExecutionStatus::PostHooks, "\"post-hooks\"" },
    completed = { ExecutionStatus::Completed, "\"completed\"" },
    error = { ExecutionStatus::Error, "\"error\"" },
)]
fn execution_status_wire_values(status: ExecutionStatus, expected: &str) {
    assert_eq!(serde_json::to_string(&status).unwrap(), expected);
}

#[test]
fn status_event_wire_tag() {
    let event = LiveEvent::Status {
        task_id: TaskId::new("TF-1"),
        status: ExecutionStatus::Streaming,
        message: None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent:execution_status");
    assert_eq!(json["status"], "streaming");
}

#[test]
fn tool_events_round_trip() {
    let event = LiveEvent::ToolEnd {
        task_id: TaskId::new("TF-2"),
        tool_call_id: "tc-9".into(),
        tool_name: "bash".into(),
        is_error: true,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("agent:tool_end"));
    let parsed: LiveEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn context_usage_carries_percent() {
    let event = LiveEvent::ContextUsage {
        task_id: TaskId::new("TF-1"),
        tokens: 50_000,
        context_window: 200_000,
        percent: 25.0,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent:context_usage");
    assert_eq!(json["percent"], 25.0);
}

#[test]
fn task_moved_wire_tag() {
    let event = LiveEvent::TaskMoved {
        task_id: TaskId::new("TF-3"),
        from: crate::task::TaskPhase::Ready,
        to: crate::task::TaskPhase::Executing,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task:moved");
    assert_eq!(json["from"], "ready");
    assert_eq!(json["to"], "executing");
}

#[test]
fn task_id_accessor_covers_all_variants() {
    let id = TaskId::new("TF-1");
    let events = [
        LiveEvent::StreamingStart { task_id: id.clone() },
        LiveEvent::TurnEnd { task_id: id.clone() },
        LiveEvent::PlanGenerated { task_id: id.clone() },
    ];
    for event in events {
        assert_eq!(event.task_id(), Some(&id));
    }
}

#[test]
fn bus_event_wraps_activity_in_envelope() {
    let entry = crate::activity::ActivityEntry {
        id: "e-1".into(),
        workspace_id: crate::workspace::WorkspaceId::new("ws-1"),
        task_id: None,
        at: chrono::Utc::now(),
        kind: crate::activity::ActivityKind::SystemEvent {
            event: "boot".into(),
            message: "hi".into(),
            metadata: None,
        },
    };
    let bus: BusEvent = entry.into();
    let json = serde_json::to_value(&bus).unwrap();
    assert!(json.get("activity").is_some());
}

#[test]
fn bus_event_live_is_transparent() {
    let bus: BusEvent = LiveEvent::TurnEnd {
        task_id: TaskId::new("TF-1"),
    }
    .into();
    let json = serde_json::to_value(&bus).unwrap();
    assert_eq!(json["type"], "agent:turn_end");
}
