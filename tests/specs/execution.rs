// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path execution: text deltas then `task_complete`.

use super::prelude::*;
use tf_adapters::{FakeTurn, MessageRole, SdkEvent, StopReason};
use tf_core::{Actor, ExecutionStatus, LiveEvent, TaskPhase};

#[tokio::test(start_paused = true)]
async fn happy_path_execution() {
    let h = Harness::new();
    let task = h.ready_task("Fix the build", &["compiles", "tests pass"]).await;
    assert_eq!(task.id.as_str(), "TF-1");
    let mut rx = h.subscribe();

    h.sdk.push_turn(
        FakeTurn::new()
            .event(SdkEvent::AgentStart)
            .event(SdkEvent::MessageStart {
                role: MessageRole::Assistant,
            })
            .event(SdkEvent::TextDelta { text: "ok".into() })
            .event(SdkEvent::MessageEnd {
                role: MessageRole::Assistant,
                content: "ok".into(),
                model: Some("fake-model".into()),
                usage: None,
                stop_reason: StopReason::EndTurn,
            })
            .tool(
                "task_complete",
                serde_json::json!({"taskId": "TF-1", "summary": "done"}),
            )
            .event(SdkEvent::TurnEnd),
    );

    let (seen, hook) = completion_probe();
    h.sessions
        .start_execution(&h.ws, &task.id, Actor::User, Some(hook))
        .await
        .expect("start execution");

    wait_until(|| seen.lock().is_some()).await;
    assert_eq!(*seen.lock(), Some((true, None)));
    assert_eq!(h.phase_of(&task), TaskPhase::Complete);
    wait_until(|| h.sessions.get_active(&task.id).is_none()).await;

    let events = drain(&mut rx);
    assert_eq!(count_system_events(&events, "execution-completed"), 1);

    // The streamed deltas reached subscribers in order.
    let mut statuses = events.iter().filter_map(|e| match e {
        tf_core::BusEvent::Live(LiveEvent::Status { status, .. }) => Some(*status),
        _ => None,
    });
    assert!(statuses.any(|s| s == ExecutionStatus::Streaming));

    // The assistant message landed on the persisted timeline too.
    wait_until(|| {
        h.activity
            .task_timeline(&h.ws, &task.id, 50)
            .map(|entries| entries.iter().any(|e| e.is_agent_message()))
            .unwrap_or(false)
    })
    .await;
}
