// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative stop during a running tool call.

use super::prelude::*;
use tf_adapters::{FakeTurn, SdkCall, SdkEvent};
use tf_core::{Actor, BusEvent, ExecutionStatus, LiveEvent, TaskPhase};

#[tokio::test(start_paused = true)]
async fn stop_during_tool_call() {
    let h = Harness::new();
    let task = h.ready_task("Long tool", &["c"]).await;

    h.sdk.push_turn(
        FakeTurn::new()
            .event(SdkEvent::AgentStart)
            .event(SdkEvent::ToolStart {
                tool_call_id: "tc-1".into(),
                tool_name: "bash".into(),
                args: serde_json::json!({"command": "sleep 999"}),
            })
            .held(),
    );
    let mut tool_watch = h.subscribe();
    let (seen, hook) = completion_probe();
    h.sessions
        .start_execution(&h.ws, &task.id, Actor::User, Some(hook))
        .await
        .expect("start execution");

    // Wait until the session is mid-tool.
    loop {
        match tool_watch.recv().await {
            Ok(BusEvent::Live(LiveEvent::ToolStart { .. })) => break,
            Ok(_) => continue,
            Err(e) => panic!("bus closed before tool start: {e}"),
        }
    }

    let mut rx = h.subscribe();
    assert!(h.sessions.stop(&task.id).await.expect("stop"));

    // Abort attempted, session gone, completion suppressed.
    wait_until(|| h.sdk.calls().iter().any(|c| matches!(c, SdkCall::Abort))).await;
    assert!(h.sessions.get_active(&task.id).is_none());
    assert_eq!(*seen.lock(), None);

    // Exactly one idle broadcast from the stop; phase untouched.
    let events = drain(&mut rx);
    let idle_count = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                BusEvent::Live(LiveEvent::Status {
                    status: ExecutionStatus::Idle,
                    ..
                })
            )
        })
        .count();
    assert_eq!(idle_count, 1);
    assert_eq!(h.phase_of(&task), TaskPhase::Executing);

    // A second stop is a no-op.
    assert!(!h.sessions.stop(&task.id).await.expect("second stop"));
}
