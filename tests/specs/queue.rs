// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue auto-start under the executing WIP limit.

use super::prelude::*;
use tf_adapters::{FakeTurn, SdkEvent};
use tf_core::TaskPhase;

fn completion_turn(task_id: &str) -> FakeTurn {
    FakeTurn::new()
        .tool(
            "task_complete",
            serde_json::json!({"taskId": task_id, "summary": "done"}),
        )
        .event(SdkEvent::TurnEnd)
}

#[tokio::test(start_paused = true)]
async fn wip_limited_queue_runs_tasks_in_order() {
    let h = Harness::new();
    h.enable_queue_policy(1);

    // Two ready tasks; the first in order runs first.
    let first = h.ready_task("seventh", &["c"]).await;
    let second = h.ready_task("eighth", &["c"]).await;
    h.store
        .reorder(
            &h.ws,
            TaskPhase::Ready,
            &[first.id.clone(), second.id.clone()],
        )
        .await
        .expect("reorder");

    // Scripted executions: each completes via task_complete.
    h.sdk.push_turn(completion_turn(first.id.as_str()));
    h.sdk.push_turn(completion_turn(second.id.as_str()));

    h.automation.start_queue(&h.ws).await.expect("start queue");
    h.automation.kick(&h.ws).await;

    // First completes, which kicks the queue again for the second.
    wait_until(|| h.phase_of(&first) == TaskPhase::Complete).await;
    wait_until(|| h.phase_of(&second) == TaskPhase::Complete).await;

    // Both ran as automation moves.
    let first = h.store.require(&h.ws, &first.id).expect("task");
    assert!(first
        .history
        .iter()
        .any(|t| t.to == TaskPhase::Executing && t.actor == tf_core::Actor::Automation));
}

#[tokio::test(start_paused = true)]
async fn second_task_waits_for_the_wip_slot() {
    let h = Harness::new();
    h.enable_queue_policy(1);

    let first = h.ready_task("first", &["c"]).await;
    let second = h.ready_task("second", &["c"]).await;
    h.store
        .reorder(
            &h.ws,
            TaskPhase::Ready,
            &[first.id.clone(), second.id.clone()],
        )
        .await
        .expect("reorder");

    // The first execution holds; the queue must not start the second.
    h.sdk.push_turn(FakeTurn::silent_hold());
    h.automation.start_queue(&h.ws).await.expect("start queue");
    h.automation.kick(&h.ws).await;

    wait_until(|| h.phase_of(&first) == TaskPhase::Executing).await;
    h.automation.kick(&h.ws).await;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    assert_eq!(h.phase_of(&second), TaskPhase::Ready);
    assert!(!h.sessions.has_running_session(&second.id));
}
