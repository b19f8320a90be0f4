// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{wait_until, Fixture};
use tf_adapters::FakeTurn;
use tf_core::PolicyOverride;

/// Policy set up for queueing; the queue itself is started by each test
/// after its tasks are in place (moves request kicks of their own).
fn queue_fixture(executing_limit: u32) -> Fixture {
    let fx = Fixture::new();
    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                ready_to_executing: Some(true),
                executing_limit: Some(executing_limit),
                ..Default::default()
            },
            &[],
        )
        .unwrap();
    fx
}

fn completion_turn(task_id: &tf_core::TaskId) -> FakeTurn {
    FakeTurn::new()
        .tool(
            "task_complete",
            serde_json::json!({"taskId": task_id.as_str(), "summary": "done"}),
        )
        .event(tf_adapters::SdkEvent::TurnEnd)
}

#[tokio::test(start_paused = true)]
async fn kick_starts_first_ready_task_under_limit() {
    let fx = queue_fixture(1);

    let a = fx.create_task("a", &["c"]);
    let b = fx.create_task("b", &["c"]);
    // Hold both potential executions.
    fx.sdk.push_turn(FakeTurn::silent_hold());
    fx.sdk.push_turn(FakeTurn::silent_hold());

    let a = fx.move_to(&a, TaskPhase::Ready).await;
    let b = fx.move_to(&b, TaskPhase::Ready).await;
    // Moves prepend: b leads after its move; put a first.
    fx.store
        .reorder(&fx.ws, TaskPhase::Ready, &[a.id.clone(), b.id.clone()])
        .await
        .unwrap();
    fx.automation.start_queue(&fx.ws).await.unwrap();
    fx.automation.kick(&fx.ws).await;

    wait_until(|| {
        fx.store
            .require(&fx.ws, &a.id)
            .map(|t| t.phase == TaskPhase::Executing)
            .unwrap_or(false)
    })
    .await;

    // WIP limit 1: b stays ready.
    assert_eq!(
        fx.store.require(&fx.ws, &b.id).unwrap().phase,
        TaskPhase::Ready
    );

    let status = fx.automation.status(&fx.ws).unwrap();
    assert!(status.enabled);
    assert_eq!(status.executing, 1);
    assert_eq!(status.current_task_id.as_ref(), Some(&a.id));
}

#[tokio::test(start_paused = true)]
async fn completion_frees_slot_and_starts_next() {
    let fx = queue_fixture(1);

    let a = fx.create_task("a", &["c"]);
    let b = fx.create_task("b", &["c"]);
    let a = fx.move_to(&a, TaskPhase::Ready).await;
    let b = fx.move_to(&b, TaskPhase::Ready).await;
    fx.store
        .reorder(&fx.ws, TaskPhase::Ready, &[a.id.clone(), b.id.clone()])
        .await
        .unwrap();

    // First execution completes immediately; second holds.
    fx.sdk.push_turn(completion_turn(&a.id));
    fx.sdk.push_turn(FakeTurn::silent_hold());
    fx.automation.start_queue(&fx.ws).await.unwrap();
    fx.automation.kick(&fx.ws).await;

    wait_until(|| {
        fx.store
            .require(&fx.ws, &a.id)
            .map(|t| t.phase == TaskPhase::Complete)
            .unwrap_or(false)
    })
    .await;
    wait_until(|| {
        fx.store
            .require(&fx.ws, &b.id)
            .map(|t| t.phase == TaskPhase::Executing)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn kick_respects_wip_limit() {
    let fx = queue_fixture(1);

    let busy = fx.create_task("busy", &["c"]);
    let busy = fx.move_to(&busy, TaskPhase::Ready).await;
    let busy = fx.move_to(&busy, TaskPhase::Executing).await;

    let waiting = fx.create_task("waiting", &["c"]);
    let waiting = fx.move_to(&waiting, TaskPhase::Ready).await;

    fx.automation.start_queue(&fx.ws).await.unwrap();
    fx.automation.kick(&fx.ws).await;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    assert_eq!(
        fx.store.require(&fx.ws, &waiting.id).unwrap().phase,
        TaskPhase::Ready
    );
    // No session was started for either task by this kick.
    assert!(!fx.sessions.has_running_session(&waiting.id));
    let _ = busy;
}

#[tokio::test(start_paused = true)]
async fn disabled_queue_never_starts_anything() {
    let fx = Fixture::new();
    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                ready_to_executing: Some(true),
                ..Default::default()
            },
            &[],
        )
        .unwrap();

    let task = fx.create_task("t", &["c"]);
    let task = fx.move_to(&task, TaskPhase::Ready).await;

    fx.automation.kick(&fx.ws).await;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(
        fx.store.require(&fx.ws, &task.id).unwrap().phase,
        TaskPhase::Ready
    );
}

#[tokio::test(start_paused = true)]
async fn policy_toggle_gates_kick() {
    let fx = Fixture::new();
    // Queue on, but ready_to_executing stays at the default (off).
    fx.automation.start_queue(&fx.ws).await.unwrap();

    let task = fx.create_task("t", &["c"]);
    let task = fx.move_to(&task, TaskPhase::Ready).await;

    fx.automation.kick(&fx.ws).await;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(
        fx.store.require(&fx.ws, &task.id).unwrap().phase,
        TaskPhase::Ready
    );
}

#[tokio::test(start_paused = true)]
async fn stop_queue_leaves_running_execution_alone() {
    let fx = queue_fixture(1);
    let task = fx.create_task("t", &["c"]);
    fx.sdk.push_turn(FakeTurn::silent_hold());
    let task = fx.move_to(&task, TaskPhase::Ready).await;
    fx.automation.start_queue(&fx.ws).await.unwrap();
    fx.automation.kick(&fx.ws).await;
    wait_until(|| fx.sessions.has_running_session(&task.id)).await;

    fx.automation.stop_queue(&fx.ws).await.unwrap();

    // The toggle is persisted; the session is untouched.
    assert!(!fx.store.workspace(&fx.ws).unwrap().queue_enabled);
    assert!(fx.sessions.has_running_session(&task.id));
}

#[tokio::test(start_paused = true)]
async fn failed_auto_start_returns_task_to_ready() {
    let fx = queue_fixture(1);
    let task = fx.create_task("t", &["c"]);
    let task = fx.move_to(&task, TaskPhase::Ready).await;

    fx.sdk.set_open_error(tf_adapters::SdkError::Spawn("no binary".into()));
    fx.automation.start_queue(&fx.ws).await.unwrap();
    fx.automation.kick(&fx.ws).await;

    // ready → executing → ready recorded in history (a later re-kick
    // may move it again; the rollback record is what matters).
    wait_until(|| {
        fx.store
            .require(&fx.ws, &task.id)
            .map(|t| {
                t.history.iter().any(|h| {
                    h.to == TaskPhase::Ready && h.reason.as_deref() == Some("auto-start failed")
                })
            })
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn promote_after_planning_respects_ready_limit() {
    let fx = Fixture::new();
    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                backlog_to_ready: Some(true),
                ready_limit: Some(1),
                ..Default::default()
            },
            &[],
        )
        .unwrap();

    let occupying = fx.create_task("occupying", &["c"]);
    fx.move_to(&occupying, TaskPhase::Ready).await;

    let planned = fx.create_task("planned", &["c"]);
    fx.automation.promote_after_planning(&fx.ws, &planned.id).await;

    // Ready is full; the task stays in backlog.
    assert_eq!(
        fx.store.require(&fx.ws, &planned.id).unwrap().phase,
        TaskPhase::Backlog
    );
}

#[tokio::test(start_paused = true)]
async fn promote_after_planning_moves_backlog_task() {
    let fx = Fixture::new();
    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                backlog_to_ready: Some(true),
                ..Default::default()
            },
            &[],
        )
        .unwrap();

    let task = fx.create_task("t", &["c"]);
    fx.automation.promote_after_planning(&fx.ws, &task.id).await;
    assert_eq!(
        fx.store.require(&fx.ws, &task.id).unwrap().phase,
        TaskPhase::Ready
    );
}
