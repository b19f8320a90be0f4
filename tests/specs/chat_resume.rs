// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume chat on a completed task with an existing session file.

use super::prelude::*;
use tf_adapters::{FakeTurn, SavePlanArgs, SdkCall};
use tf_core::TaskPhase;
use tf_engine::SessionStatus;

#[tokio::test(start_paused = true)]
async fn resume_chat_with_state_contract() {
    let h = Harness::new();
    let task = h.create_task("Done work", &["c"]);
    h.store
        .move_task(&h.ws, &task.id, TaskPhase::Complete, tf_core::Actor::User, None)
        .await
        .expect("move");

    // Existing SDK session handle on the task.
    let handle = h.dir.path().join(".sessions/old.jsonl");
    std::fs::create_dir_all(handle.parent().unwrap()).unwrap();
    std::fs::write(&handle, b"").unwrap();
    h.store
        .set_session_file(&h.ws, &task.id, handle.clone())
        .await
        .expect("set session file");

    h.sdk.push_turn(FakeTurn::text("here is what changed"));
    h.sessions
        .post_user_message(&h.ws, &task.id, "what changed?", Vec::new())
        .await
        .expect("post message");

    wait_until(|| {
        h.sessions
            .get_active(&task.id)
            .map(|s| s.status() == SessionStatus::Idle)
            .unwrap_or(false)
    })
    .await;

    // Opened in resume mode against the same handle.
    let calls = h.sdk.calls();
    assert!(matches!(calls[0], SdkCall::Open { resumed: true, .. }));

    // The prompt (not a follow-up) carried the contract with chat mode.
    let prompt = calls
        .iter()
        .find_map(|c| match c {
            SdkCall::Prompt(text) => Some(text.clone()),
            _ => None,
        })
        .expect("prompt sent");
    assert!(prompt.contains("<mode>chat</mode>"));
    assert!(prompt.contains("Contract:"));
    assert!(prompt.contains("what changed?"));

    // save_plan would be forbidden: no callback was installed and the
    // mode gate rejects it outright.
    let denied = h.toolbox.save_plan(SavePlanArgs {
        task_id: task.id.clone(),
        acceptance_criteria: vec!["x".into()],
        goal: "g".into(),
        steps: Vec::new(),
        validation: Vec::new(),
        cleanup: Vec::new(),
    });
    assert!(denied.is_error);

    // The session handle is unchanged.
    let task = h.store.require(&h.ws, &task.id).expect("task");
    assert_eq!(task.session_file.as_deref(), Some(handle.as_path()));
}
