// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planning guardrails: budget overrun, grace turn, auto-promotion.

use super::prelude::*;
use tf_adapters::{FakeTurn, SdkError};
use tf_core::{ActivityKind, BusEvent, PlanningStatus, PolicyOverride, TaskPhase};
use tf_engine::{PlanningConfig, PlanningOutcome};

#[tokio::test(start_paused = true)]
async fn grace_turn_saves_the_plan() {
    let h = Harness::with_planning(PlanningConfig {
        timeout: std::time::Duration::from_secs(60),
        max_tool_calls: 3,
        ..Default::default()
    });
    h.store
        .patch_workspace_policy(
            &h.ws,
            PolicyOverride {
                backlog_to_ready: Some(true),
                ..Default::default()
            },
            &[],
        )
        .expect("patch policy");

    let task = h.create_task("Needs a plan", &[]);
    let mut rx = h.subscribe();

    // Four research calls against a budget of three, no save_plan.
    let mut research = FakeTurn::new();
    for n in 0..4 {
        research = research.tool("grep", serde_json::json!({"pattern": format!("p{n}")}));
    }
    h.sdk.push_turn(research.ending_with(Err(SdkError::Aborted)));

    // The grace turn persists three criteria (one duplicated).
    h.sdk.push_turn(
        FakeTurn::new()
            .tool(
                "save_plan",
                serde_json::json!({
                    "taskId": task.id.as_str(),
                    "acceptanceCriteria": ["parses", "Parses", "errors surface", "round-trips"],
                    "goal": "implement the parser",
                    "steps": ["grammar", "tests"],
                    "validation": ["cargo test"],
                    "cleanup": [],
                }),
            )
            .ending_with(Err(SdkError::Aborted)),
    );

    let outcome = h
        .planning
        .run(&h.ws, &task.id, false)
        .await
        .expect("planning run");
    assert_eq!(outcome, PlanningOutcome::Completed);

    // Guardrail event names the exceeded budget.
    let events = drain(&mut rx);
    let guardrail = events
        .iter()
        .find_map(|e| match e {
            BusEvent::Activity { activity } => match &activity.kind {
                ActivityKind::SystemEvent { event, message, .. }
                    if event == "planning-guardrail" =>
                {
                    Some(message.clone())
                }
                _ => None,
            },
            _ => None,
        })
        .expect("guardrail event");
    assert!(guardrail.contains("tool-call budget exceeded (4/3)"));

    // Plan persisted, criteria deduped, status completed.
    let task = h.store.require(&h.ws, &task.id).expect("task");
    assert_eq!(task.planning_status, PlanningStatus::Completed);
    let plan = task.plan.as_ref().expect("plan persisted");
    assert_eq!(plan.goal, "implement the parser");
    assert_eq!(
        task.acceptance_criteria,
        vec![
            "parses".to_string(),
            "errors surface".to_string(),
            "round-trips".to_string()
        ]
    );

    // backlogToReady promoted the task.
    wait_until(|| {
        h.store
            .require(&h.ws, &task.id)
            .map(|t| t.phase == TaskPhase::Ready)
            .unwrap_or(false)
    })
    .await;
}
