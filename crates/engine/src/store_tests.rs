// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::Fixture;
use tf_core::MoveBlocked;

#[tokio::test]
async fn create_assigns_monotonic_ids() {
    let fx = Fixture::new();
    let a = fx.create_task("first", &[]);
    let b = fx.create_task("second", &[]);
    assert_eq!(a.id.as_str(), "TF-1");
    assert_eq!(b.id.as_str(), "TF-2");
}

#[tokio::test]
async fn ids_are_never_reused_after_delete() {
    let fx = Fixture::new();
    let a = fx.create_task("first", &[]);
    fx.store.delete(&fx.ws, &a.id).await.unwrap();
    let b = fx.create_task("second", &[]);
    assert_eq!(b.id.as_str(), "TF-2");
}

#[tokio::test]
async fn create_normalizes_criteria() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["  compiles ", "", "Compiles", "tests pass"]);
    assert_eq!(
        task.acceptance_criteria,
        vec!["compiles".to_string(), "tests pass".to_string()]
    );
}

#[tokio::test]
async fn create_appends_to_backlog_end() {
    let fx = Fixture::new();
    let a = fx.create_task("a", &[]);
    let b = fx.create_task("b", &[]);
    assert!(a.order < b.order);

    let backlog = fx.store.in_phase(&fx.ws, TaskPhase::Backlog).unwrap();
    assert_eq!(backlog[0].id, a.id);
    assert_eq!(backlog[1].id, b.id);
}

#[tokio::test]
async fn moves_prepend_into_target_phase() {
    let fx = Fixture::new();
    let a = fx.create_task("a", &["c"]);
    let b = fx.create_task("b", &["c"]);

    fx.move_to(&a, TaskPhase::Ready).await;
    fx.move_to(&b, TaskPhase::Ready).await;

    let ready = fx.store.in_phase(&fx.ws, TaskPhase::Ready).unwrap();
    // Most recent move is first.
    assert_eq!(ready[0].id, b.id);
    assert_eq!(ready[1].id, a.id);
}

#[tokio::test]
async fn move_validates_via_state_machine() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    let result = fx
        .store
        .move_task(&fx.ws, &task.id, TaskPhase::Executing, Actor::User, None)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Move(MoveBlocked::InvalidTransition { .. }))
    ));
}

#[tokio::test]
async fn move_writes_history_record() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    let moved = fx
        .store
        .move_task(
            &fx.ws,
            &task.id,
            TaskPhase::Ready,
            Actor::User,
            Some("groomed".into()),
        )
        .await
        .unwrap();

    assert_eq!(moved.history.len(), 1);
    assert_eq!(moved.history[0].from, TaskPhase::Backlog);
    assert_eq!(moved.history[0].to, TaskPhase::Ready);
    assert_eq!(moved.history[0].reason.as_deref(), Some("groomed"));
}

#[tokio::test]
async fn move_round_trip_restores_phase() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    fx.move_to(&task, TaskPhase::Ready).await;
    fx.move_to(&task, TaskPhase::Executing).await;
    let back = fx.move_to(&task, TaskPhase::Ready).await;
    assert_eq!(back.phase, TaskPhase::Ready);
}

#[tokio::test]
async fn orders_stay_total_after_moves() {
    let fx = Fixture::new();
    for n in 0..5 {
        let task = fx.create_task(&format!("t{}", n), &["c"]);
        fx.move_to(&task, TaskPhase::Ready).await;
    }
    let ready = fx.store.in_phase(&fx.ws, TaskPhase::Ready).unwrap();
    let orders: Vec<u32> = ready.iter().map(|t| t.order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn reorder_replaces_phase_order() {
    let fx = Fixture::new();
    let a = fx.create_task("a", &[]);
    let b = fx.create_task("b", &[]);
    let c = fx.create_task("c", &[]);

    fx.store
        .reorder(
            &fx.ws,
            TaskPhase::Backlog,
            &[c.id.clone(), a.id.clone(), b.id.clone()],
        )
        .await
        .unwrap();

    let backlog = fx.store.in_phase(&fx.ws, TaskPhase::Backlog).unwrap();
    let ids: Vec<&str> = backlog.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["TF-3", "TF-1", "TF-2"]);
}

#[tokio::test]
async fn reorder_rejects_wrong_id_set() {
    let fx = Fixture::new();
    let a = fx.create_task("a", &[]);
    let _b = fx.create_task("b", &[]);

    let result = fx
        .store
        .reorder(&fx.ws, TaskPhase::Backlog, &[a.id.clone()])
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn update_merges_and_strips_empty_criteria() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["old"]);

    let updated = fx
        .store
        .update(
            &fx.ws,
            &task.id,
            TaskPatch {
                description: Some("details".into()),
                acceptance_criteria: Some(vec!["new".into(), " ".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "t");
    assert_eq!(updated.description, "details");
    assert_eq!(updated.acceptance_criteria, vec!["new".to_string()]);
    assert!(updated.updated >= task.updated);
}

#[tokio::test]
async fn update_does_not_change_phase() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    fx.move_to(&task, TaskPhase::Ready).await;

    let updated = fx
        .store
        .update(
            &fx.ws,
            &task.id,
            TaskPatch {
                title: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.phase, TaskPhase::Ready);
}

#[tokio::test]
async fn get_never_resurrects_deleted_tasks() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &[]);
    fx.store.delete(&fx.ws, &task.id).await.unwrap();
    assert!(fx.store.get(&fx.ws, &task.id).unwrap().is_none());
}

#[tokio::test]
async fn list_scopes_archived() {
    let fx = Fixture::new();
    let live = fx.create_task("live", &[]);
    let archived = fx.create_task("old", &[]);
    fx.move_to(&archived, TaskPhase::Archived).await;

    let active = fx.store.list(&fx.ws, ListScope::Active).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, live.id);

    let archived_list = fx.store.list(&fx.ws, ListScope::Archived).unwrap();
    assert_eq!(archived_list.len(), 1);

    assert_eq!(fx.store.list(&fx.ws, ListScope::All).unwrap().len(), 2);
}

#[tokio::test]
async fn mutations_survive_reload() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    fx.move_to(&task, TaskPhase::Ready).await;

    // A second store over the same directory sees the same state.
    let store2 = TaskStore::new(crate::bus::WorkspaceBus::new(), WorkflowPolicy::default());
    store2.open_workspace(fx.dir.path()).unwrap();
    let reloaded = store2.require(&fx.ws, &task.id).unwrap();
    assert_eq!(reloaded.phase, TaskPhase::Ready);
    assert_eq!(reloaded.history.len(), 1);
}

#[tokio::test]
async fn high_water_mark_floors_to_disk_max() {
    let fx = Fixture::new();
    fx.create_task("a", &[]);
    fx.create_task("b", &[]);

    let store2 = TaskStore::new(crate::bus::WorkspaceBus::new(), WorkflowPolicy::default());
    store2.open_workspace(fx.dir.path()).unwrap();
    let c = store2
        .create(
            &fx.ws,
            CreateTaskRequest {
                title: "c".into(),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(c.id.as_str(), "TF-3");
}

#[tokio::test]
async fn effective_policy_layers_task_over_workspace() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &[]);

    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                executing_limit: Some(4),
                ..Default::default()
            },
            &[],
        )
        .unwrap();
    fx.store
        .update(
            &fx.ws,
            &task.id,
            TaskPatch {
                automation: Some(PolicyOverride {
                    executing_limit: Some(1),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ws_policy = fx.store.effective_policy(&fx.ws, None).unwrap();
    assert_eq!(ws_policy.executing_limit, 4);
    let task_policy = fx.store.effective_policy(&fx.ws, Some(&task.id)).unwrap();
    assert_eq!(task_policy.executing_limit, 1);
}

#[tokio::test]
async fn patch_policy_clears_named_fields() {
    let fx = Fixture::new();
    fx.store
        .patch_workspace_policy(
            &fx.ws,
            PolicyOverride {
                executing_limit: Some(4),
                ..Default::default()
            },
            &[],
        )
        .unwrap();
    let ws = fx
        .store
        .patch_workspace_policy(&fx.ws, PolicyOverride::default(), &["executingLimit".into()])
        .unwrap();
    assert_eq!(ws.automation.executing_limit, None);
}

#[tokio::test]
async fn move_blocked_while_planning_running() {
    let fx = Fixture::new();
    let task = fx.create_task("t", &["c"]);
    fx.store
        .with_task_mut(&fx.ws, &task.id, |task| {
            task.planning_status = tf_core::PlanningStatus::Running;
            Ok(())
        })
        .await
        .unwrap();

    let result = fx
        .store
        .move_task(&fx.ws, &task.id, TaskPhase::Ready, Actor::User, None)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Move(MoveBlocked::PlanningInProgress))
    ));
}
