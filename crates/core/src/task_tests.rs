// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use yare::parameterized;

fn task_in(phase: TaskPhase) -> Task {
    let mut task = Task::new(TaskId::numbered(1), "test", Utc::now());
    task.phase = phase;
    task.acceptance_criteria = vec!["compiles".into()];
    task
}

#[test]
fn task_id_numbered_format() {
    assert_eq!(TaskId::numbered(7).as_str(), "TF-7");
}

#[test]
fn task_id_numeric_suffix() {
    assert_eq!(TaskId::new("TF-42").numeric_suffix(), Some(42));
    assert_eq!(TaskId::new("weird").numeric_suffix(), None);
}

#[test]
fn new_task_starts_in_backlog() {
    let task = Task::new(TaskId::numbered(1), "idea", Utc::now());
    assert_eq!(task.phase, TaskPhase::Backlog);
    assert_eq!(task.planning_status, PlanningStatus::None);
    assert!(task.history.is_empty());
}

#[parameterized(
    backlog_ready = { TaskPhase::Backlog, TaskPhase::Ready },
    backlog_complete = { TaskPhase::Backlog, TaskPhase::Complete },
    backlog_archived = { TaskPhase::Backlog, TaskPhase::Archived },
    ready_executing = { TaskPhase::Ready, TaskPhase::Executing },
    ready_archived = { TaskPhase::Ready, TaskPhase::Archived },
    executing_complete = { TaskPhase::Executing, TaskPhase::Complete },
    executing_ready = { TaskPhase::Executing, TaskPhase::Ready },
    executing_archived = { TaskPhase::Executing, TaskPhase::Archived },
    complete_ready = { TaskPhase::Complete, TaskPhase::Ready },
    complete_archived = { TaskPhase::Complete, TaskPhase::Archived },
    archived_complete = { TaskPhase::Archived, TaskPhase::Complete },
    archived_backlog = { TaskPhase::Archived, TaskPhase::Backlog },
)]
fn allowed_transitions(from: TaskPhase, to: TaskPhase) {
    assert_eq!(task_in(from).can_move_to(to), Ok(()));
}

#[parameterized(
    backlog_executing = { TaskPhase::Backlog, TaskPhase::Executing },
    ready_backlog = { TaskPhase::Ready, TaskPhase::Backlog },
    ready_complete = { TaskPhase::Ready, TaskPhase::Complete },
    executing_backlog = { TaskPhase::Executing, TaskPhase::Backlog },
    complete_backlog = { TaskPhase::Complete, TaskPhase::Backlog },
    complete_executing = { TaskPhase::Complete, TaskPhase::Executing },
    archived_ready = { TaskPhase::Archived, TaskPhase::Ready },
    archived_executing = { TaskPhase::Archived, TaskPhase::Executing },
)]
fn forbidden_transitions(from: TaskPhase, to: TaskPhase) {
    assert_eq!(
        task_in(from).can_move_to(to),
        Err(MoveBlocked::InvalidTransition { from, to })
    );
}

#[test]
fn same_phase_is_rejected() {
    assert_eq!(
        task_in(TaskPhase::Ready).can_move_to(TaskPhase::Ready),
        Err(MoveBlocked::SamePhase(TaskPhase::Ready))
    );
}

#[test]
fn backlog_to_ready_requires_criteria() {
    let mut task = task_in(TaskPhase::Backlog);
    task.acceptance_criteria.clear();
    assert_eq!(
        task.can_move_to(TaskPhase::Ready),
        Err(MoveBlocked::MissingAcceptanceCriteria)
    );
}

#[test]
fn whitespace_only_criteria_do_not_count() {
    let mut task = task_in(TaskPhase::Backlog);
    task.acceptance_criteria = vec!["  ".into(), "\t".into()];
    assert_eq!(
        task.can_move_to(TaskPhase::Ready),
        Err(MoveBlocked::MissingAcceptanceCriteria)
    );
}

#[test]
fn moves_blocked_while_planning_runs() {
    let mut task = task_in(TaskPhase::Backlog);
    task.planning_status = PlanningStatus::Running;
    assert_eq!(
        task.can_move_to(TaskPhase::Ready),
        Err(MoveBlocked::PlanningInProgress)
    );
    // Even otherwise-valid moves are blocked
    assert_eq!(
        task.can_move_to(TaskPhase::Archived),
        Err(MoveBlocked::PlanningInProgress)
    );
}

#[test]
fn record_transition_updates_phase_and_history() {
    let mut task = task_in(TaskPhase::Ready);
    let at = Utc::now();
    task.record_transition(TaskPhase::Executing, Actor::Automation, Some("kick".into()), at);

    assert_eq!(task.phase, TaskPhase::Executing);
    assert_eq!(task.history.len(), 1);
    let rec = &task.history[0];
    assert_eq!(rec.from, TaskPhase::Ready);
    assert_eq!(rec.to, TaskPhase::Executing);
    assert_eq!(rec.actor, Actor::Automation);
    assert_eq!(rec.reason.as_deref(), Some("kick"));
    assert_eq!(task.updated, at);
}

#[test]
fn normalize_criteria_trims_and_drops_empties() {
    let out = normalize_criteria(vec![
        "  compiles  ".into(),
        "".into(),
        "   ".into(),
        "tests pass".into(),
    ]);
    assert_eq!(out, vec!["compiles".to_string(), "tests pass".to_string()]);
}

#[test]
fn normalize_criteria_dedupes_case_insensitively() {
    let out = normalize_criteria(vec![
        "Compiles".into(),
        "compiles".into(),
        "COMPILES ".into(),
        "other".into(),
    ]);
    assert_eq!(out, vec!["Compiles".to_string(), "other".to_string()]);
}

#[test]
fn task_yaml_round_trip() {
    let mut task = task_in(TaskPhase::Executing);
    task.plan = Some(crate::plan::Plan::new("ship it", Utc::now()));
    task.usage.record(
        Some("sonnet"),
        &crate::usage::UsageDelta {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        },
    );

    let json = serde_json::to_string(&task).unwrap();
    let parsed: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, task);
}

#[test]
fn phase_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&TaskPhase::Executing).unwrap(),
        "\"executing\""
    );
}
