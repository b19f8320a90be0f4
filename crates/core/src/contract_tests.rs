// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    planning_purpose_in_ready = { SessionPurpose::Planning, TaskPhase::Ready, Mode::TaskPlanning },
    planning_purpose_in_executing = { SessionPurpose::Planning, TaskPhase::Executing, Mode::TaskPlanning },
    any_purpose_in_backlog = { SessionPurpose::Chat, TaskPhase::Backlog, Mode::TaskPlanning },
    execution_in_executing = { SessionPurpose::Execution, TaskPhase::Executing, Mode::TaskExecution },
    chat_in_complete = { SessionPurpose::Chat, TaskPhase::Complete, Mode::Chat },
    chat_in_ready = { SessionPurpose::Chat, TaskPhase::Ready, Mode::Chat },
    execution_in_archived = { SessionPurpose::Execution, TaskPhase::Archived, Mode::Chat },
)]
fn mode_derivation(purpose: SessionPurpose, phase: TaskPhase, expected: Mode) {
    assert_eq!(mode_for(purpose, phase), expected);
}

#[parameterized(
    save_plan_in_planning = { Mode::TaskPlanning, TOOL_SAVE_PLAN, false },
    complete_in_planning = { Mode::TaskPlanning, TOOL_TASK_COMPLETE, true },
    attach_in_planning = { Mode::TaskPlanning, TOOL_ATTACH_FILE, false },
    save_plan_in_execution = { Mode::TaskExecution, TOOL_SAVE_PLAN, true },
    complete_in_execution = { Mode::TaskExecution, TOOL_TASK_COMPLETE, false },
    attach_in_execution = { Mode::TaskExecution, TOOL_ATTACH_FILE, false },
    save_plan_in_chat = { Mode::Chat, TOOL_SAVE_PLAN, true },
    complete_in_chat = { Mode::Chat, TOOL_TASK_COMPLETE, true },
    attach_in_chat = { Mode::Chat, TOOL_ATTACH_FILE, false },
)]
fn forbidden_table(mode: Mode, tool: &str, forbidden: bool) {
    assert_eq!(is_forbidden(mode, tool), forbidden);
}

#[test]
fn state_block_renders_all_fields() {
    let block = state_block(
        TaskPhase::Executing,
        Mode::TaskExecution,
        PlanningStatus::Completed,
    );
    assert_eq!(
        block,
        "<state>executing</state> <mode>task_execution</mode> <planning_status>completed</planning_status>"
    );
}

#[test]
fn strip_removes_echoed_block() {
    let block = state_block(TaskPhase::Ready, Mode::Chat, PlanningStatus::None);
    let content = format!("{}\nActual answer here.", block);
    assert_eq!(strip_contract_echo(&content), "Actual answer here.");
}

#[test]
fn strip_removes_block_with_contract_reference() {
    let block = state_block(TaskPhase::Backlog, Mode::TaskPlanning, PlanningStatus::Running);
    let content = format!("{} {}\nPlanning now.", block, CONTRACT_REFERENCE);
    assert_eq!(strip_contract_echo(&content), "Planning now.");
}

#[test]
fn strip_leaves_ordinary_content_alone() {
    let content = "No contract here, just <state of the art> text.";
    assert_eq!(strip_contract_echo(content), content);
}

#[test]
fn strip_handles_mid_message_echo() {
    let block = state_block(TaskPhase::Ready, Mode::Chat, PlanningStatus::None);
    let content = format!("Before.\n{}\nAfter.", block);
    let stripped = strip_contract_echo(&content);
    assert!(stripped.contains("Before."));
    assert!(stripped.contains("After."));
    assert!(!stripped.contains("<state>"));
}
