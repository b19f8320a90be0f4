// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state contract: mode derivation and the tool allow/forbid table.
//!
//! Every prompt sent to the SDK is prefixed with a compact state block
//! plus a contract reference enumerating which tools are forbidden in
//! the current mode. Tool callbacks consult [`is_forbidden`] before
//! acting, so enforcement does not depend on the model honoring the
//! prompt.

use crate::task::{PlanningStatus, TaskPhase};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Name of the completion-signal tool.
pub const TOOL_TASK_COMPLETE: &str = "task_complete";
/// Name of the plan-persistence tool.
pub const TOOL_SAVE_PLAN: &str = "save_plan";
/// Name of the attachment tool.
pub const TOOL_ATTACH_FILE: &str = "attach_task_file";

/// What a conversation was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPurpose {
    Execution,
    Planning,
    Chat,
}

/// Allowed behavior regime for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "task_planning")]
    TaskPlanning,
    #[serde(rename = "task_execution")]
    TaskExecution,
    #[serde(rename = "chat")]
    Chat,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::TaskPlanning => write!(f, "task_planning"),
            Mode::TaskExecution => write!(f, "task_execution"),
            Mode::Chat => write!(f, "chat"),
        }
    }
}

/// Derive the mode for a turn from purpose and phase.
pub fn mode_for(purpose: SessionPurpose, phase: TaskPhase) -> Mode {
    if purpose == SessionPurpose::Planning || phase == TaskPhase::Backlog {
        Mode::TaskPlanning
    } else if phase == TaskPhase::Executing {
        Mode::TaskExecution
    } else {
        Mode::Chat
    }
}

/// The tool forbid table. A forbidden tool returns an error result to
/// the SDK without its callback ever running.
pub fn is_forbidden(mode: Mode, tool: &str) -> bool {
    match mode {
        Mode::TaskPlanning => tool == TOOL_TASK_COMPLETE,
        Mode::TaskExecution => tool == TOOL_SAVE_PLAN,
        Mode::Chat => tool == TOOL_SAVE_PLAN || tool == TOOL_TASK_COMPLETE,
    }
}

/// Render the compact state block prefixed to every prompt.
pub fn state_block(phase: TaskPhase, mode: Mode, planning_status: PlanningStatus) -> String {
    format!(
        "<state>{}</state> <mode>{}</mode> <planning_status>{}</planning_status>",
        phase, mode, planning_status
    )
}

/// Contract reference enumerating, per mode, the forbidden tools.
pub const CONTRACT_REFERENCE: &str = "\
Contract: the <mode> tag above governs which tools you may call.\n\
- task_planning: `task_complete` is forbidden. Persist your plan with `save_plan`.\n\
- task_execution: `save_plan` is forbidden. Signal completion only with `task_complete`.\n\
- chat: `save_plan` and `task_complete` are forbidden.\n\
Calling a forbidden tool returns an error without taking effect.";

fn echo_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(build_echo_pattern)
}

// Matches an echoed state block, optionally followed by an echoed
// contract reference, anywhere in assistant output.
#[allow(clippy::unwrap_used)]
fn build_echo_pattern() -> Regex {
    Regex::new(
        r"(?s)<state>[^<]*</state>\s*<mode>[^<]*</mode>\s*<planning_status>[^<]*</planning_status>\s*(Contract:[^\n]*(\n- [^\n]*)*(\nCalling a forbidden tool[^\n]*)?)?",
    )
    .unwrap()
}

/// Strip an echoed state contract from assistant content before it is
/// persisted. Live stream events are not stripped.
pub fn strip_contract_echo(content: &str) -> String {
    echo_pattern().replace_all(content, "").trim().to_string()
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
