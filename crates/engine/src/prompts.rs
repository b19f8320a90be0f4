// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly.
//!
//! Prompts are built from `{{var}}` templates. Built-in defaults cover
//! execution, rework, planning, resume-planning, chat and the planning
//! grace turn; a workspace can override any of them with a file under
//! `templates/<name>.md`. Every assembled prompt starts with the state
//! block and contract reference.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tf_core::contract::{mode_for, state_block, Mode, SessionPurpose, CONTRACT_REFERENCE};
use tf_core::Task;
use tf_storage::skills::{load_shared_context, load_skills, load_template_override};

pub const TEMPLATE_EXECUTION: &str = "execution";
pub const TEMPLATE_REWORK: &str = "rework";
pub const TEMPLATE_PLANNING: &str = "planning";
pub const TEMPLATE_RESUME_PLANNING: &str = "resume-planning";
pub const TEMPLATE_CHAT: &str = "chat";
pub const TEMPLATE_GRACE: &str = "grace";

const DEFAULT_EXECUTION: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
You are implementing task {{taskId}}: {{title}}\n\n\
{{description}}\n\n\
Acceptance criteria:\n{{acceptanceCriteria}}\n\n\
{{plan}}{{sharedContext}}{{skills}}{{attachments}}\
Work until every acceptance criterion holds, then call `task_complete` \
with a short summary. Finishing a turn without calling it leaves the \
task waiting for user input.";

const DEFAULT_REWORK: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
Task {{taskId}} ({{title}}) was sent back for rework.\n\n\
{{description}}\n\n\
Acceptance criteria:\n{{acceptanceCriteria}}\n\n\
{{plan}}{{sharedContext}}{{skills}}\
Review what was done before, fix what falls short, and call \
`task_complete` when every criterion holds again.";

const DEFAULT_PLANNING: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
Plan task {{taskId}}: {{title}}\n\n\
{{description}}\n\n\
{{sharedContext}}{{skills}}{{attachments}}\
Research the codebase as needed (at most {{maxToolCalls}} tool calls), \
then call `save_plan` exactly once with acceptance criteria, a goal, \
ordered steps, validation and cleanup. Do not start implementing.";

const DEFAULT_RESUME_PLANNING: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
Planning for task {{taskId}} ({{title}}) is being resumed. Your earlier \
research is in this conversation. Consolidate it and call `save_plan` \
now; do not start implementing.";

const DEFAULT_CHAT: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
This conversation concerns task {{taskId}}: {{title}} (phase: {{phase}}).\n\n\
{{description}}\n\n\
Acceptance criteria:\n{{acceptanceCriteria}}\n\n\
Answer the user's messages about this task.";

const DEFAULT_GRACE: &str = "\
{{stateBlock}}\n{{contractReference}}\n\n\
The planning budget for task {{taskId}} is exhausted. Call `save_plan` \
immediately with the best plan your research so far supports. Do not \
call any other tool.";

/// Conversation-compaction directive used after planning succeeds.
pub const COMPACTION_DIRECTIVE: &str = "\
Summarize this planning conversation. Preserve the user's intent, \
constraints, architectural decisions, risks, trade-offs, the acceptance \
criteria and the saved plan. Drop raw file contents and tool output.";

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(build_placeholder_pattern)
}

#[allow(clippy::unwrap_used)]
fn build_placeholder_pattern() -> Regex {
    Regex::new(r"\{\{(\w+)\}\}").unwrap()
}

/// Substitute `{{var}}` placeholders in a single pass. Unknown
/// placeholders are left intact, and substituted values are never
/// rescanned, so task fields containing `{{...}}` stay literal.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn template_body(workspace_root: &Path, name: &str, default: &'static str) -> String {
    match load_template_override(workspace_root, name) {
        Ok(Some(body)) => body,
        Ok(None) => default.to_string(),
        Err(e) => {
            tracing::warn!(template = name, error = %e, "template override unreadable, using default");
            default.to_string()
        }
    }
}

fn base_vars(task: &Task, purpose: SessionPurpose) -> (Mode, HashMap<&'static str, String>) {
    let mode = mode_for(purpose, task.phase);
    let mut vars: HashMap<&'static str, String> = HashMap::new();
    vars.insert(
        "stateBlock",
        state_block(task.phase, mode, task.planning_status),
    );
    vars.insert("contractReference", CONTRACT_REFERENCE.to_string());
    vars.insert("taskId", task.id.to_string());
    vars.insert("title", task.title.clone());
    vars.insert("phase", task.phase.to_string());
    vars.insert("description", task.description.clone());
    vars.insert(
        "acceptanceCriteria",
        if task.acceptance_criteria.is_empty() {
            "- (none yet)".to_string()
        } else {
            task.acceptance_criteria
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n")
        },
    );
    vars.insert(
        "plan",
        match &task.plan {
            Some(plan) => {
                let mut out = format!("Plan goal: {}\n", plan.goal);
                for step in &plan.steps {
                    out.push_str(&format!("- {}\n", step));
                }
                out.push('\n');
                out
            }
            None => String::new(),
        },
    );
    vars.insert(
        "attachments",
        if task.attachments.is_empty() {
            String::new()
        } else {
            let mut out = String::from("Attached files:\n");
            for attachment in &task.attachments {
                out.push_str(&format!(
                    "- {} ({}, {} bytes)\n",
                    attachment.filename, attachment.mime_type, attachment.size
                ));
            }
            out.push('\n');
            out
        },
    );
    (mode, vars)
}

fn skills_var(workspace_root: &Path, ids: &[String]) -> String {
    let skills = load_skills(workspace_root, ids);
    if skills.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    for skill in skills {
        out.push_str(&format!("## Skill: {}\n{}\n\n", skill.id, skill.content));
    }
    out
}

fn shared_context_var(workspace_root: &Path) -> String {
    match load_shared_context(workspace_root) {
        Ok(Some(context)) => format!("Shared context:\n{}\n\n", context),
        _ => String::new(),
    }
}

/// An assembled prompt plus the mode it was assembled under.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub mode: Mode,
}

/// The execution prompt (or the rework variant when the task has been
/// through `complete` before).
pub fn execution_prompt(workspace_root: &Path, task: &Task) -> AssembledPrompt {
    let rework = task
        .history
        .iter()
        .any(|t| t.from == tf_core::TaskPhase::Complete && t.to == tf_core::TaskPhase::Ready);
    let (name, default) = if rework {
        (TEMPLATE_REWORK, DEFAULT_REWORK)
    } else {
        (TEMPLATE_EXECUTION, DEFAULT_EXECUTION)
    };

    let (mode, mut vars) = base_vars(task, SessionPurpose::Execution);
    vars.insert("sharedContext", shared_context_var(workspace_root));
    vars.insert("skills", skills_var(workspace_root, &task.pre_execution_skills));
    AssembledPrompt {
        text: render(&template_body(workspace_root, name, default), &vars),
        mode,
    }
}

/// The planning prompt; `resume` selects the resume-planning variant.
pub fn planning_prompt(
    workspace_root: &Path,
    task: &Task,
    max_tool_calls: u32,
    resume: bool,
) -> AssembledPrompt {
    let (name, default) = if resume {
        (TEMPLATE_RESUME_PLANNING, DEFAULT_RESUME_PLANNING)
    } else {
        (TEMPLATE_PLANNING, DEFAULT_PLANNING)
    };
    let (mode, mut vars) = base_vars(task, SessionPurpose::Planning);
    vars.insert("sharedContext", shared_context_var(workspace_root));
    vars.insert("skills", skills_var(workspace_root, &task.pre_planning_skills));
    vars.insert("maxToolCalls", max_tool_calls.to_string());
    AssembledPrompt {
        text: render(&template_body(workspace_root, name, default), &vars),
        mode,
    }
}

/// The grace-turn prompt after a planning guardrail trips.
pub fn grace_prompt(workspace_root: &Path, task: &Task) -> AssembledPrompt {
    let (mode, vars) = base_vars(task, SessionPurpose::Planning);
    AssembledPrompt {
        text: render(
            &template_body(workspace_root, TEMPLATE_GRACE, DEFAULT_GRACE),
            &vars,
        ),
        mode,
    }
}

/// The contextualizing prompt that opens a fresh chat session.
pub fn chat_intro_prompt(workspace_root: &Path, task: &Task) -> AssembledPrompt {
    let (mode, mut vars) = base_vars(task, SessionPurpose::Chat);
    vars.insert("sharedContext", shared_context_var(workspace_root));
    AssembledPrompt {
        text: render(
            &template_body(workspace_root, TEMPLATE_CHAT, DEFAULT_CHAT),
            &vars,
        ),
        mode,
    }
}

/// Prefix a user message with the state contract for chat/resume turns.
pub fn contract_prefixed(task: &Task, purpose: SessionPurpose, message: &str) -> AssembledPrompt {
    let mode = mode_for(purpose, task.phase);
    AssembledPrompt {
        text: format!(
            "{}\n{}\n\n{}",
            state_block(task.phase, mode, task.planning_status),
            CONTRACT_REFERENCE,
            message
        ),
        mode,
    }
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
