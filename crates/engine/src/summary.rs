// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-execution summary.
//!
//! Built deterministically from what the session observed: the agent's
//! completion summary, files touched by write-ish tool calls, and the
//! acceptance criteria with whatever evidence the summary offers.

use std::collections::BTreeSet;
use tf_core::Task;

/// Session telemetry the summary is rendered from.
#[derive(Debug, Clone, Default)]
pub struct SessionDigest {
    pub completion_summary: Option<String>,
    pub touched_files: BTreeSet<String>,
    pub turns: u64,
    pub tool_calls: u64,
}

/// Render the summary markdown for a finished execution.
pub fn render_summary(task: &Task, digest: &SessionDigest) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} — execution summary\n\n", task.id));

    match &digest.completion_summary {
        Some(summary) => {
            out.push_str("## Agent summary\n\n");
            out.push_str(summary.trim());
            out.push_str("\n\n");
        }
        None => {
            out.push_str("## Agent summary\n\n_No completion summary was provided._\n\n");
        }
    }

    out.push_str("## Acceptance criteria\n\n");
    if task.acceptance_criteria.is_empty() {
        out.push_str("_No acceptance criteria were recorded._\n");
    } else {
        for criterion in &task.acceptance_criteria {
            let evidence = criterion_evidence(criterion, digest.completion_summary.as_deref());
            match evidence {
                Some(evidence) => {
                    out.push_str(&format!("- [x] {} — {}\n", criterion, evidence));
                }
                None => {
                    out.push_str(&format!("- [ ] {} — not addressed in the summary\n", criterion));
                }
            }
        }
    }
    out.push('\n');

    out.push_str("## Files changed\n\n");
    if digest.touched_files.is_empty() {
        out.push_str("_No file-modifying tool calls were observed._\n");
    } else {
        for file in &digest.touched_files {
            out.push_str(&format!("- {}\n", file));
        }
    }
    out.push('\n');

    out.push_str(&format!(
        "## Session\n\n{} turn(s), {} tool call(s).\n",
        digest.turns, digest.tool_calls
    ));
    out
}

/// Look for the criterion's key words in the agent summary; the
/// matching sentence becomes the evidence line.
fn criterion_evidence(criterion: &str, summary: Option<&str>) -> Option<String> {
    let summary = summary?;
    let needles: Vec<String> = criterion
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    if needles.is_empty() {
        return None;
    }

    for sentence in summary.split(['.', '\n']) {
        let lowered = sentence.to_lowercase();
        if needles.iter().any(|needle| lowered.contains(needle)) {
            let trimmed = sentence.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Tool names whose calls count as file modifications.
pub fn is_write_tool(tool_name: &str) -> bool {
    let lowered = tool_name.to_lowercase();
    lowered.contains("write") || lowered.contains("edit") || lowered == "notebookedit"
}

/// Pull a file path out of write-ish tool arguments.
pub fn touched_file(args: &serde_json::Value) -> Option<String> {
    for key in ["file_path", "path", "filename", "notebook_path"] {
        if let Some(path) = args.get(key).and_then(|v| v.as_str()) {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
#[path = "summary_tests.rs"]
mod tests;
