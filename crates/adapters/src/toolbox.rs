// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool callback registries.
//!
//! The SDK's `task_complete`, `save_plan` and `attach_task_file` tools
//! must reach back into the server and notify one specific session. The
//! [`Toolbox`] is that route: a handle the SDK holds, with single-slot
//! registries keyed by task id. Installing into an occupied slot stashes
//! the previous callback and the returned guard restores it on drop —
//! chat turns use this to temporarily install `save_plan`.
//!
//! Every entry point consults the mode table first: a forbidden tool
//! returns an error result without its callback ever running.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tf_core::contract::{is_forbidden, Mode, TOOL_ATTACH_FILE, TOOL_SAVE_PLAN, TOOL_TASK_COMPLETE};
use tf_core::TaskId;

/// Arguments to the `save_plan` tool.
#[derive(Debug, Clone)]
pub struct SavePlanArgs {
    pub task_id: TaskId,
    pub acceptance_criteria: Vec<String>,
    pub goal: String,
    pub steps: Vec<String>,
    pub validation: Vec<String>,
    pub cleanup: Vec<String>,
}

/// Arguments to the `attach_task_file` tool, bytes already decoded.
#[derive(Debug, Clone)]
pub struct AttachFileArgs {
    pub task_id: TaskId,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Result returned to the SDK's tool runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    fn forbidden(tool: &str, mode: Mode) -> Self {
        Self::error(format!("tool {} is forbidden in mode {}", tool, mode))
    }

    fn unavailable(tool: &str) -> Self {
        Self::error(format!("tool {} is not available for this task", tool))
    }
}

pub type CompleteCallback = Arc<dyn Fn(&TaskId, &str) -> Result<String, String> + Send + Sync>;
pub type PlanCallback = Arc<dyn Fn(SavePlanArgs) -> Result<String, String> + Send + Sync>;
pub type AttachCallback = Arc<dyn Fn(AttachFileArgs) -> Result<String, String> + Send + Sync>;

#[derive(Default)]
struct ToolboxState {
    modes: HashMap<TaskId, Mode>,
    complete: HashMap<TaskId, CompleteCallback>,
    plan: HashMap<TaskId, PlanCallback>,
    attach: HashMap<TaskId, AttachCallback>,
}

/// Shared handle to the callback registries.
#[derive(Clone, Default)]
pub struct Toolbox {
    inner: Arc<Mutex<ToolboxState>>,
}

/// Restores the stashed previous callback (or clears the slot) when the
/// installing scope ends.
pub struct CallbackGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mode governing tool calls for a task's current turn.
    pub fn set_mode(&self, task_id: &TaskId, mode: Mode) {
        self.inner.lock().modes.insert(task_id.clone(), mode);
    }

    pub fn mode(&self, task_id: &TaskId) -> Option<Mode> {
        self.inner.lock().modes.get(task_id).copied()
    }

    /// Remove every slot and the mode for a task. Used on session
    /// teardown; later tool invocations get an "unavailable" result.
    pub fn clear_task(&self, task_id: &TaskId) {
        let mut state = self.inner.lock();
        state.modes.remove(task_id);
        state.complete.remove(task_id);
        state.plan.remove(task_id);
        state.attach.remove(task_id);
    }

    /// Install the completion callback; the guard restores the previous
    /// slot holder on drop.
    pub fn install_complete(&self, task_id: &TaskId, callback: CompleteCallback) -> CallbackGuard {
        let stashed = self.inner.lock().complete.insert(task_id.clone(), callback);
        self.guard(task_id.clone(), move |state, id| match stashed {
            Some(prev) => {
                state.complete.insert(id, prev);
            }
            None => {
                state.complete.remove(&id);
            }
        })
    }

    pub fn install_plan(&self, task_id: &TaskId, callback: PlanCallback) -> CallbackGuard {
        let stashed = self.inner.lock().plan.insert(task_id.clone(), callback);
        self.guard(task_id.clone(), move |state, id| match stashed {
            Some(prev) => {
                state.plan.insert(id, prev);
            }
            None => {
                state.plan.remove(&id);
            }
        })
    }

    pub fn install_attach(&self, task_id: &TaskId, callback: AttachCallback) -> CallbackGuard {
        let stashed = self.inner.lock().attach.insert(task_id.clone(), callback);
        self.guard(task_id.clone(), move |state, id| match stashed {
            Some(prev) => {
                state.attach.insert(id, prev);
            }
            None => {
                state.attach.remove(&id);
            }
        })
    }

    fn guard(
        &self,
        task_id: TaskId,
        restore: impl FnOnce(&mut ToolboxState, TaskId) + Send + 'static,
    ) -> CallbackGuard {
        let inner = Arc::clone(&self.inner);
        CallbackGuard {
            restore: Some(Box::new(move || {
                let mut state = inner.lock();
                restore(&mut state, task_id);
            })),
        }
    }

    fn gate(&self, task_id: &TaskId, tool: &str) -> Option<ToolResult> {
        let state = self.inner.lock();
        match state.modes.get(task_id) {
            Some(mode) if is_forbidden(*mode, tool) => Some(ToolResult::forbidden(tool, *mode)),
            Some(_) => None,
            None => Some(ToolResult::unavailable(tool)),
        }
    }

    // -------------------------------------------------------------------
    // SDK entry points
    // -------------------------------------------------------------------

    /// `task_complete(taskId, summary)`
    pub fn task_complete(&self, task_id: &TaskId, summary: &str) -> ToolResult {
        if let Some(denied) = self.gate(task_id, TOOL_TASK_COMPLETE) {
            return denied;
        }
        let callback = self.inner.lock().complete.get(task_id).cloned();
        match callback {
            Some(callback) => match callback(task_id, summary) {
                Ok(message) => ToolResult::ok(message),
                Err(message) => ToolResult::error(message),
            },
            None => ToolResult::unavailable(TOOL_TASK_COMPLETE),
        }
    }

    /// `save_plan(taskId, acceptanceCriteria, goal, steps, validation, cleanup)`
    pub fn save_plan(&self, args: SavePlanArgs) -> ToolResult {
        if let Some(denied) = self.gate(&args.task_id, TOOL_SAVE_PLAN) {
            return denied;
        }
        let callback = self.inner.lock().plan.get(&args.task_id).cloned();
        match callback {
            Some(callback) => match callback(args) {
                Ok(message) => ToolResult::ok(message),
                Err(message) => ToolResult::error(message),
            },
            None => ToolResult::unavailable(TOOL_SAVE_PLAN),
        }
    }

    /// `attach_task_file(taskId, filename, mimeType, bytesBase64)`
    pub fn attach_task_file(
        &self,
        task_id: &TaskId,
        filename: &str,
        mime_type: &str,
        bytes_base64: &str,
    ) -> ToolResult {
        if let Some(denied) = self.gate(task_id, TOOL_ATTACH_FILE) {
            return denied;
        }
        use base64::Engine as _;
        let bytes = match base64::engine::general_purpose::STANDARD.decode(bytes_base64) {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::error(format!("invalid base64 payload: {}", e)),
        };
        let callback = self.inner.lock().attach.get(task_id).cloned();
        match callback {
            Some(callback) => {
                let args = AttachFileArgs {
                    task_id: task_id.clone(),
                    filename: filename.to_string(),
                    mime_type: mime_type.to_string(),
                    bytes,
                };
                match callback(args) {
                    Ok(message) => ToolResult::ok(message),
                    Err(message) => ToolResult::error(message),
                }
            }
            None => ToolResult::unavailable(TOOL_ATTACH_FILE),
        }
    }

    /// Dispatch a named orchestrator tool from raw SDK arguments.
    ///
    /// Returns `None` when the tool is not one of ours, so the caller
    /// can pass it through to its own tool runner.
    pub fn dispatch(&self, tool_name: &str, args: &serde_json::Value) -> Option<ToolResult> {
        let task_id = TaskId::new(args.get("taskId").and_then(|v| v.as_str()).unwrap_or(""));
        match tool_name {
            TOOL_TASK_COMPLETE => {
                let summary = args.get("summary").and_then(|v| v.as_str()).unwrap_or("");
                Some(self.task_complete(&task_id, summary))
            }
            TOOL_SAVE_PLAN => Some(self.save_plan(SavePlanArgs {
                task_id,
                acceptance_criteria: string_list(args, "acceptanceCriteria"),
                goal: args
                    .get("goal")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                steps: string_list(args, "steps"),
                validation: string_list(args, "validation"),
                cleanup: string_list(args, "cleanup"),
            })),
            TOOL_ATTACH_FILE => Some(self.attach_task_file(
                &task_id,
                args.get("filename").and_then(|v| v.as_str()).unwrap_or(""),
                args.get("mimeType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("application/octet-stream"),
                args.get("bytesBase64").and_then(|v| v.as_str()).unwrap_or(""),
            )),
            _ => None,
        }
    }
}

fn string_list(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "toolbox_tests.rs"]
mod tests;
