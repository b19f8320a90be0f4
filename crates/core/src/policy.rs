// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow policy: WIP limits and auto-promotion toggles.

use serde::{Deserialize, Serialize};

/// Fully resolved workflow policy. A limit of `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Maximum tasks in `ready` (0 = unlimited).
    pub ready_limit: u32,
    /// Maximum tasks in `executing` (0 = unlimited).
    pub executing_limit: u32,
    /// Auto-promote `backlog → ready` when planning completes.
    pub backlog_to_ready: bool,
    /// Auto-start executions for `ready` tasks under the WIP limit.
    pub ready_to_executing: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            ready_limit: 0,
            executing_limit: 1,
            backlog_to_ready: false,
            ready_to_executing: false,
        }
    }
}

impl WorkflowPolicy {
    /// True when `count` is below the ready limit (or the limit is off).
    pub fn ready_has_room(&self, count: usize) -> bool {
        self.ready_limit == 0 || count < self.ready_limit as usize
    }

    /// True when `count` is below the executing limit (or the limit is off).
    pub fn executing_has_room(&self, count: usize) -> bool {
        self.executing_limit == 0 || count < self.executing_limit as usize
    }
}

/// A partial policy at one precedence level. `None` means inherit from
/// the level below; patching a field to null clears the override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executing_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_to_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_executing: Option<bool>,
}

impl PolicyOverride {
    pub fn is_empty(&self) -> bool {
        self.ready_limit.is_none()
            && self.executing_limit.is_none()
            && self.backlog_to_ready.is_none()
            && self.ready_to_executing.is_none()
    }

    /// Apply this override on top of a resolved base.
    pub fn layer(&self, base: WorkflowPolicy) -> WorkflowPolicy {
        WorkflowPolicy {
            ready_limit: self.ready_limit.unwrap_or(base.ready_limit),
            executing_limit: self.executing_limit.unwrap_or(base.executing_limit),
            backlog_to_ready: self.backlog_to_ready.unwrap_or(base.backlog_to_ready),
            ready_to_executing: self.ready_to_executing.unwrap_or(base.ready_to_executing),
        }
    }

    /// Merge a patch into this override. `Some` fields replace; fields the
    /// caller wants cleared must be cleared explicitly before merging.
    pub fn merge(&mut self, patch: PolicyOverride) {
        if patch.ready_limit.is_some() {
            self.ready_limit = patch.ready_limit;
        }
        if patch.executing_limit.is_some() {
            self.executing_limit = patch.executing_limit;
        }
        if patch.backlog_to_ready.is_some() {
            self.backlog_to_ready = patch.backlog_to_ready;
        }
        if patch.ready_to_executing.is_some() {
            self.ready_to_executing = patch.ready_to_executing;
        }
    }
}

/// Resolve the effective policy: task override → workspace override →
/// global defaults.
pub fn effective_policy(
    task: &PolicyOverride,
    workspace: &PolicyOverride,
    defaults: WorkflowPolicy,
) -> WorkflowPolicy {
    task.layer(workspace.layer(defaults))
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
