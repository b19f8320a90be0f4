// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and phase state machine.
//!
//! A task moves through the Kanban phases `backlog → ready → executing →
//! complete`, with `archived` reachable from every live phase. The single
//! authoritative transition check is [`Task::can_move_to`]; every caller
//! that persists a phase change must go through it.

use crate::plan::Plan;
use crate::policy::PolicyOverride;
use crate::usage::UsageMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a task within its workspace.
    ///
    /// Ids carry a monotonically increasing numeric suffix (`TF-7`) and
    /// are never reused, even after the task is deleted.
    pub struct TaskId;
}

/// Prefix for generated task ids.
pub const TASK_ID_PREFIX: &str = "TF";

impl TaskId {
    /// Build the id for the given numeric suffix: `TF-{n}`.
    pub fn numbered(n: u64) -> Self {
        Self(format!("{}-{}", TASK_ID_PREFIX, n))
    }

    /// The numeric suffix of the id, if it has one.
    pub fn numeric_suffix(&self) -> Option<u64> {
        self.0.rsplit('-').next()?.parse().ok()
    }
}

/// Kanban column a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Backlog,
    Ready,
    Executing,
    Complete,
    Archived,
}

impl TaskPhase {
    /// Phases that are not archived.
    pub const LIVE: [TaskPhase; 4] = [
        TaskPhase::Backlog,
        TaskPhase::Ready,
        TaskPhase::Executing,
        TaskPhase::Complete,
    ];

    pub fn is_archived(&self) -> bool {
        matches!(self, TaskPhase::Archived)
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPhase::Backlog => write!(f, "backlog"),
            TaskPhase::Ready => write!(f, "ready"),
            TaskPhase::Executing => write!(f, "executing"),
            TaskPhase::Complete => write!(f, "complete"),
            TaskPhase::Archived => write!(f, "archived"),
        }
    }
}

/// Planning lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningStatus {
    #[default]
    None,
    Running,
    Completed,
    Error,
}

impl fmt::Display for PlanningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningStatus::None => write!(f, "none"),
            PlanningStatus::Running => write!(f, "running"),
            PlanningStatus::Completed => write!(f, "completed"),
            PlanningStatus::Error => write!(f, "error"),
        }
    }
}

/// Who initiated a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    Agent,
    Automation,
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User => write!(f, "user"),
            Actor::Agent => write!(f, "agent"),
            Actor::Automation => write!(f, "automation"),
            Actor::System => write!(f, "system"),
        }
    }
}

/// One entry in a task's transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: TaskPhase,
    pub to: TaskPhase,
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Attachment metadata stored on the task record. The bytes live next to
/// the record under the task directory, keyed by `stored_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub id: String,
    pub filename: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Reasoning effort requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Low,
    Medium,
    High,
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThinkingLevel::Off => write!(f, "off"),
            ThinkingLevel::Low => write!(f, "low"),
            ThinkingLevel::Medium => write!(f, "medium"),
            ThinkingLevel::High => write!(f, "high"),
        }
    }
}

/// Model selection for one purpose (planning or execution).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<ThinkingLevel>,
}

/// A task record. Persisted per task as YAML; the in-memory copy is a
/// projection that is re-read from disk before every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub phase: TaskPhase,
    /// Position within the phase. Renumbered on every insert, move and
    /// reorder so values within a phase form a duplicate-free total order.
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub planning_status: PlanningStatus,
    /// Opaque SDK conversation handle. Once set it may only be replaced
    /// by a new SDK-minted handle, never invented locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_planning_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_execution_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_execution_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_model: Option<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_model: Option<ModelConfig>,
    #[serde(default)]
    pub usage: UsageMetrics,
    /// Task-level workflow policy override (highest precedence).
    #[serde(default, skip_serializing_if = "PolicyOverride::is_empty")]
    pub automation: PolicyOverride,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PhaseTransition>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Structured rejection from [`Task::can_move_to`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveBlocked {
    #[error("task is already in {0}")]
    SamePhase(TaskPhase),
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: TaskPhase, to: TaskPhase },
    #[error("at least one acceptance criterion is required to leave backlog")]
    MissingAcceptanceCriteria,
    #[error("task cannot move while planning is running")]
    PlanningInProgress,
}

impl Task {
    /// Create a new task in backlog.
    pub fn new(id: TaskId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            phase: TaskPhase::Backlog,
            order: 0,
            acceptance_criteria: Vec::new(),
            plan: None,
            planning_status: PlanningStatus::None,
            session_file: None,
            attachments: Vec::new(),
            pre_planning_skills: Vec::new(),
            pre_execution_skills: Vec::new(),
            post_execution_skills: Vec::new(),
            planning_model: None,
            execution_model: None,
            usage: UsageMetrics::default(),
            automation: PolicyOverride::default(),
            history: Vec::new(),
            created: now,
            updated: now,
        }
    }

    /// True if the task carries at least one non-empty acceptance criterion.
    pub fn has_acceptance_criteria(&self) -> bool {
        self.acceptance_criteria.iter().any(|c| !c.trim().is_empty())
    }

    /// The authoritative phase state machine.
    ///
    /// Allowed transitions:
    /// - `backlog → ready` (requires acceptance criteria), `backlog → complete`,
    ///   `backlog → archived`
    /// - `ready ↔ executing`, `ready → archived`
    /// - `executing → complete`, `executing → ready`, `executing → archived`
    /// - `complete → ready`, `complete → archived`
    /// - `archived → complete`, `archived → backlog`
    ///
    /// `backlog → executing` is explicitly forbidden (no skipping
    /// planning), as is any move while planning is running.
    pub fn can_move_to(&self, to: TaskPhase) -> Result<(), MoveBlocked> {
        use TaskPhase::*;

        if self.planning_status == PlanningStatus::Running {
            return Err(MoveBlocked::PlanningInProgress);
        }
        if self.phase == to {
            return Err(MoveBlocked::SamePhase(to));
        }

        let allowed = match (self.phase, to) {
            (Backlog, Ready) => {
                if !self.has_acceptance_criteria() {
                    return Err(MoveBlocked::MissingAcceptanceCriteria);
                }
                true
            }
            (Backlog, Complete) | (Backlog, Archived) => true,
            (Ready, Executing) | (Ready, Archived) => true,
            (Executing, Complete) | (Executing, Ready) | (Executing, Archived) => true,
            (Complete, Ready) | (Complete, Archived) => true,
            (Archived, Complete) | (Archived, Backlog) => true,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(MoveBlocked::InvalidTransition {
                from: self.phase,
                to,
            })
        }
    }

    /// Record a transition in the history log.
    pub fn record_transition(
        &mut self,
        to: TaskPhase,
        actor: Actor,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.history.push(PhaseTransition {
            from: self.phase,
            to,
            actor,
            reason,
            at,
        });
        self.phase = to;
        self.updated = at;
    }

    /// Replace the acceptance criteria with a normalized copy.
    pub fn set_acceptance_criteria(&mut self, criteria: Vec<String>) {
        self.acceptance_criteria = normalize_criteria(criteria);
    }
}

/// Trim criteria, drop empties, and dedupe case-insensitively keeping
/// the first occurrence.
pub fn normalize_criteria(criteria: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for c in criteria {
        let trimmed = c.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(trimmed.to_string());
    }
    out
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
