// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planning pipeline.
//!
//! A bounded planning conversation produces acceptance criteria and a
//! plan, persisted atomically through the `save_plan` tool. Budgets:
//! an outer timeout, a tool-call budget, a read-byte budget, and
//! turn-limit detection — any of which earns exactly one grace turn
//! instructing the agent to save what it has. A run that persisted a
//! plan counts as success even when the outer future fails, because the
//! save itself aborts the SDK turn on purpose.

use crate::activity::ActivityService;
use crate::automation::AutomationController;
use crate::error::EngineError;
use crate::prompts;
use crate::session::{apply_plan, Guardrails, SessionManager, SessionStatus};
use crate::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tf_adapters::{AgentSdk, SdkConversation, SdkError};
use tf_core::{LiveEvent, PlanningStatus, TaskId, WorkspaceId};

/// Budgets for one planning run.
#[derive(Debug, Clone)]
pub struct PlanningConfig {
    /// Outer ceiling on the main planning turn.
    pub timeout: Duration,
    /// Ceiling on the grace turn.
    pub grace_timeout: Duration,
    /// Completed tool calls allowed in the main turn.
    pub max_tool_calls: u32,
    /// Total tool-output bytes allowed in the main turn.
    pub read_byte_budget: u64,
    /// Ceiling on post-planning compaction.
    pub compaction_timeout: Duration,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            grace_timeout: Duration::from_secs(60),
            max_tool_calls: 20,
            read_byte_budget: 512 * 1024,
            compaction_timeout: Duration::from_secs(90),
        }
    }
}

/// What a planning run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningOutcome {
    /// Plan and criteria persisted; conversation compacted.
    Completed,
    /// No plan was persisted.
    Failed { reason: String },
}

/// Drives planning conversations for tasks.
pub struct PlanningPipeline<S: AgentSdk> {
    sessions: SessionManager<S>,
    automation: AutomationController<S>,
    config: PlanningConfig,
}

impl<S: AgentSdk> Clone for PlanningPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            automation: self.automation.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: AgentSdk> PlanningPipeline<S> {
    pub fn new(
        sessions: SessionManager<S>,
        automation: AutomationController<S>,
        config: PlanningConfig,
    ) -> Self {
        Self {
            sessions,
            automation,
            config,
        }
    }

    fn store(&self) -> &TaskStore {
        self.sessions.store()
    }

    fn activity(&self) -> &ActivityService {
        self.sessions.activity()
    }

    /// Run planning for a task. `resume` reuses the existing session
    /// file (plan regeneration keeps the research context).
    pub async fn run(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        resume: bool,
    ) -> Result<PlanningOutcome, EngineError> {
        if self.sessions.has_running_session(task_id) {
            return Err(EngineError::SessionActive(task_id.clone()));
        }

        // Mark running first; every move is blocked until this clears.
        let task = self
            .store()
            .with_task_mut(workspace_id, task_id, |task| {
                task.planning_status = PlanningStatus::Running;
                Ok(())
            })
            .await?;

        let guardrails = Arc::new(Guardrails::new(
            self.config.max_tool_calls,
            self.config.read_byte_budget,
        ));
        let resume = resume && task.session_file.is_some();
        let session = match self
            .sessions
            .open_planning_session(workspace_id, &task, resume, Arc::clone(&guardrails))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.mark_failed(workspace_id, task_id, &e.to_string()).await;
                return Err(e);
            }
        };
        let Some(conversation) = session.conversation() else {
            self.mark_failed(workspace_id, task_id, "conversation missing").await;
            return Err(EngineError::NoSession(task_id.clone()));
        };

        let workspace_root = self.store().workspace_root(workspace_id)?;
        let prompt =
            prompts::planning_prompt(&workspace_root, &task, self.config.max_tool_calls, resume);

        session.set_status(SessionStatus::Running);
        let main_turn =
            tokio::time::timeout(self.config.timeout, conversation.prompt(&prompt.text)).await;

        let timed_out = main_turn.is_err();
        if timed_out {
            conversation.abort().await;
        }
        settle().await;

        // A persisted plan wins over whatever the outer future did.
        if !session.plan_saved() {
            let tripped = guardrails.tripped();
            let turn_limit = guardrails.turn_limit_hit();
            if tripped.is_some() || turn_limit || timed_out {
                let reason = tripped
                    .clone()
                    .unwrap_or_else(|| {
                        if turn_limit {
                            "turn limit reached".to_string()
                        } else {
                            "planning timed out".to_string()
                        }
                    });
                let _ = self.activity().system_event(
                    workspace_id,
                    Some(task_id.clone()),
                    "planning-guardrail",
                    format!("planning budget exhausted: {}", reason),
                    Some(serde_json::json!({
                        "reason": reason,
                        "toolCalls": guardrails
                            .tool_calls
                            .load(std::sync::atomic::Ordering::SeqCst),
                    })),
                );

                // Exactly one grace turn: save_plan or nothing.
                guardrails.restrict_to_save_plan();
                let grace = prompts::grace_prompt(&workspace_root, &task);
                let grace_turn = tokio::time::timeout(
                    self.config.grace_timeout,
                    conversation.prompt(&grace.text),
                )
                .await;
                if grace_turn.is_err() {
                    conversation.abort().await;
                }
                settle().await;
            } else if let Ok(Err(e)) = &main_turn {
                // A provider failure without budget pressure fails the
                // run outright (no grace turn to run on a dead turn).
                if !matches!(e, SdkError::Aborted) {
                    let reason = e.to_string();
                    self.finish_failure(workspace_id, task_id, &session, &reason)
                        .await;
                    return Ok(PlanningOutcome::Failed { reason });
                }
            }
        }

        if !session.plan_saved() {
            let reason = guardrails
                .tripped()
                .unwrap_or_else(|| "agent never called save_plan".to_string());
            self.finish_failure(workspace_id, task_id, &session, &reason)
                .await;
            return Ok(PlanningOutcome::Failed { reason });
        }

        // Persist the stashed plan under the task mutex (re-read from
        // disk, mutate, save).
        if let Some(plan) = session.take_pending_plan() {
            self.store()
                .with_task_mut(workspace_id, task_id, move |task| {
                    apply_plan(task, plan);
                    Ok(())
                })
                .await?;
        }

        // Compact the conversation, preserving intent and decisions.
        let compaction = tokio::time::timeout(
            self.config.compaction_timeout,
            conversation.compact(prompts::COMPACTION_DIRECTIVE),
        )
        .await;
        match compaction {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(task_id = %task_id, error = %e, "post-planning compaction failed");
            }
            Err(_) => {
                tracing::warn!(task_id = %task_id, "post-planning compaction timed out");
            }
        }

        self.activity().emit_live(
            workspace_id,
            LiveEvent::PlanGenerated {
                task_id: task_id.clone(),
            },
        );
        let _ = self.activity().system_event(
            workspace_id,
            Some(task_id.clone()),
            "planning-completed",
            format!("plan generated for {}", task_id),
            None,
        );

        self.sessions.finish_planning_session(&session);

        // Backlog tasks auto-promote when the policy allows.
        self.automation
            .promote_after_planning(workspace_id, task_id)
            .await;

        Ok(PlanningOutcome::Completed)
    }

    async fn finish_failure(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        session: &Arc<crate::session::TaskSession<S>>,
        reason: &str,
    ) {
        self.sessions.finish_planning_session(session);
        self.mark_failed(workspace_id, task_id, reason).await;
    }

    async fn mark_failed(&self, workspace_id: &WorkspaceId, task_id: &TaskId, reason: &str) {
        let result = self
            .store()
            .with_task_mut(workspace_id, task_id, |task| {
                task.planning_status = PlanningStatus::Error;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(task_id = %task_id, error = %e, "failed to record planning error");
        }
        let _ = self.activity().system_event(
            workspace_id,
            Some(task_id.clone()),
            "planning-failed",
            format!("planning failed for {}: {}", task_id, reason),
            Some(serde_json::json!({ "error": reason })),
        );
    }
}

/// The turn future can resolve while the demultiplexer is still
/// consuming the tail of the event stream (the same race the
/// completion protocol tolerates). Give it a beat before reading the
/// guardrail accounting.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[cfg(test)]
#[path = "planning_tests.rs"]
mod tests;
