// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace automation controller.
//!
//! Reacts to phase transitions, planning completion and explicit queue
//! kicks: promotes planned backlog tasks into `ready` and starts
//! executions for `ready` tasks under the effective WIP limits. One
//! kick runs per workspace at a time; a kick that finds nothing
//! actionable returns without side effects.

use crate::activity::ActivityService;
use crate::error::EngineError;
use crate::session::SessionManager;
use crate::store::TaskStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tf_adapters::AgentSdk;
use tf_core::{Actor, TaskId, TaskPhase, WorkflowPolicy, WorkspaceId};
use tokio::sync::mpsc;

/// Snapshot returned by the queue status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<TaskId>,
    pub executing: usize,
    pub ready: usize,
    pub policy: WorkflowPolicy,
}

struct AutoInner<S: AgentSdk> {
    store: TaskStore,
    activity: ActivityService,
    sessions: SessionManager<S>,
    kick_locks: Mutex<HashMap<WorkspaceId, Arc<tokio::sync::Mutex<()>>>>,
    current: Mutex<HashMap<WorkspaceId, TaskId>>,
    /// Delay before re-kicking after a failed auto-start.
    retry_backoff: Duration,
}

/// Per-process automation supervisor over every open workspace.
pub struct AutomationController<S: AgentSdk> {
    inner: Arc<AutoInner<S>>,
}

impl<S: AgentSdk> Clone for AutomationController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AgentSdk> AutomationController<S> {
    pub fn new(store: TaskStore, activity: ActivityService, sessions: SessionManager<S>) -> Self {
        Self {
            inner: Arc::new(AutoInner {
                store,
                activity,
                sessions,
                kick_locks: Mutex::new(HashMap::new()),
                current: Mutex::new(HashMap::new()),
                retry_backoff: Duration::from_secs(10),
            }),
        }
    }

    #[cfg(test)]
    pub fn with_retry_backoff(self, backoff: Duration) -> Self {
        // Test-only knob; the Arc is still unshared at construction.
        let mut inner = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic!("with_retry_backoff after sharing"));
        inner.retry_backoff = backoff;
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Consume kick requests (from the store's transition hook and from
    /// session completions) until the channel closes.
    pub fn spawn_kick_loop(
        &self,
        mut rx: mpsc::UnboundedReceiver<WorkspaceId>,
    ) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(workspace_id) = rx.recv().await {
                controller.kick(&workspace_id).await;
            }
        })
    }

    fn kick_lock(&self, workspace_id: &WorkspaceId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.inner
                .kick_locks
                .lock()
                .entry(workspace_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// One queue pass. Picks the first `ready` task without a running
    /// session, confirms the executing WIP limit, moves it and starts
    /// an execution session.
    pub async fn kick(&self, workspace_id: &WorkspaceId) {
        let lock = self.kick_lock(workspace_id);
        // Serial per workspace; a concurrent kick means one is already
        // looking at this queue.
        let Ok(_held) = lock.try_lock() else {
            return;
        };

        let result = self.kick_once(workspace_id).await;
        if let Err(e) = result {
            tracing::warn!(workspace_id = %workspace_id, error = %e, "queue kick failed");
        }
    }

    async fn kick_once(&self, workspace_id: &WorkspaceId) -> Result<(), EngineError> {
        let workspace = self.inner.store.workspace(workspace_id)?;
        if !workspace.queue_enabled {
            return Ok(());
        }
        let policy = self.inner.store.effective_policy(workspace_id, None)?;
        if !policy.ready_to_executing {
            return Ok(());
        }

        let executing = self
            .inner
            .store
            .in_phase(workspace_id, TaskPhase::Executing)?;
        if !policy.executing_has_room(executing.len()) {
            return Ok(());
        }

        // Highest priority = first in phase order.
        let candidate = self
            .inner
            .store
            .in_phase(workspace_id, TaskPhase::Ready)?
            .into_iter()
            .find(|t| !self.inner.sessions.has_running_session(&t.id));
        let Some(task) = candidate else {
            return Ok(());
        };
        let task_id = task.id.clone();
        // Per-task policy may be stricter than the workspace's.
        let policy = self
            .inner
            .store
            .effective_policy(workspace_id, Some(&task_id))?;
        if !policy.ready_to_executing || !policy.executing_has_room(executing.len()) {
            return Ok(());
        }

        self.inner
            .current
            .lock()
            .insert(workspace_id.clone(), task_id.clone());

        let controller = self.clone();
        let ws = workspace_id.clone();
        let id = task_id.clone();
        let on_complete = Box::new(move |success: bool, error: Option<String>| {
            tracing::info!(task_id = %id, success, error = ?error, "queued execution finished");
            controller.inner.current.lock().remove(&ws);
            // Completion frees a WIP slot; look at the queue again.
            controller.inner.store.request_kick(&ws);
        });

        let started = self
            .inner
            .sessions
            .start_execution(workspace_id, &task_id, Actor::Automation, Some(on_complete))
            .await;

        if let Err(e) = started {
            self.inner.current.lock().remove(workspace_id);
            let _ = self.inner.activity.system_event(
                workspace_id,
                Some(task_id.clone()),
                "auto-start-failed",
                format!("queue could not start {}: {}", task_id, e),
                Some(serde_json::json!({ "error": e.to_string() })),
            );
            // Put the task back and retry after a backoff.
            let task = self.inner.store.require(workspace_id, &task_id)?;
            if task.phase == TaskPhase::Executing {
                let _ = self
                    .inner
                    .store
                    .move_task(
                        workspace_id,
                        &task_id,
                        TaskPhase::Ready,
                        Actor::Automation,
                        Some("auto-start failed".to_string()),
                    )
                    .await;
            }
            let store = self.inner.store.clone();
            let ws = workspace_id.clone();
            let backoff = self.inner.retry_backoff;
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                store.request_kick(&ws);
            });
        }
        Ok(())
    }

    /// Planning finished: promote `backlog → ready` when the policy
    /// allows and the ready column has room. Failures log, no retry.
    pub async fn promote_after_planning(&self, workspace_id: &WorkspaceId, task_id: &TaskId) {
        let result = self.try_promote(workspace_id, task_id).await;
        if let Err(e) = result {
            tracing::warn!(task_id = %task_id, error = %e, "auto-promote failed");
            let _ = self.inner.activity.system_event(
                workspace_id,
                Some(task_id.clone()),
                "auto-promote-failed",
                format!("could not promote {} to ready: {}", task_id, e),
                Some(serde_json::json!({ "error": e.to_string() })),
            );
        }
    }

    async fn try_promote(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
    ) -> Result<(), EngineError> {
        let task = self.inner.store.require(workspace_id, task_id)?;
        if task.phase != TaskPhase::Backlog {
            return Ok(());
        }
        let policy = self
            .inner
            .store
            .effective_policy(workspace_id, Some(task_id))?;
        if !policy.backlog_to_ready {
            return Ok(());
        }
        let ready = self.inner.store.in_phase(workspace_id, TaskPhase::Ready)?;
        if !policy.ready_has_room(ready.len()) {
            tracing::info!(task_id = %task_id, "ready column full, not auto-promoting");
            return Ok(());
        }
        self.inner
            .store
            .move_task(
                workspace_id,
                task_id,
                TaskPhase::Ready,
                Actor::Automation,
                Some("planning completed".to_string()),
            )
            .await?;
        Ok(())
    }

    /// Enable the queue, persist the toggle, and kick.
    pub async fn start_queue(&self, workspace_id: &WorkspaceId) -> Result<(), EngineError> {
        self.inner.store.set_queue_enabled(workspace_id, true)?;
        self.inner.store.request_kick(workspace_id);
        Ok(())
    }

    /// Disable the queue. Running executions are left alone.
    pub async fn stop_queue(&self, workspace_id: &WorkspaceId) -> Result<(), EngineError> {
        self.inner.store.set_queue_enabled(workspace_id, false)?;
        Ok(())
    }

    pub fn status(&self, workspace_id: &WorkspaceId) -> Result<QueueStatus, EngineError> {
        let workspace = self.inner.store.workspace(workspace_id)?;
        let policy = self.inner.store.effective_policy(workspace_id, None)?;
        Ok(QueueStatus {
            enabled: workspace.queue_enabled,
            current_task_id: self.inner.current.lock().get(workspace_id).cloned(),
            executing: self
                .inner
                .store
                .in_phase(workspace_id, TaskPhase::Executing)?
                .len(),
            ready: self.inner.store.in_phase(workspace_id, TaskPhase::Ready)?.len(),
            policy,
        })
    }
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
