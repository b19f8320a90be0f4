// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative view of tasks across workspaces.
//!
//! The in-memory cache is a projection over the on-disk records; every
//! mutation re-reads the record from disk under the task's mutex before
//! writing, so concurrent writers never clobber each other. Phase
//! transitions go through `Task::can_move_to` without exception.

use crate::bus::WorkspaceBus;
use crate::error::EngineError;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tf_core::policy::effective_policy;
use tf_core::{
    Actor, AttachmentMeta, LiveEvent, ModelConfig, PolicyOverride, Task, TaskId, TaskPhase,
    UsageDelta, Workspace, WorkspaceId, WorkflowPolicy,
};
use tf_storage::{AttachmentStore, TaskDir, WorkspaceConfig};

struct WorkspaceState {
    workspace: Mutex<Workspace>,
    config: WorkspaceConfig,
    records: TaskDir,
    attachments: AttachmentStore,
    cache: Mutex<HashMap<TaskId, Task>>,
    task_locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkspaceState {
    fn task_lock(&self, task_id: &TaskId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.task_locks
                .lock()
                .entry(task_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

/// Request to create a task.
#[derive(Debug, Clone, Default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub pre_planning_skills: Vec<String>,
    pub pre_execution_skills: Vec<String>,
    pub post_execution_skills: Vec<String>,
    pub planning_model: Option<ModelConfig>,
    pub execution_model: Option<ModelConfig>,
}

/// Partial update applied by `update`. Phase is never patched here.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub acceptance_criteria: Option<Vec<String>>,
    pub pre_planning_skills: Option<Vec<String>>,
    pub pre_execution_skills: Option<Vec<String>>,
    pub post_execution_skills: Option<Vec<String>>,
    pub planning_model: Option<ModelConfig>,
    pub execution_model: Option<ModelConfig>,
    pub automation: Option<PolicyOverride>,
}

/// Which tasks `list` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Active,
    Archived,
    All,
}

/// Task store over every open workspace.
#[derive(Clone)]
pub struct TaskStore {
    bus: WorkspaceBus,
    defaults: WorkflowPolicy,
    workspaces: Arc<Mutex<HashMap<WorkspaceId, Arc<WorkspaceState>>>>,
    kick_tx: Arc<Mutex<Option<tokio::sync::mpsc::UnboundedSender<WorkspaceId>>>>,
}

impl TaskStore {
    pub fn new(bus: WorkspaceBus, defaults: WorkflowPolicy) -> Self {
        Self {
            bus,
            defaults,
            workspaces: Arc::new(Mutex::new(HashMap::new())),
            kick_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Wire the automation kick channel. Set once at startup; every
    /// successful phase transition afterwards requests a queue kick.
    pub fn set_kick_channel(&self, tx: tokio::sync::mpsc::UnboundedSender<WorkspaceId>) {
        *self.kick_tx.lock() = Some(tx);
    }

    pub(crate) fn request_kick(&self, workspace_id: &WorkspaceId) {
        if let Some(tx) = self.kick_tx.lock().as_ref() {
            let _ = tx.send(workspace_id.clone());
        }
    }

    // -------------------------------------------------------------------
    // Workspaces
    // -------------------------------------------------------------------

    /// Create a workspace rooted at `root` and open it.
    pub fn create_workspace(
        &self,
        id: WorkspaceId,
        name: &str,
        root: &Path,
    ) -> Result<Workspace, EngineError> {
        std::fs::create_dir_all(root).map_err(tf_storage::StorageError::Io)?;
        let workspace = Workspace::new(id, name, root.to_path_buf(), Utc::now());
        WorkspaceConfig::new(root).save(&workspace)?;
        self.open_workspace(root)?;
        Ok(workspace)
    }

    /// Open an existing workspace directory, loading its tasks.
    pub fn open_workspace(&self, root: &Path) -> Result<Workspace, EngineError> {
        let config = WorkspaceConfig::new(root);
        let mut workspace = config.load()?;

        let records = TaskDir::new(root);
        // The high-water mark only moves up; a config that predates it
        // is floored by what's on disk.
        let disk_max = records.max_numeric_suffix()?;
        if disk_max > workspace.last_task_id {
            workspace.last_task_id = disk_max;
            config.save(&workspace)?;
        }

        let mut cache = HashMap::new();
        for task in records.load_all()? {
            cache.insert(task.id.clone(), task);
        }

        let state = Arc::new(WorkspaceState {
            workspace: Mutex::new(workspace.clone()),
            config,
            records,
            attachments: AttachmentStore::new(root),
            cache: Mutex::new(cache),
            task_locks: Mutex::new(HashMap::new()),
        });
        self.workspaces.lock().insert(workspace.id.clone(), state);
        Ok(workspace)
    }

    pub fn close_workspace(&self, workspace_id: &WorkspaceId) {
        self.workspaces.lock().remove(workspace_id);
    }

    pub fn workspace(&self, workspace_id: &WorkspaceId) -> Result<Workspace, EngineError> {
        Ok(self.state(workspace_id)?.workspace.lock().clone())
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.workspaces
            .lock()
            .values()
            .map(|s| s.workspace.lock().clone())
            .collect()
    }

    pub fn workspace_root(&self, workspace_id: &WorkspaceId) -> Result<PathBuf, EngineError> {
        Ok(self.state(workspace_id)?.workspace.lock().path.clone())
    }

    /// Patch the workspace automation override. `clear` names fields to
    /// reset to inherit before `patch` is merged.
    pub fn patch_workspace_policy(
        &self,
        workspace_id: &WorkspaceId,
        patch: PolicyOverride,
        clear: &[String],
    ) -> Result<Workspace, EngineError> {
        let state = self.state(workspace_id)?;
        let mut workspace = state.workspace.lock();
        for field in clear {
            match field.as_str() {
                "readyLimit" => workspace.automation.ready_limit = None,
                "executingLimit" => workspace.automation.executing_limit = None,
                "backlogToReady" => workspace.automation.backlog_to_ready = None,
                "readyToExecuting" => workspace.automation.ready_to_executing = None,
                _ => {}
            }
        }
        workspace.automation.merge(patch);
        state.config.save(&workspace)?;
        Ok(workspace.clone())
    }

    /// Persist the queue toggle.
    pub fn set_queue_enabled(
        &self,
        workspace_id: &WorkspaceId,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let state = self.state(workspace_id)?;
        let mut workspace = state.workspace.lock();
        workspace.queue_enabled = enabled;
        state.config.save(&workspace)?;
        Ok(())
    }

    /// Resolve the effective policy for a task (or the workspace alone).
    pub fn effective_policy(
        &self,
        workspace_id: &WorkspaceId,
        task_id: Option<&TaskId>,
    ) -> Result<WorkflowPolicy, EngineError> {
        let state = self.state(workspace_id)?;
        let workspace_override = state.workspace.lock().automation;
        let task_override = match task_id {
            Some(id) => self
                .get(workspace_id, id)?
                .map(|t| t.automation)
                .unwrap_or_default(),
            None => PolicyOverride::default(),
        };
        Ok(effective_policy(
            &task_override,
            &workspace_override,
            self.defaults,
        ))
    }

    fn state(&self, workspace_id: &WorkspaceId) -> Result<Arc<WorkspaceState>, EngineError> {
        self.workspaces
            .lock()
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkspaceNotFound(workspace_id.clone()))
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Tasks in a scope, sorted by phase then order.
    pub fn list(
        &self,
        workspace_id: &WorkspaceId,
        scope: ListScope,
    ) -> Result<Vec<Task>, EngineError> {
        let state = self.state(workspace_id)?;
        let mut tasks: Vec<Task> = state
            .cache
            .lock()
            .values()
            .filter(|t| match scope {
                ListScope::Active => !t.phase.is_archived(),
                ListScope::Archived => t.phase.is_archived(),
                ListScope::All => true,
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (phase_rank(t.phase), t.order));
        Ok(tasks)
    }

    /// One task, or `None` — deleted tasks never resurrect.
    pub fn get(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
    ) -> Result<Option<Task>, EngineError> {
        Ok(self.state(workspace_id)?.cache.lock().get(task_id).cloned())
    }

    pub fn require(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
    ) -> Result<Task, EngineError> {
        self.get(workspace_id, task_id)?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.clone()))
    }

    /// Tasks currently in a phase, in order.
    pub fn in_phase(
        &self,
        workspace_id: &WorkspaceId,
        phase: TaskPhase,
    ) -> Result<Vec<Task>, EngineError> {
        let state = self.state(workspace_id)?;
        let mut tasks: Vec<Task> = state
            .cache
            .lock()
            .values()
            .filter(|t| t.phase == phase)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.order);
        Ok(tasks)
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Create a task at the end of backlog. The id comes from the
    /// workspace high-water mark and is never reused.
    pub fn create(
        &self,
        workspace_id: &WorkspaceId,
        request: CreateTaskRequest,
    ) -> Result<Task, EngineError> {
        if request.title.trim().is_empty() {
            return Err(EngineError::Validation("task title is required".into()));
        }
        let state = self.state(workspace_id)?;

        let id = {
            let mut workspace = state.workspace.lock();
            let id = workspace.next_task_id();
            state.config.save(&workspace)?;
            id
        };

        let mut task = Task::new(id, request.title.trim(), Utc::now());
        task.description = request.description;
        task.set_acceptance_criteria(request.acceptance_criteria);
        task.pre_planning_skills = request.pre_planning_skills;
        task.pre_execution_skills = request.pre_execution_skills;
        task.post_execution_skills = request.post_execution_skills;
        task.planning_model = request.planning_model;
        task.execution_model = request.execution_model;
        // New ideas go right: append at the end of backlog.
        task.order = state
            .cache
            .lock()
            .values()
            .filter(|t| t.phase == TaskPhase::Backlog)
            .map(|t| t.order + 1)
            .max()
            .unwrap_or(0);

        state.records.save(&task)?;
        state.cache.lock().insert(task.id.clone(), task.clone());
        self.bus.live(
            workspace_id,
            LiveEvent::TaskUpdated {
                task: Box::new(task.clone()),
            },
        );
        Ok(task)
    }

    /// Merge a patch. Empty acceptance criteria are stripped; phase is
    /// untouched.
    pub async fn update(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Task, EngineError> {
        self.with_task_mut(workspace_id, task_id, move |task| {
            if let Some(title) = patch.title {
                if !title.trim().is_empty() {
                    task.title = title.trim().to_string();
                }
            }
            if let Some(description) = patch.description {
                task.description = description;
            }
            if let Some(criteria) = patch.acceptance_criteria {
                task.set_acceptance_criteria(criteria);
            }
            if let Some(skills) = patch.pre_planning_skills {
                task.pre_planning_skills = skills;
            }
            if let Some(skills) = patch.pre_execution_skills {
                task.pre_execution_skills = skills;
            }
            if let Some(skills) = patch.post_execution_skills {
                task.post_execution_skills = skills;
            }
            if let Some(model) = patch.planning_model {
                task.planning_model = Some(model);
            }
            if let Some(model) = patch.execution_model {
                task.execution_model = Some(model);
            }
            if let Some(automation) = patch.automation {
                task.automation.merge(automation);
            }
            Ok(())
        })
        .await
    }

    /// Validated phase transition. Moves into `ready`, `executing`,
    /// `complete` and `archived` prepend (active work flows left-first);
    /// a history record is written; a queue kick is requested.
    pub async fn move_task(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        to: TaskPhase,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<Task, EngineError> {
        let state = self.state(workspace_id)?;
        let lock = state.task_lock(task_id);
        let _held = lock.lock().await;

        let mut task = state.records.load(task_id).map_err(map_missing(task_id))?;
        let from = task.phase;
        task.can_move_to(to)?;
        task.record_transition(to, actor, reason, Utc::now());

        // Prepend into the target phase, then renumber both phases.
        task.order = 0;
        state.records.save(&task)?;
        state.cache.lock().insert(task.id.clone(), task.clone());
        self.renumber_phase(&state, to, Some(task_id))?;
        self.renumber_phase(&state, from, None)?;

        let task = state.records.load(task_id)?;
        state.cache.lock().insert(task.id.clone(), task.clone());

        self.bus
            .live(workspace_id, LiveEvent::TaskMoved {
                task_id: task_id.clone(),
                from,
                to,
            });
        self.bus.live(
            workspace_id,
            LiveEvent::TaskUpdated {
                task: Box::new(task.clone()),
            },
        );
        self.request_kick(workspace_id);
        Ok(task)
    }

    /// Replace the order of a phase. The id list must be exactly the
    /// phase's members.
    pub async fn reorder(
        &self,
        workspace_id: &WorkspaceId,
        phase: TaskPhase,
        ordered_ids: &[TaskId],
    ) -> Result<(), EngineError> {
        let state = self.state(workspace_id)?;

        let mut members: Vec<TaskId> = state
            .cache
            .lock()
            .values()
            .filter(|t| t.phase == phase)
            .map(|t| t.id.clone())
            .collect();
        members.sort();
        let mut requested = ordered_ids.to_vec();
        requested.sort();
        if members != requested {
            return Err(EngineError::Validation(format!(
                "reorder ids must be exactly the tasks in {}",
                phase
            )));
        }

        for (position, task_id) in ordered_ids.iter().enumerate() {
            let lock = state.task_lock(task_id);
            let _held = lock.lock().await;
            let mut task = state.records.load(task_id).map_err(map_missing(task_id))?;
            task.order = position as u32;
            task.updated = Utc::now();
            state.records.save(&task)?;
            state.cache.lock().insert(task.id.clone(), task);
        }
        Ok(())
    }

    /// Delete a task and its directory. The id is never reused.
    pub async fn delete(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
    ) -> Result<(), EngineError> {
        let state = self.state(workspace_id)?;
        let lock = state.task_lock(task_id);
        let _held = lock.lock().await;

        state.records.delete(task_id).map_err(map_missing(task_id))?;
        state.cache.lock().remove(task_id);
        self.bus.live(
            workspace_id,
            LiveEvent::TaskRemoved {
                task_id: task_id.clone(),
            },
        );
        Ok(())
    }

    /// Re-read, mutate, save, re-cache and broadcast, all under the
    /// task mutex. Every field-level mutation funnels through here.
    pub async fn with_task_mut<F>(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        mutate: F,
    ) -> Result<Task, EngineError>
    where
        F: FnOnce(&mut Task) -> Result<(), EngineError>,
    {
        let state = self.state(workspace_id)?;
        let lock = state.task_lock(task_id);
        let _held = lock.lock().await;

        let mut task = state.records.load(task_id).map_err(map_missing(task_id))?;
        mutate(&mut task)?;
        task.updated = Utc::now();
        state.records.save(&task)?;
        state.cache.lock().insert(task.id.clone(), task.clone());
        self.bus.live(
            workspace_id,
            LiveEvent::TaskUpdated {
                task: Box::new(task.clone()),
            },
        );
        Ok(task)
    }

    /// Fold a turn's usage into the task rollup.
    pub async fn record_usage(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        model: Option<String>,
        delta: UsageDelta,
    ) -> Result<(), EngineError> {
        self.with_task_mut(workspace_id, task_id, move |task| {
            task.usage.record(model.as_deref(), &delta);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Persist a freshly minted SDK session handle.
    pub async fn set_session_file(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        session_file: PathBuf,
    ) -> Result<(), EngineError> {
        self.with_task_mut(workspace_id, task_id, move |task| {
            task.session_file = Some(session_file);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Store attachment bytes and record the metadata on the task.
    pub async fn add_attachment(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentMeta, EngineError> {
        let state = self.state(workspace_id)?;
        let meta = state.attachments.store(task_id, filename, mime_type, bytes)?;
        let recorded = meta.clone();
        self.with_task_mut(workspace_id, task_id, move |task| {
            task.attachments.push(recorded);
            Ok(())
        })
        .await?;
        Ok(meta)
    }

    /// Resolve an attachment path for download.
    pub fn attachment_path(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        stored_name: &str,
    ) -> Result<PathBuf, EngineError> {
        Ok(self
            .state(workspace_id)?
            .attachments
            .path_of(task_id, stored_name)?)
    }

    /// Read/write the post-execution summary.
    pub fn save_summary(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        summary: &str,
    ) -> Result<(), EngineError> {
        Ok(self.state(workspace_id)?.records.save_summary(task_id, summary)?)
    }

    pub fn load_summary(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
    ) -> Result<Option<String>, EngineError> {
        Ok(self.state(workspace_id)?.records.load_summary(task_id)?)
    }

    /// Renumber a phase to a dense total order. When `first` is given,
    /// that task sorts to the front regardless of its current order.
    fn renumber_phase(
        &self,
        state: &WorkspaceState,
        phase: TaskPhase,
        first: Option<&TaskId>,
    ) -> Result<(), EngineError> {
        let mut members: Vec<Task> = state
            .cache
            .lock()
            .values()
            .filter(|t| t.phase == phase)
            .cloned()
            .collect();
        members.sort_by_key(|t| (Some(&t.id) != first, t.order));

        for (position, member) in members.iter().enumerate() {
            if member.order != position as u32 {
                let mut task = state.records.load(&member.id)?;
                task.order = position as u32;
                state.records.save(&task)?;
                state.cache.lock().insert(task.id.clone(), task);
            }
        }
        Ok(())
    }
}

fn phase_rank(phase: TaskPhase) -> u8 {
    match phase {
        TaskPhase::Backlog => 0,
        TaskPhase::Ready => 1,
        TaskPhase::Executing => 2,
        TaskPhase::Complete => 3,
        TaskPhase::Archived => 4,
    }
}

fn map_missing(task_id: &TaskId) -> impl FnOnce(tf_storage::StorageError) -> EngineError + '_ {
    move |e| match e {
        tf_storage::StorageError::NotFound(_) => EngineError::TaskNotFound(task_id.clone()),
        other => EngineError::Storage(other),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
