// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session manager.
//!
//! Owns every in-flight agent conversation, keyed by task id. A session
//! is created for execution, planning or chat; its SDK events are
//! demultiplexed into activity and live events; execution turns are
//! covered by layered watchdogs; completion is signaled only through
//! the `task_complete` tool. Stop and watchdog recovery tear sessions
//! down cooperatively and never fire `on_complete`.

mod demux;
mod task_session;
mod watchdog;

pub use task_session::{
    CompletionHook, Guardrails, InflightTool, PendingPlan, SessionStatus, TaskSession,
};
pub use watchdog::{WatchdogConfig, WatchdogKind};

use crate::activity::ActivityService;
use crate::error::EngineError;
use crate::prompts;
use crate::store::TaskStore;
use crate::summary::render_summary;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tf_adapters::{
    AgentSdk, ConversationRequest, SdkConversation, SdkError, Toolbox,
};
use tf_core::contract::{mode_for, Mode, SessionPurpose};
use tf_core::{
    Actor, ChatRole, ExecutionStatus, LiveEvent, Task, TaskId, TaskPhase, ThinkingLevel,
    UsageDelta, WorkspaceId,
};
use tf_storage::{LeaseFile, UsageLog, UsageRecord};
use tokio::sync::mpsc;

/// Tunables for session behavior. Defaults match production; tests
/// inject shorter values.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub watchdogs: WatchdogConfig,
    /// Window within which an assistant message equal to the last tool
    /// result is treated as an echo and not persisted.
    pub dedup_window: Duration,
    /// Execution lease heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Outer timeout for each post-execution skill turn.
    pub post_skill_timeout: Duration,
    /// Thinking level used when the task config does not set one.
    pub default_thinking: ThinkingLevel,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watchdogs: WatchdogConfig::default(),
            dedup_window: Duration::from_millis(2_500),
            heartbeat_interval: Duration::from_secs(15),
            post_skill_timeout: Duration::from_secs(120),
            default_thinking: ThinkingLevel::Low,
        }
    }
}

/// How to open a conversation for a session.
pub(crate) struct OpenOptions {
    pub purpose: SessionPurpose,
    pub require_existing_session: bool,
    pub force_new_session: bool,
    pub retry_enabled: bool,
    pub compaction_enabled: bool,
    pub settings_overrides: serde_json::Value,
}

impl OpenOptions {
    fn for_purpose(purpose: SessionPurpose) -> Self {
        Self {
            purpose,
            require_existing_session: false,
            force_new_session: false,
            retry_enabled: true,
            compaction_enabled: true,
            settings_overrides: serde_json::Value::Null,
        }
    }
}

struct ManagerInner<S: AgentSdk> {
    sdk: S,
    toolbox: Toolbox,
    store: TaskStore,
    activity: ActivityService,
    config: SessionConfig,
    registry: Mutex<HashMap<TaskId, Arc<TaskSession<S>>>>,
}

/// Handle to the session registry and lifecycle flows.
pub struct SessionManager<S: AgentSdk> {
    inner: Arc<ManagerInner<S>>,
}

impl<S: AgentSdk> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AgentSdk> SessionManager<S> {
    pub fn new(
        sdk: S,
        toolbox: Toolbox,
        store: TaskStore,
        activity: ActivityService,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sdk,
                toolbox,
                store,
                activity,
                config,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn activity(&self) -> &ActivityService {
        &self.inner.activity
    }

    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.inner.toolbox
    }

    pub(crate) fn dedup_window(&self) -> Duration {
        self.inner.config.dedup_window
    }

    // -------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------

    pub fn get_active(&self, task_id: &TaskId) -> Option<Arc<TaskSession<S>>> {
        self.inner.registry.lock().get(task_id).cloned()
    }

    /// True while an execution/planning/chat session is mid-turn.
    pub fn has_running_session(&self, task_id: &TaskId) -> bool {
        self.get_active(task_id).map(|s| s.is_running()).unwrap_or(false)
    }

    /// The registry check every handler performs before mutating.
    pub(crate) fn is_active(&self, session: &Arc<TaskSession<S>>) -> bool {
        self.get_active(&session.task_id)
            .map(|active| Arc::ptr_eq(&active, session))
            .unwrap_or(false)
    }

    fn register(&self, session: Arc<TaskSession<S>>) {
        let previous = self
            .inner
            .registry
            .lock()
            .insert(session.task_id.clone(), Arc::clone(&session));
        if let Some(previous) = previous {
            // Registering over a live session tears the old one down.
            self.teardown(&previous, true, None);
        }
    }

    fn unregister(&self, session: &Arc<TaskSession<S>>) {
        let mut registry = self.inner.registry.lock();
        if let Some(active) = registry.get(&session.task_id) {
            if Arc::ptr_eq(active, session) {
                registry.remove(&session.task_id);
            }
        }
    }

    /// Tear a session down: timers, callbacks, lease, heartbeat,
    /// registry slot, and (optionally) the SDK conversation.
    fn teardown(&self, session: &Arc<TaskSession<S>>, abort_sdk: bool, status: Option<SessionStatus>) {
        if let Some(status) = status {
            session.set_status(status);
        }
        session.watchdogs.lock().disarm_all();
        session.drop_guards();
        self.inner.toolbox.clear_task(&session.task_id);
        if let Some(handle) = session.heartbeat.lock().take() {
            handle.abort();
        }
        if let Ok(root) = self.inner.store.workspace_root(&session.workspace_id) {
            let _ = LeaseFile::new(root, &session.task_id).clear();
        }
        if abort_sdk {
            if let Some(conversation) = session.conversation() {
                tokio::spawn(async move {
                    conversation.abort().await;
                });
            }
        }
        self.unregister(session);
        // Release the demux task; stale events have nowhere to go.
        session.close();
    }

    // -------------------------------------------------------------------
    // Conversation factory
    // -------------------------------------------------------------------

    /// Create, register and wire a session: toolbox mode, conversation,
    /// session-file persistence, demux task, and (for execution) the
    /// lease heartbeat.
    pub(crate) async fn open_session(
        &self,
        workspace_id: &WorkspaceId,
        task: &Task,
        options: OpenOptions,
    ) -> Result<Arc<TaskSession<S>>, EngineError> {
        let workspace_id = workspace_id.clone();
        let mode = mode_for(options.purpose, task.phase);
        let session = Arc::new(TaskSession::<S>::new(
            task.id.clone(),
            workspace_id.clone(),
            options.purpose,
            mode,
            self.inner.config.watchdogs,
        ));
        self.register(Arc::clone(&session));
        self.inner.toolbox.set_mode(&task.id, mode);

        if options.require_existing_session && task.session_file.is_none() {
            self.teardown(&session, false, Some(SessionStatus::Error));
            return Err(EngineError::NoSessionFile(task.id.clone()));
        }

        let model_config = match options.purpose {
            SessionPurpose::Planning => task.planning_model.clone(),
            _ => task.execution_model.clone(),
        }
        .unwrap_or_default();

        let workspace_root = self.inner.store.workspace_root(&workspace_id)?;
        let mut request = ConversationRequest::new(workspace_root.clone(), task.id.clone());
        request.session_file = task.session_file.clone();
        request.force_new = options.force_new_session;
        request.model = model_config.model;
        request.thinking_level = model_config
            .thinking_level
            .unwrap_or(self.inner.config.default_thinking);
        request.retry_enabled = options.retry_enabled;
        request.compaction_enabled = options.compaction_enabled;
        request.settings_overrides = options.settings_overrides;

        let (event_tx, event_rx) = mpsc::channel(256);
        let conversation = match self.inner.sdk.open(request, event_tx).await {
            Ok(conversation) => Arc::new(conversation),
            Err(e) => {
                self.teardown(&session, false, Some(SessionStatus::Error));
                return Err(EngineError::Sdk(e));
            }
        };
        session.attach_conversation(Arc::clone(&conversation));

        // Persist a newly minted handle back to the task.
        let minted = conversation.session_file();
        if task.session_file.as_deref() != Some(minted.as_path()) {
            self.inner
                .store
                .set_session_file(&workspace_id, &task.id, minted)
                .await?;
        }

        // One demux task per session.
        let ctx = demux::DemuxCtx {
            manager: self.clone(),
            session: Arc::clone(&session),
        };
        tokio::spawn(demux::run(ctx, event_rx));

        if options.purpose == SessionPurpose::Execution {
            self.start_heartbeat(&session, &workspace_root);
        }

        Ok(session)
    }

    fn start_heartbeat(&self, session: &Arc<TaskSession<S>>, workspace_root: &std::path::Path) {
        let lease = LeaseFile::new(workspace_root.to_path_buf(), &session.task_id);
        let interval = self.inner.config.heartbeat_interval;
        let task_id = session.task_id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = lease.touch() {
                    tracing::warn!(task_id = %task_id, error = %e, "lease heartbeat failed");
                }
            }
        });
        *session.heartbeat.lock() = Some(handle);
    }

    /// Detect and clear leases left behind by crashed sessions. Called
    /// once per workspace at startup. A task whose execution died is
    /// moved back to `ready` so its WIP slot frees and the queue can
    /// restart it.
    pub async fn recover_stale_leases(&self, workspace_id: &WorkspaceId) -> Result<(), EngineError> {
        let root = self.inner.store.workspace_root(workspace_id)?;
        let stale_after = self.inner.config.heartbeat_interval * 3;
        for task_id in tf_storage::lease::list_leases(&root)? {
            let lease = LeaseFile::new(root.clone(), &task_id);
            let stale = lease.age()?.map(|age| age > stale_after).unwrap_or(false);
            if stale {
                let _ = self.inner.activity.system_event(
                    workspace_id,
                    Some(task_id.clone()),
                    "stale-lease",
                    format!(
                        "task {} had a session running when the server stopped; re-queued",
                        task_id
                    ),
                    Some(serde_json::json!({ "taskId": task_id.as_str() })),
                );
                self.recover_crashed_task(workspace_id, &task_id).await;
            }
            lease.clear()?;
        }
        Ok(())
    }

    /// Put a crashed task back where the queue can pick it up again.
    async fn recover_crashed_task(&self, workspace_id: &WorkspaceId, task_id: &TaskId) {
        if self.has_running_session(task_id) {
            return;
        }
        let Ok(task) = self.inner.store.require(workspace_id, task_id) else {
            return;
        };

        // A planning run that died mid-flight would otherwise block
        // every move on this task forever.
        if task.planning_status == tf_core::PlanningStatus::Running {
            let _ = self
                .inner
                .store
                .with_task_mut(workspace_id, task_id, |task| {
                    task.planning_status = tf_core::PlanningStatus::Error;
                    Ok(())
                })
                .await;
        }

        if task.phase == TaskPhase::Executing {
            if let Err(e) = self
                .inner
                .store
                .move_task(
                    workspace_id,
                    task_id,
                    TaskPhase::Ready,
                    Actor::System,
                    Some("session lost on restart".to_string()),
                )
                .await
            {
                tracing::warn!(task_id = %task_id, error = %e, "crashed task re-queue failed");
            }
        }
    }

    // -------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------

    /// Start an execution session. The task must be in `ready` (it is
    /// moved to `executing`) or already `executing`.
    pub async fn start_execution(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        actor: Actor,
        on_complete: Option<CompletionHook>,
    ) -> Result<(), EngineError> {
        if self.has_running_session(task_id) {
            return Err(EngineError::SessionActive(task_id.clone()));
        }
        let task = self.inner.store.require(workspace_id, task_id)?;
        let task = match task.phase {
            TaskPhase::Ready => {
                self.inner
                    .store
                    .move_task(workspace_id, task_id, TaskPhase::Executing, actor, None)
                    .await?
            }
            TaskPhase::Executing => task,
            other => {
                return Err(EngineError::Validation(format!(
                    "task {} cannot execute from {}",
                    task_id, other
                )))
            }
        };

        self.inner
            .activity
            .task_separator(workspace_id, task_id, task.title.clone(), task.phase)?;

        let session = self
            .open_session(
                workspace_id,
                &task,
                OpenOptions::for_purpose(SessionPurpose::Execution),
            )
            .await?;
        if let Some(hook) = on_complete {
            session.set_on_complete(hook);
        }
        self.install_execution_callbacks(&session);

        let workspace_root = self.inner.store.workspace_root(workspace_id)?;
        let prompt = prompts::execution_prompt(&workspace_root, &task);

        let manager = self.clone();
        tokio::spawn(async move {
            manager.drive_turn(session, prompt.text).await;
        });
        Ok(())
    }

    fn install_execution_callbacks(&self, session: &Arc<TaskSession<S>>) {
        let task_id = session.task_id.clone();

        // Completion: set-once flag; a signal landing after the turn
        // went idle re-enters the completion flow.
        let manager = self.clone();
        let weak = Arc::downgrade(session);
        let guard = self.inner.toolbox.install_complete(
            &task_id,
            Arc::new(move |_task, summary| {
                let Some(session) = weak.upgrade() else {
                    return Err("session has ended".to_string());
                };
                if session.watchdog_recovered() || session.status().is_terminal() {
                    return Err("session has ended".to_string());
                }
                session.signal_complete(summary);
                if session.status() == SessionStatus::Idle {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        manager.completion_flow(session).await;
                    });
                }
                Ok("completion signal recorded".to_string())
            }),
        );
        session.push_guard(guard);

        // Attachments: bytes land synchronously, the task record update
        // follows asynchronously under the task mutex.
        let manager = self.clone();
        let workspace_id = session.workspace_id.clone();
        let guard = self.inner.toolbox.install_attach(
            &task_id,
            Arc::new(move |args| {
                let manager = manager.clone();
                let workspace_id = workspace_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = manager
                        .inner
                        .store
                        .add_attachment(
                            &workspace_id,
                            &args.task_id,
                            &args.filename,
                            &args.mime_type,
                            &args.bytes,
                        )
                        .await
                    {
                        tracing::warn!(task_id = %args.task_id, error = %e, "agent attachment failed");
                    }
                });
                Ok("attachment stored".to_string())
            }),
        );
        session.push_guard(guard);
    }

    /// Run one turn and route the outcome.
    pub(crate) fn drive_turn<'a>(
        &'a self,
        session: Arc<TaskSession<S>>,
        text: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(conversation) = session.conversation() else {
                return;
            };
            session.set_status(SessionStatus::Running);
            session.set_awaiting_input(false);
            session.reset_completion();
            session.watchdogs.lock().arm_turn_start();

            // Chat turns in planning mode get a scoped save_plan install,
            // restored when this turn's guard goes out of scope.
            let _scoped_plan = if session.purpose != SessionPurpose::Planning
                && session.mode == Mode::TaskPlanning
            {
                Some(self.install_scoped_save_plan(&session))
            } else {
                None
            };

            let result = conversation.prompt(&text).await;
            self.after_turn(session, result).await;
        })
    }

    fn after_turn<'a>(
        &'a self,
        session: Arc<TaskSession<S>>,
        result: Result<(), SdkError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(self.after_turn_impl(session, result))
    }

    async fn after_turn_impl(&self, session: Arc<TaskSession<S>>, result: Result<(), SdkError>) {
        session.watchdogs.lock().disarm_all();

        if session.watchdog_recovered() || !self.is_active(&session) {
            return;
        }
        if session.completion_signaled() {
            self.completion_flow(session).await;
            return;
        }
        if let Some(message) = session.take_turn_error() {
            self.error_flow(&session, message).await;
            return;
        }

        match result {
            Ok(()) => {
                // Finished without task_complete: awaiting input for
                // executing tasks, plain idle otherwise.
                session.set_status(SessionStatus::Idle);
                let status = if session.purpose == SessionPurpose::Execution {
                    session.set_awaiting_input(true);
                    ExecutionStatus::AwaitingInput
                } else {
                    ExecutionStatus::Idle
                };
                self.inner.activity.emit_live(
                    &session.workspace_id,
                    LiveEvent::Status {
                        task_id: session.task_id.clone(),
                        status,
                        message: None,
                    },
                );

                // Late completion race: the signal may have landed
                // between the checks above and going idle.
                if session.completion_signaled() {
                    self.completion_flow(session).await;
                    return;
                }

                let next = session.pending_follow_ups.lock().pop_front();
                if let Some(next) = next {
                    let manager = self.clone();
                    tokio::spawn(async move {
                        manager.drive_turn(session, next).await;
                    });
                }
            }
            Err(SdkError::Aborted) => {
                // Deliberate abort (stop, guardrail, save_plan). The
                // initiator owns the state transition.
                session.set_status(SessionStatus::Idle);
            }
            Err(e) => {
                self.error_flow(&session, e.to_string()).await;
            }
        }
    }

    /// The completion protocol: post-execution skills, summary, phase
    /// move, exactly one completion event, `on_complete(true)`.
    pub(crate) async fn completion_flow(&self, session: Arc<TaskSession<S>>) {
        if !session.begin_completion() {
            return;
        }
        if !self.is_active(&session) {
            // Completion after teardown is dropped.
            return;
        }
        let workspace_id = session.workspace_id.clone();
        let task_id = session.task_id.clone();

        self.run_post_execution_skills(&session).await;

        // Summary, then phase move, then the single completion event.
        if let Ok(task) = self.inner.store.require(&workspace_id, &task_id) {
            let summary = render_summary(&task, &session.digest());
            if let Err(e) = self.inner.store.save_summary(&workspace_id, &task_id, &summary) {
                tracing::warn!(task_id = %task_id, error = %e, "failed to persist execution summary");
            }
        }

        if let Ok(task) = self.inner.store.require(&workspace_id, &task_id) {
            if task.phase == TaskPhase::Executing {
                if let Err(e) = self
                    .inner
                    .store
                    .move_task(
                        &workspace_id,
                        &task_id,
                        TaskPhase::Complete,
                        Actor::Agent,
                        Some("task_complete".to_string()),
                    )
                    .await
                {
                    tracing::warn!(task_id = %task_id, error = %e, "completion move failed");
                }
            }
        }

        let summary_text = session.completion_summary().unwrap_or_default();
        let _ = self.inner.activity.system_event(
            &workspace_id,
            Some(task_id.clone()),
            "execution-completed",
            format!("task {} completed: {}", task_id, summary_text),
            Some(serde_json::json!({
                "taskId": task_id.as_str(),
                "summary": summary_text,
                "turns": session.turns.load(std::sync::atomic::Ordering::SeqCst),
                "toolCalls": session.tool_calls.load(std::sync::atomic::Ordering::SeqCst),
            })),
        );
        self.inner.activity.emit_live(
            &workspace_id,
            LiveEvent::Status {
                task_id: task_id.clone(),
                status: ExecutionStatus::Completed,
                message: None,
            },
        );
        tracing::info!(
            task_id = %task_id,
            session_id = %session.id,
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            "execution session completed"
        );

        if let Some(hook) = session.take_on_complete() {
            hook(true, None);
        }
        self.teardown(&session, false, Some(SessionStatus::Completed));
    }

    async fn run_post_execution_skills(&self, session: &Arc<TaskSession<S>>) {
        let Ok(task) = self
            .inner
            .store
            .require(&session.workspace_id, &session.task_id)
        else {
            return;
        };
        if task.post_execution_skills.is_empty() {
            return;
        }
        let Ok(root) = self.inner.store.workspace_root(&session.workspace_id) else {
            return;
        };
        let Some(conversation) = session.conversation() else {
            return;
        };

        self.inner.activity.emit_live(
            &session.workspace_id,
            LiveEvent::Status {
                task_id: session.task_id.clone(),
                status: ExecutionStatus::PostHooks,
                message: None,
            },
        );

        for skill in tf_storage::skills::load_skills(&root, &task.post_execution_skills) {
            let turn = tokio::time::timeout(
                self.inner.config.post_skill_timeout,
                conversation.follow_up(&skill.content),
            )
            .await;
            // Skill errors surface as events, never fail the turn.
            let error = match turn {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("post-execution skill timed out".to_string()),
            };
            if let Some(error) = error {
                let _ = self.inner.activity.system_event(
                    &session.workspace_id,
                    Some(session.task_id.clone()),
                    "post-skill-failed",
                    format!("post-execution skill {} failed", skill.id),
                    Some(serde_json::json!({ "skill": skill.id, "error": error })),
                );
            }
        }
    }

    async fn error_flow(&self, session: &Arc<TaskSession<S>>, message: String) {
        let _ = self.inner.activity.system_event(
            &session.workspace_id,
            Some(session.task_id.clone()),
            "execution-error",
            message.clone(),
            Some(serde_json::json!({
                "kind": "sdk-error",
                "error": message,
            })),
        );
        self.inner.activity.emit_live(
            &session.workspace_id,
            LiveEvent::Status {
                task_id: session.task_id.clone(),
                status: ExecutionStatus::Error,
                message: Some(message.clone()),
            },
        );
        if let Some(hook) = session.take_on_complete() {
            hook(false, Some(message));
        }
        self.teardown(session, true, Some(SessionStatus::Error));
    }

    /// Watchdog recovery: one stall event, session to idle (not error),
    /// callbacks cancelled, SDK aborted in the background, registry slot
    /// freed. `on_complete` is suppressed.
    pub(crate) async fn watchdog_recover(
        &self,
        session: &Arc<TaskSession<S>>,
        kind: WatchdogKind,
    ) {
        if !session.claim_watchdog_recovery() {
            return;
        }
        tracing::warn!(
            task_id = %session.task_id,
            session_id = %session.id,
            stall_phase = %kind,
            "watchdog expired, recovering session"
        );
        let _ = self.inner.activity.system_event(
            &session.workspace_id,
            Some(session.task_id.clone()),
            "stall",
            format!("agent stalled ({}), session recovered to idle", kind),
            Some(serde_json::json!({
                "stallPhase": kind.to_string(),
                "taskId": session.task_id.as_str(),
                "sessionId": session.id,
            })),
        );
        session.take_on_complete();
        self.inner.activity.emit_live(
            &session.workspace_id,
            LiveEvent::Status {
                task_id: session.task_id.clone(),
                status: ExecutionStatus::Idle,
                message: None,
            },
        );
        self.inner.activity.emit_live(
            &session.workspace_id,
            LiveEvent::TurnEnd {
                task_id: session.task_id.clone(),
            },
        );
        self.teardown(session, true, Some(SessionStatus::Idle));
    }

    pub(crate) async fn record_usage(
        &self,
        session: &Arc<TaskSession<S>>,
        model: Option<String>,
        delta: UsageDelta,
    ) {
        if let Err(e) = self
            .inner
            .store
            .record_usage(&session.workspace_id, &session.task_id, model.clone(), delta)
            .await
        {
            tracing::warn!(task_id = %session.task_id, error = %e, "usage rollup failed");
        }
        if let Ok(root) = self.inner.store.workspace_root(&session.workspace_id) {
            let record = UsageRecord {
                timestamp: chrono::Utc::now().to_rfc3339(),
                task_id: session.task_id.to_string(),
                session_id: session.id.clone(),
                model,
                input_tokens: delta.input_tokens,
                output_tokens: delta.output_tokens,
                cache_read_tokens: delta.cache_read_tokens,
                cache_creation_tokens: delta.cache_creation_tokens,
                cost_usd: delta.cost_usd,
            };
            if let Err(e) = UsageLog::new(root).append(&record) {
                tracing::warn!(task_id = %session.task_id, error = %e, "usage ledger append failed");
            }
        }
    }

    // -------------------------------------------------------------------
    // Planning support (driven by the planning pipeline)
    // -------------------------------------------------------------------

    /// Open a planning session: retry and compaction disabled, guardrail
    /// accounting installed, `save_plan` stashing into the session.
    pub(crate) async fn open_planning_session(
        &self,
        workspace_id: &WorkspaceId,
        task: &Task,
        resume: bool,
        guardrails: Arc<Guardrails>,
    ) -> Result<Arc<TaskSession<S>>, EngineError> {
        let mut options = OpenOptions::for_purpose(SessionPurpose::Planning);
        options.retry_enabled = false;
        options.compaction_enabled = false;
        options.require_existing_session = resume;
        options.force_new_session = !resume;
        let session = self.open_session(workspace_id, task, options).await?;
        session.set_guardrails(guardrails);

        let weak = Arc::downgrade(&session);
        let guard = self.inner.toolbox.install_plan(
            &task.id,
            Arc::new(move |args| {
                let Some(session) = weak.upgrade() else {
                    return Err("planning session has ended".to_string());
                };
                if session.plan_saved() {
                    return Err("a plan was already saved".to_string());
                }
                session.stash_plan(PendingPlan {
                    acceptance_criteria: args.acceptance_criteria,
                    goal: args.goal,
                    steps: args.steps,
                    validation: args.validation,
                    cleanup: args.cleanup,
                });
                // Abort the turn so the agent cannot continue into
                // implementation while the task is still in backlog.
                if let Some(conversation) = session.conversation() {
                    tokio::spawn(async move {
                        conversation.abort().await;
                    });
                }
                Ok("plan saved".to_string())
            }),
        );
        session.push_guard(guard);
        Ok(session)
    }

    /// Close out a planning session once the pipeline has consumed it.
    /// The conversation already ended (naturally or via the deliberate
    /// save_plan abort), so no SDK abort is issued.
    pub(crate) fn finish_planning_session(&self, session: &Arc<TaskSession<S>>) {
        let status = if session.plan_saved() {
            SessionStatus::Completed
        } else {
            SessionStatus::Error
        };
        self.teardown(session, false, Some(status));
    }

    /// Scoped `save_plan` for chat turns in planning mode: persists
    /// directly, no abort. The caller holds the guard for the turn.
    fn install_scoped_save_plan(&self, session: &Arc<TaskSession<S>>) -> tf_adapters::CallbackGuard {
        let store = self.inner.store.clone();
        let activity = self.inner.activity.clone();
        let workspace_id = session.workspace_id.clone();
        self.inner.toolbox.install_plan(
            &session.task_id,
            Arc::new(move |args| {
                let store = store.clone();
                let activity = activity.clone();
                let workspace_id = workspace_id.clone();
                let plan = PendingPlan {
                    acceptance_criteria: args.acceptance_criteria,
                    goal: args.goal,
                    steps: args.steps,
                    validation: args.validation,
                    cleanup: args.cleanup,
                };
                let task_id = args.task_id;
                tokio::spawn(async move {
                    let result = store
                        .with_task_mut(&workspace_id, &task_id.clone(), move |task| {
                            apply_plan(task, plan);
                            Ok(())
                        })
                        .await;
                    match result {
                        Ok(_) => activity.emit_live(
                            &workspace_id,
                            LiveEvent::PlanGenerated { task_id },
                        ),
                        Err(e) => {
                            tracing::warn!(task_id = %task_id, error = %e, "chat save_plan failed");
                        }
                    }
                });
                Ok("plan saved".to_string())
            }),
        )
    }

    // -------------------------------------------------------------------
    // Chat, follow-up, steer, stop
    // -------------------------------------------------------------------

    /// Route a user message: steer when streaming, follow up when a
    /// session is idle, resume when only a session file exists, start a
    /// fresh chat otherwise.
    pub async fn post_user_message(
        &self,
        workspace_id: &WorkspaceId,
        task_id: &TaskId,
        content: &str,
        attachment_ids: Vec<String>,
    ) -> Result<(), EngineError> {
        let task = self.inner.store.require(workspace_id, task_id)?;
        self.inner.activity.chat_message(
            workspace_id,
            Some(task_id.clone()),
            ChatRole::User,
            content,
            attachment_ids,
            None,
        )?;

        if let Some(session) = self.get_active(task_id) {
            if session.is_running() {
                return self.steer_session(&session, &task, content).await;
            }
            return self.follow_up_session(&session, &task, content).await;
        }
        if task.session_file.is_some() {
            return self.resume_chat(workspace_id, &task, content).await;
        }
        self.start_chat(workspace_id, &task, content).await
    }

    /// Inject a user message into the currently streaming turn.
    async fn steer_session(
        &self,
        session: &Arc<TaskSession<S>>,
        task: &Task,
        content: &str,
    ) -> Result<(), EngineError> {
        let Some(conversation) = session.conversation() else {
            return Err(EngineError::NoSession(task.id.clone()));
        };
        let prompt = prompts::contract_prefixed(task, session.purpose, content);
        conversation.steer(&prompt.text).await?;
        Ok(())
    }

    /// Queue behind a streaming turn or start a new one when idle.
    async fn follow_up_session(
        &self,
        session: &Arc<TaskSession<S>>,
        task: &Task,
        content: &str,
    ) -> Result<(), EngineError> {
        let prompt = prompts::contract_prefixed(task, session.purpose, content);
        if session.is_running() {
            session.pending_follow_ups.lock().push_back(prompt.text);
            return Ok(());
        }
        let manager = self.clone();
        let session = Arc::clone(session);
        tokio::spawn(async move {
            manager.drive_turn(session, prompt.text).await;
        });
        Ok(())
    }

    /// Resume an existing conversation for a chat turn; ends idle.
    async fn resume_chat(
        &self,
        workspace_id: &WorkspaceId,
        task: &Task,
        content: &str,
    ) -> Result<(), EngineError> {
        let mut options = OpenOptions::for_purpose(SessionPurpose::Chat);
        options.require_existing_session = true;
        let session = self.open_session(workspace_id, task, options).await?;
        let prompt = prompts::contract_prefixed(task, SessionPurpose::Chat, content);
        let manager = self.clone();
        tokio::spawn(async move {
            manager.drive_turn(session, prompt.text).await;
        });
        Ok(())
    }

    /// Fresh chat session: contextualizing intro turn, then the user's
    /// message as a follow-up.
    async fn start_chat(
        &self,
        workspace_id: &WorkspaceId,
        task: &Task,
        content: &str,
    ) -> Result<(), EngineError> {
        let mut options = OpenOptions::for_purpose(SessionPurpose::Chat);
        options.force_new_session = true;
        let session = self.open_session(workspace_id, task, options).await?;

        let workspace_root = self.inner.store.workspace_root(&session.workspace_id)?;
        let intro = prompts::chat_intro_prompt(&workspace_root, task);
        let message = prompts::contract_prefixed(task, SessionPurpose::Chat, content);
        session.pending_follow_ups.lock().push_back(message.text);

        let manager = self.clone();
        tokio::spawn(async move {
            manager.drive_turn(session, intro.text).await;
        });
        Ok(())
    }

    /// Cooperative stop. Never fires `on_complete`; the task keeps its
    /// phase. Returns whether a session existed.
    pub async fn stop(&self, task_id: &TaskId) -> Result<bool, EngineError> {
        let Some(session) = self.get_active(task_id) else {
            return Ok(false);
        };
        // Suppress completion before anything else so a racing
        // task_complete cannot fire it.
        session.take_on_complete();
        self.inner.activity.emit_live(
            &session.workspace_id,
            LiveEvent::Status {
                task_id: task_id.clone(),
                status: ExecutionStatus::Idle,
                message: None,
            },
        );
        self.teardown(&session, true, Some(SessionStatus::Paused));
        tracing::info!(task_id = %task_id, session_id = %session.id, "session stopped");
        Ok(true)
    }
}

/// Apply a saved plan onto a task record: normalized criteria (at most
/// seven), the plan body, and completed planning status.
pub(crate) fn apply_plan(task: &mut Task, plan: PendingPlan) {
    let mut criteria = tf_core::normalize_criteria(plan.acceptance_criteria);
    criteria.truncate(7);
    if !criteria.is_empty() {
        task.acceptance_criteria = criteria;
    }
    task.plan = Some(tf_core::Plan {
        goal: plan.goal,
        steps: plan.steps,
        validation: plan.validation,
        cleanup: plan.cleanup,
        generated_at: chrono::Utc::now(),
    });
    task.planning_status = tf_core::PlanningStatus::Completed;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
