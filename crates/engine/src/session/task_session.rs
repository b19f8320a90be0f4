// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight agent session state.

use super::watchdog::{WatchdogConfig, Watchdogs};
use crate::summary::SessionDigest;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tf_adapters::{AgentSdk, CallbackGuard};
use tf_core::contract::{Mode, SessionPurpose};
use tf_core::{TaskId, WorkspaceId};
use tokio::time::Instant;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Paused | SessionStatus::Completed | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// One-shot completion hook.
pub type CompletionHook = Box<dyn FnOnce(bool, Option<String>) + Send>;

/// A tool call currently running inside the SDK.
#[derive(Debug, Clone)]
pub struct InflightTool {
    pub tool_name: String,
    pub args: serde_json::Value,
    /// Cumulative streamed output so updates can be diffed into deltas.
    pub streamed: String,
}

/// Planning guardrail accounting, installed only on planning sessions.
#[derive(Debug)]
pub struct Guardrails {
    pub max_tool_calls: u32,
    pub read_byte_budget: u64,
    pub tool_calls: AtomicU32,
    pub read_bytes: AtomicU64,
    tripped: Mutex<Option<String>>,
    turn_limit: AtomicBool,
    /// Grace turn: every tool except `save_plan` trips.
    grace_restricted: AtomicBool,
}

impl Guardrails {
    pub fn new(max_tool_calls: u32, read_byte_budget: u64) -> Self {
        Self {
            max_tool_calls,
            read_byte_budget,
            tool_calls: AtomicU32::new(0),
            read_bytes: AtomicU64::new(0),
            tripped: Mutex::new(None),
            turn_limit: AtomicBool::new(false),
            grace_restricted: AtomicBool::new(false),
        }
    }

    pub fn trip(&self, reason: impl Into<String>) {
        let mut tripped = self.tripped.lock();
        if tripped.is_none() {
            *tripped = Some(reason.into());
        }
    }

    pub fn tripped(&self) -> Option<String> {
        self.tripped.lock().clone()
    }

    pub fn mark_turn_limit(&self) {
        self.turn_limit.store(true, Ordering::SeqCst);
    }

    pub fn turn_limit_hit(&self) -> bool {
        self.turn_limit.load(Ordering::SeqCst)
    }

    pub fn restrict_to_save_plan(&self) {
        self.grace_restricted.store(true, Ordering::SeqCst);
    }

    pub fn is_grace_restricted(&self) -> bool {
        self.grace_restricted.load(Ordering::SeqCst)
    }
}

/// Pending plan captured by the `save_plan` callback, persisted by the
/// planning pipeline.
#[derive(Debug, Clone)]
pub struct PendingPlan {
    pub acceptance_criteria: Vec<String>,
    pub goal: String,
    pub steps: Vec<String>,
    pub validation: Vec<String>,
    pub cleanup: Vec<String>,
}

/// A live agent conversation for one task.
///
/// Registered exclusively under its task id; every event handler checks
/// it is still the active registration before mutating anything.
pub struct TaskSession<S: AgentSdk> {
    pub id: String,
    pub task_id: TaskId,
    pub workspace_id: WorkspaceId,
    pub purpose: SessionPurpose,
    pub mode: Mode,

    status: Mutex<SessionStatus>,
    awaiting_user_input: AtomicBool,

    // Completion protocol
    agent_signaled_complete: AtomicBool,
    completion_summary: Mutex<Option<String>>,
    completion_started: AtomicBool,
    on_complete: Mutex<Option<CompletionHook>>,

    // Stall recovery
    pub(crate) watchdogs: Mutex<Watchdogs>,
    watchdog_recovered: AtomicBool,

    // Stream assembly
    pub(crate) text_buffer: Mutex<String>,
    pub(crate) thinking_buffer: Mutex<String>,
    pub(crate) inflight_tools: Mutex<HashMap<String, InflightTool>>,
    pub(crate) last_tool_result: Mutex<Option<(String, Instant)>>,
    turn_error: Mutex<Option<String>>,

    // Telemetry
    pub(crate) turns: AtomicU64,
    pub(crate) tool_calls: AtomicU64,
    first_token_seen: AtomicBool,
    pub(crate) started_at: Instant,
    pub(crate) touched_files: Mutex<std::collections::BTreeSet<String>>,

    // Wiring
    conversation: OnceLock<Arc<S::Conversation>>,
    guards: Mutex<Vec<CallbackGuard>>,
    pub(crate) pending_follow_ups: Mutex<VecDeque<String>>,
    pub(crate) heartbeat: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pub(crate) guardrails: Mutex<Option<Arc<Guardrails>>>,
    pub(crate) pending_plan: Mutex<Option<PendingPlan>>,
    plan_saved: AtomicBool,
    closed: tokio::sync::Notify,
    closed_flag: AtomicBool,
}

impl<S: AgentSdk> TaskSession<S> {
    pub fn new(
        task_id: TaskId,
        workspace_id: WorkspaceId,
        purpose: SessionPurpose,
        mode: Mode,
        watchdog_config: WatchdogConfig,
    ) -> Self {
        // Watchdogs only arm for execution sessions.
        let enabled = purpose == SessionPurpose::Execution;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id,
            workspace_id,
            purpose,
            mode,
            status: Mutex::new(SessionStatus::Idle),
            awaiting_user_input: AtomicBool::new(false),
            agent_signaled_complete: AtomicBool::new(false),
            completion_summary: Mutex::new(None),
            completion_started: AtomicBool::new(false),
            on_complete: Mutex::new(None),
            watchdogs: Mutex::new(Watchdogs::new(watchdog_config, enabled)),
            watchdog_recovered: AtomicBool::new(false),
            text_buffer: Mutex::new(String::new()),
            thinking_buffer: Mutex::new(String::new()),
            inflight_tools: Mutex::new(HashMap::new()),
            last_tool_result: Mutex::new(None),
            turn_error: Mutex::new(None),
            turns: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            first_token_seen: AtomicBool::new(false),
            started_at: Instant::now(),
            touched_files: Mutex::new(std::collections::BTreeSet::new()),
            conversation: OnceLock::new(),
            guards: Mutex::new(Vec::new()),
            pending_follow_ups: Mutex::new(VecDeque::new()),
            heartbeat: Mutex::new(None),
            guardrails: Mutex::new(None),
            pending_plan: Mutex::new(None),
            plan_saved: AtomicBool::new(false),
            closed: tokio::sync::Notify::new(),
            closed_flag: AtomicBool::new(false),
        }
    }

    /// Signal the demultiplexer (and anyone else parked on this
    /// session) that the session is torn down.
    pub fn close(&self) {
        self.closed_flag.store(true, Ordering::SeqCst);
        self.closed.notify_waiters();
    }

    pub async fn wait_closed(&self) {
        let notified = self.closed.notified();
        if self.closed_flag.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    pub fn attach_conversation(&self, conversation: Arc<S::Conversation>) {
        let _ = self.conversation.set(conversation);
    }

    pub fn conversation(&self) -> Option<Arc<S::Conversation>> {
        self.conversation.get().cloned()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }

    pub fn is_running(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    pub fn set_awaiting_input(&self, awaiting: bool) {
        self.awaiting_user_input.store(awaiting, Ordering::SeqCst);
    }

    pub fn awaiting_input(&self) -> bool {
        self.awaiting_user_input.load(Ordering::SeqCst)
    }

    // -- completion protocol -------------------------------------------

    /// Record the `task_complete` signal. Set-once; repeated signals
    /// keep the first summary.
    pub fn signal_complete(&self, summary: &str) {
        if !self.agent_signaled_complete.swap(true, Ordering::SeqCst) {
            *self.completion_summary.lock() = Some(summary.to_string());
        }
    }

    pub fn completion_signaled(&self) -> bool {
        self.agent_signaled_complete.load(Ordering::SeqCst)
    }

    pub fn completion_summary(&self) -> Option<String> {
        self.completion_summary.lock().clone()
    }

    /// Reset the completion flags at the start of a new turn.
    pub fn reset_completion(&self) {
        self.agent_signaled_complete.store(false, Ordering::SeqCst);
        *self.completion_summary.lock() = None;
    }

    /// One-shot entry into the completion flow.
    pub fn begin_completion(&self) -> bool {
        !self.completion_started.swap(true, Ordering::SeqCst)
    }

    pub fn set_on_complete(&self, hook: CompletionHook) {
        *self.on_complete.lock() = Some(hook);
    }

    /// Take the hook; stop and watchdog recovery call this to suppress
    /// it without invoking.
    pub fn take_on_complete(&self) -> Option<CompletionHook> {
        self.on_complete.lock().take()
    }

    // -- stall recovery -------------------------------------------------

    /// One-shot claim on watchdog recovery.
    pub fn claim_watchdog_recovery(&self) -> bool {
        !self.watchdog_recovered.swap(true, Ordering::SeqCst)
    }

    pub fn watchdog_recovered(&self) -> bool {
        self.watchdog_recovered.load(Ordering::SeqCst)
    }

    // -- turn state -----------------------------------------------------

    pub fn set_turn_error(&self, message: impl Into<String>) {
        let mut error = self.turn_error.lock();
        if error.is_none() {
            *error = Some(message.into());
        }
    }

    pub fn take_turn_error(&self) -> Option<String> {
        self.turn_error.lock().take()
    }

    pub fn clear_stream_buffers(&self) {
        self.text_buffer.lock().clear();
        self.thinking_buffer.lock().clear();
    }

    /// First assistant token of the session; true exactly once.
    pub fn mark_first_token(&self) -> bool {
        !self.first_token_seen.swap(true, Ordering::SeqCst)
    }

    pub fn push_guard(&self, guard: CallbackGuard) {
        self.guards.lock().push(guard);
    }

    /// Drop every installed callback guard, restoring stashed slots.
    pub fn drop_guards(&self) {
        self.guards.lock().clear();
    }

    pub fn guardrails(&self) -> Option<Arc<Guardrails>> {
        self.guardrails.lock().clone()
    }

    pub fn set_guardrails(&self, guardrails: Arc<Guardrails>) {
        *self.guardrails.lock() = Some(guardrails);
    }

    // -- planning -------------------------------------------------------

    pub fn stash_plan(&self, plan: PendingPlan) {
        if !self.plan_saved.swap(true, Ordering::SeqCst) {
            *self.pending_plan.lock() = Some(plan);
        }
    }

    pub fn plan_saved(&self) -> bool {
        self.plan_saved.load(Ordering::SeqCst)
    }

    pub fn take_pending_plan(&self) -> Option<PendingPlan> {
        self.pending_plan.lock().take()
    }

    /// Snapshot for the post-execution summary.
    pub fn digest(&self) -> SessionDigest {
        SessionDigest {
            completion_summary: self.completion_summary(),
            touched_files: self.touched_files.lock().clone(),
            turns: self.turns.load(Ordering::SeqCst),
            tool_calls: self.tool_calls.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
#[path = "task_session_tests.rs"]
mod tests;
