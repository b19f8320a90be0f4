// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake SDK for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    AgentSdk, ContextUsage, ConversationRequest, MessageRole, SdkConversation, SdkError, SdkEvent,
    StopReason,
};
use crate::toolbox::Toolbox;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tf_core::TaskId;
use tokio::sync::{mpsc, Notify};

/// Recorded call to the fake SDK.
#[derive(Debug, Clone)]
pub enum SdkCall {
    Open {
        task_id: TaskId,
        resumed: bool,
        retry_enabled: bool,
        compaction_enabled: bool,
    },
    Prompt(String),
    FollowUp(String),
    Steer(String),
    Abort,
    Compact(String),
}

/// One scripted item within a turn.
#[derive(Debug, Clone)]
pub enum TurnItem {
    /// Emit this event verbatim.
    Event(SdkEvent),
    /// Run an orchestrator tool through the toolbox, emitting
    /// `ToolStart`/`ToolEnd` around it exactly like the real SDK.
    CallTool {
        tool_name: String,
        args: serde_json::Value,
    },
}

/// A scripted turn: items to play, then an outcome for the turn future.
#[derive(Debug, Clone)]
pub struct FakeTurn {
    pub items: Vec<TurnItem>,
    pub outcome: Result<(), SdkError>,
    /// Park after the items until `abort()`; the turn then resolves
    /// `Err(Aborted)`. Used to exercise watchdogs.
    pub hold: bool,
}

impl Default for FakeTurn {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTurn {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            outcome: Ok(()),
            hold: false,
        }
    }

    /// A complete assistant message followed by turn end.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new()
            .event(SdkEvent::AgentStart)
            .event(SdkEvent::MessageStart {
                role: MessageRole::Assistant,
            })
            .event(SdkEvent::TextDelta {
                text: content.clone(),
            })
            .event(SdkEvent::MessageEnd {
                role: MessageRole::Assistant,
                content,
                model: Some("fake-model".to_string()),
                usage: None,
                stop_reason: StopReason::EndTurn,
            })
            .event(SdkEvent::TurnEnd)
    }

    /// A turn that emits nothing at all and parks until aborted.
    pub fn silent_hold() -> Self {
        let mut turn = Self::new();
        turn.hold = true;
        turn.outcome = Err(SdkError::Aborted);
        turn
    }

    pub fn event(mut self, event: SdkEvent) -> Self {
        self.items.push(TurnItem::Event(event));
        self
    }

    pub fn tool(mut self, tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        self.items.push(TurnItem::CallTool {
            tool_name: tool_name.into(),
            args,
        });
        self
    }

    pub fn ending_with(mut self, outcome: Result<(), SdkError>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn held(mut self) -> Self {
        self.hold = true;
        self.outcome = Err(SdkError::Aborted);
        self
    }
}

struct FakeState {
    turns: VecDeque<FakeTurn>,
    calls: Vec<SdkCall>,
    open_error: Option<SdkError>,
    context_usage: ContextUsage,
    tool_call_counter: u64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            turns: VecDeque::new(),
            calls: Vec::new(),
            open_error: None,
            context_usage: ContextUsage {
                tokens: 1_000,
                context_window: 200_000,
            },
            tool_call_counter: 0,
        }
    }
}

/// Fake SDK with scripted turns and recorded calls.
#[derive(Clone)]
pub struct FakeSdk {
    state: Arc<Mutex<FakeState>>,
    toolbox: Toolbox,
}

impl FakeSdk {
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            toolbox,
        }
    }

    /// Queue the next scripted turn. Turns are consumed in order by
    /// `prompt`/`follow_up` across all conversations.
    pub fn push_turn(&self, turn: FakeTurn) {
        self.state.lock().turns.push_back(turn);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<SdkCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Error to return from the next `open`.
    pub fn set_open_error(&self, error: SdkError) {
        self.state.lock().open_error = Some(error);
    }

    pub fn set_context_usage(&self, usage: ContextUsage) {
        self.state.lock().context_usage = usage;
    }

    /// Count of recorded prompt/follow-up calls.
    pub fn turn_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SdkCall::Prompt(_) | SdkCall::FollowUp(_)))
            .count()
    }

    fn record(&self, call: SdkCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl AgentSdk for FakeSdk {
    type Conversation = FakeConversation;

    async fn open(
        &self,
        request: ConversationRequest,
        event_tx: mpsc::Sender<SdkEvent>,
    ) -> Result<Self::Conversation, SdkError> {
        self.record(SdkCall::Open {
            task_id: request.task_id.clone(),
            resumed: request.resumes(),
            retry_enabled: request.retry_enabled,
            compaction_enabled: request.compaction_enabled,
        });
        if let Some(error) = self.state.lock().open_error.take() {
            return Err(error);
        }

        let session_file = if request.resumes() {
            request.session_file.clone().unwrap_or_default()
        } else {
            let dir = request.workspace_path.join(".sessions");
            let _ = std::fs::create_dir_all(&dir);
            let path = dir.join(format!("{}.jsonl", uuid::Uuid::new_v4()));
            let _ = std::fs::write(&path, b"");
            path
        };

        Ok(FakeConversation {
            state: Arc::clone(&self.state),
            toolbox: self.toolbox.clone(),
            event_tx,
            session_file,
            aborted: Arc::new(AtomicBool::new(false)),
            abort_notify: Arc::new(Notify::new()),
        })
    }
}

/// Conversation handle produced by [`FakeSdk`].
pub struct FakeConversation {
    state: Arc<Mutex<FakeState>>,
    toolbox: Toolbox,
    event_tx: mpsc::Sender<SdkEvent>,
    session_file: PathBuf,
    aborted: Arc<AtomicBool>,
    abort_notify: Arc<Notify>,
}

impl FakeConversation {
    async fn run_turn(&self) -> Result<(), SdkError> {
        // Abort is scoped to a turn; a new turn starts clean.
        self.aborted.store(false, Ordering::SeqCst);
        let turn = self
            .state
            .lock()
            .turns
            .pop_front()
            .unwrap_or_else(|| FakeTurn::new().event(SdkEvent::TurnEnd));

        for item in turn.items {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(SdkError::Aborted);
            }
            match item {
                TurnItem::Event(event) => {
                    let _ = self.event_tx.send(event).await;
                }
                TurnItem::CallTool { tool_name, args } => {
                    let tool_call_id = {
                        let mut state = self.state.lock();
                        state.tool_call_counter += 1;
                        format!("tc-{}", state.tool_call_counter)
                    };
                    let _ = self
                        .event_tx
                        .send(SdkEvent::ToolStart {
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                            args: args.clone(),
                        })
                        .await;

                    let result = self
                        .toolbox
                        .dispatch(&tool_name, &args)
                        .unwrap_or_else(|| crate::toolbox::ToolResult::ok("executed"));

                    let _ = self
                        .event_tx
                        .send(SdkEvent::ToolEnd {
                            tool_call_id,
                            tool_name,
                            args,
                            output: result.content,
                            is_error: result.is_error,
                        })
                        .await;
                }
            }
        }

        if turn.hold {
            let notified = self.abort_notify.notified();
            if !self.aborted.load(Ordering::SeqCst) {
                notified.await;
            }
            return Err(SdkError::Aborted);
        }

        turn.outcome
    }

    fn record(&self, call: SdkCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl SdkConversation for FakeConversation {
    async fn prompt(&self, text: &str) -> Result<(), SdkError> {
        self.record(SdkCall::Prompt(text.to_string()));
        self.run_turn().await
    }

    async fn follow_up(&self, text: &str) -> Result<(), SdkError> {
        self.record(SdkCall::FollowUp(text.to_string()));
        self.run_turn().await
    }

    async fn steer(&self, text: &str) -> Result<(), SdkError> {
        self.record(SdkCall::Steer(text.to_string()));
        Ok(())
    }

    async fn abort(&self) {
        self.record(SdkCall::Abort);
        self.aborted.store(true, Ordering::SeqCst);
        self.abort_notify.notify_waiters();
    }

    async fn compact(&self, directive: &str) -> Result<(), SdkError> {
        self.record(SdkCall::Compact(directive.to_string()));
        Ok(())
    }

    async fn context_usage(&self) -> Result<ContextUsage, SdkError> {
        Ok(self.state.lock().context_usage)
    }

    fn session_file(&self) -> PathBuf {
        self.session_file.clone()
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
