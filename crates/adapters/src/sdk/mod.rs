// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SDK abstraction: conversations, events, errors.
//!
//! A conversation is opened once per session (fresh or in resume mode
//! against an existing session file) and then driven turn by turn. All
//! streaming output arrives as [`SdkEvent`]s on the channel passed to
//! [`AgentSdk::open`]; the `prompt`/`follow_up` futures resolve when the
//! turn ends. The two can race — a turn future may resolve while a
//! retry is still delivering a tool call — and the engine's completion
//! protocol tolerates that.

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod process;

use async_trait::async_trait;
use std::path::PathBuf;
use tf_core::{TaskId, ThinkingLevel, UsageDelta};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from SDK operations.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// The conversation was aborted by us. Benign: the planning
    /// pipeline aborts on purpose after `save_plan`.
    #[error("conversation aborted")]
    Aborted,
    #[error("sdk timeout: {0}")]
    Timeout(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("conversation closed")]
    Closed,
}

/// Author of a streamed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Assistant,
    User,
    System,
}

/// Why a message stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    /// The provider truncated at its length ceiling.
    Length,
    Error(String),
}

impl StopReason {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            StopReason::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Point-in-time context consumption reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub tokens: u64,
    pub context_window: u64,
}

impl ContextUsage {
    pub fn percent(&self) -> f64 {
        if self.context_window == 0 {
            return 0.0;
        }
        (self.tokens as f64 / self.context_window as f64) * 100.0
    }
}

/// Events streamed from one conversation.
///
/// A single subscription handler per session maps these onto persisted
/// activity and live bus events.
#[derive(Debug, Clone)]
pub enum SdkEvent {
    /// The agent process is up and about to stream.
    AgentStart,
    MessageStart {
        role: MessageRole,
    },
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        text: String,
    },
    MessageEnd {
        role: MessageRole,
        content: String,
        model: Option<String>,
        usage: Option<UsageDelta>,
        stop_reason: StopReason,
    },
    ToolStart {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    /// Cumulative streamed output for an in-flight tool call.
    ToolUpdate {
        tool_call_id: String,
        output: String,
    },
    ToolEnd {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
        output: String,
        is_error: bool,
    },
    TurnEnd,
    CompactionStart,
    CompactionEnd {
        tokens_before: u64,
        tokens_after: u64,
    },
    RetryAttempt {
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    RetryExhausted {
        error: String,
    },
}

/// How to open a conversation.
#[derive(Debug, Clone)]
pub struct ConversationRequest {
    pub workspace_path: PathBuf,
    pub task_id: TaskId,
    /// Existing session handle to resume, if any.
    pub session_file: Option<PathBuf>,
    /// Mint a fresh session even when a handle exists.
    pub force_new: bool,
    pub model: Option<String>,
    pub thinking_level: ThinkingLevel,
    pub retry_enabled: bool,
    pub compaction_enabled: bool,
    /// Opaque settings forwarded to the SDK.
    pub settings_overrides: serde_json::Value,
}

impl ConversationRequest {
    pub fn new(workspace_path: PathBuf, task_id: TaskId) -> Self {
        Self {
            workspace_path,
            task_id,
            session_file: None,
            force_new: false,
            model: None,
            thinking_level: ThinkingLevel::Low,
            retry_enabled: true,
            compaction_enabled: true,
            settings_overrides: serde_json::Value::Null,
        }
    }

    /// Whether the SDK should open in resume mode.
    pub fn resumes(&self) -> bool {
        self.session_file.is_some() && !self.force_new
    }
}

/// Factory for conversations.
#[async_trait]
pub trait AgentSdk: Clone + Send + Sync + 'static {
    type Conversation: SdkConversation;

    /// Open a conversation. Events for its whole lifetime flow through
    /// `event_tx`; the returned handle drives turns.
    async fn open(
        &self,
        request: ConversationRequest,
        event_tx: mpsc::Sender<SdkEvent>,
    ) -> Result<Self::Conversation, SdkError>;
}

/// One live conversation.
#[async_trait]
pub trait SdkConversation: Send + Sync + 'static {
    /// Start a new turn. Resolves at turn end; events stream meanwhile.
    async fn prompt(&self, text: &str) -> Result<(), SdkError>;

    /// Continue the conversation with another turn.
    async fn follow_up(&self, text: &str) -> Result<(), SdkError>;

    /// Inject a user message into the currently streaming turn.
    async fn steer(&self, text: &str) -> Result<(), SdkError>;

    /// Ask the conversation to stop. Idempotent; a no-op after the
    /// conversation has already ended.
    async fn abort(&self);

    /// Summarize the conversation history in place.
    async fn compact(&self, directive: &str) -> Result<(), SdkError>;

    /// Current context consumption.
    async fn context_usage(&self) -> Result<ContextUsage, SdkError>;

    /// The opaque session handle, persisted on the task for resumption.
    fn session_file(&self) -> PathBuf;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
