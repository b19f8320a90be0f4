// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production SDK driving an agent CLI subprocess.
//!
//! Each turn spawns the agent CLI in non-interactive mode with
//! `--output-format stream-json`, pointing it at the conversation's
//! session file so turns share history. The child's stdout is a JSONL
//! stream of messages in the provider's transcript shape (`system`
//! init, `assistant` messages with text/tool_use blocks, `user`
//! tool_result messages, a final `result` record); the parser maps
//! those onto [`SdkEvent`]s.
//!
//! Orchestrator tools (`task_complete`, `save_plan`,
//! `attach_task_file`) are declared to the CLI as external tools. When
//! a tool_use block names one of them, the adapter runs it through the
//! [`Toolbox`] inline and emits the resulting `ToolEnd` itself; the
//! stream's own tool_result line for that call id is then dropped so
//! the call completes exactly once.

use super::{
    AgentSdk, ContextUsage, ConversationRequest, MessageRole, SdkConversation, SdkError, SdkEvent,
    StopReason,
};
use crate::toolbox::Toolbox;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tf_core::{ThinkingLevel, UsageDelta};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

/// Configuration for the agent CLI.
#[derive(Debug, Clone)]
pub struct ProcessSdkConfig {
    /// Binary to run (e.g. `claude`).
    pub command: String,
    /// Extra args appended to every invocation.
    pub extra_args: Vec<String>,
    /// Context window used for usage percent when the provider does not
    /// report one.
    pub context_window: u64,
}

impl Default for ProcessSdkConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
            context_window: 200_000,
        }
    }
}

/// SDK backed by an agent CLI subprocess per turn.
#[derive(Clone)]
pub struct ProcessSdk {
    config: Arc<ProcessSdkConfig>,
    toolbox: Toolbox,
}

impl ProcessSdk {
    pub fn new(config: ProcessSdkConfig, toolbox: Toolbox) -> Self {
        Self {
            config: Arc::new(config),
            toolbox,
        }
    }
}

#[async_trait]
impl AgentSdk for ProcessSdk {
    type Conversation = ProcessConversation;

    async fn open(
        &self,
        request: ConversationRequest,
        event_tx: mpsc::Sender<SdkEvent>,
    ) -> Result<Self::Conversation, SdkError> {
        let session_file = if request.resumes() {
            let path = request
                .session_file
                .clone()
                .ok_or_else(|| SdkError::Spawn("resume requested without a session file".into()))?;
            if !path.exists() {
                return Err(SdkError::Spawn(format!(
                    "session file does not exist: {}",
                    path.display()
                )));
            }
            path
        } else {
            let dir = request.workspace_path.join(".sessions");
            std::fs::create_dir_all(&dir).map_err(|e| SdkError::Spawn(e.to_string()))?;
            dir.join(format!("{}.jsonl", uuid::Uuid::new_v4()))
        };

        Ok(ProcessConversation {
            config: Arc::clone(&self.config),
            toolbox: self.toolbox.clone(),
            event_tx,
            request,
            session_file,
            running: Mutex::new(None),
            aborted: AtomicBool::new(false),
            last_tokens: Mutex::new(0),
        })
    }
}

struct RunningChild {
    child: Child,
    stdin: Option<ChildStdin>,
}

/// One conversation: a session file shared by consecutive child runs.
pub struct ProcessConversation {
    config: Arc<ProcessSdkConfig>,
    toolbox: Toolbox,
    event_tx: mpsc::Sender<SdkEvent>,
    request: ConversationRequest,
    session_file: PathBuf,
    running: Mutex<Option<RunningChild>>,
    aborted: AtomicBool,
    last_tokens: Mutex<u64>,
}

impl ProcessConversation {
    fn turn_args(&self, text: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            text.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--session-file".to_string(),
            self.session_file.display().to_string(),
        ];
        if let Some(model) = &self.request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.request.thinking_level != ThinkingLevel::Off {
            args.push("--thinking".to_string());
            args.push(self.request.thinking_level.to_string());
        }
        if !self.request.retry_enabled {
            args.push("--no-retry".to_string());
        }
        if !self.request.compaction_enabled {
            args.push("--no-auto-compaction".to_string());
        }
        if !self.request.settings_overrides.is_null() {
            args.push("--settings".to_string());
            args.push(self.request.settings_overrides.to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    async fn run_turn(&self, args: Vec<String>) -> Result<(), SdkError> {
        // Abort is scoped to a turn; a new turn starts clean.
        self.aborted.store(false, Ordering::SeqCst);

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .current_dir(&self.request.workspace_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SdkError::Spawn(format!("{}: {}", self.config.command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::Spawn("child stdout not captured".into()))?;
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        {
            let mut running = self.running.lock();
            *running = Some(RunningChild { child, stdin });
        }
        if self.aborted.load(Ordering::SeqCst) {
            if let Some(running) = self.running.lock().as_mut() {
                let _ = running.child.start_kill();
            }
        }

        let _ = self.event_tx.send(SdkEvent::AgentStart).await;

        let mut parser = StreamParser::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for parsed in parser.parse_line(&line) {
                match parsed {
                    Parsed::Event(event) => {
                        if let SdkEvent::MessageEnd {
                            usage: Some(usage), ..
                        } = &event
                        {
                            *self.last_tokens.lock() = usage.input_tokens
                                + usage.output_tokens
                                + usage.cache_read_tokens
                                + usage.cache_creation_tokens;
                        }
                        let _ = self.event_tx.send(event).await;
                    }
                    Parsed::OrchestratorTool {
                        tool_call_id,
                        tool_name,
                        args,
                    } => {
                        let result = self
                            .toolbox
                            .dispatch(&tool_name, &args)
                            .unwrap_or_else(|| crate::toolbox::ToolResult::error("unknown tool"));
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
        }

        // Child stdout is closed; reap it.
        let status = {
            let running = { self.running.lock().take() };
            match running {
                Some(mut running) => running.child.wait().await,
                None => return Err(SdkError::Aborted),
            }
        };

        if !parser.saw_turn_end {
            let _ = self.event_tx.send(SdkEvent::TurnEnd).await;
        }

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                if self.aborted.load(Ordering::SeqCst) {
                    return Err(SdkError::Aborted);
                }
                let tail = match stderr {
                    Some(stderr) => read_tail(stderr).await,
                    None => String::new(),
                };
                Err(SdkError::Provider(format!(
                    "agent exited with {}: {}",
                    status,
                    tail.trim()
                )))
            }
            Err(e) => Err(SdkError::Provider(e.to_string())),
        }
    }
}

async fn read_tail(stderr: tokio::process::ChildStderr) -> String {
    let mut out = String::new();
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        out.push_str(&line);
        out.push('\n');
        if out.len() > 4096 {
            break;
        }
    }
    out
}

#[async_trait]
impl SdkConversation for ProcessConversation {
    async fn prompt(&self, text: &str) -> Result<(), SdkError> {
        self.run_turn(self.turn_args(text)).await
    }

    async fn follow_up(&self, text: &str) -> Result<(), SdkError> {
        // The session file carries the history; a follow-up is simply
        // the next turn against it.
        self.run_turn(self.turn_args(text)).await
    }

    async fn steer(&self, text: &str) -> Result<(), SdkError> {
        // Steering only has defined behavior while a turn is streaming.
        // Take stdin out of the lock so the write can await.
        let stdin = { self.running.lock().as_mut().and_then(|r| r.stdin.take()) };
        let Some(mut stdin) = stdin else {
            return Err(SdkError::Closed);
        };
        let result = stdin.write_all(format!("{}\n", text).as_bytes()).await;
        if let Some(running) = self.running.lock().as_mut() {
            running.stdin = Some(stdin);
        }
        result.map_err(|e| SdkError::Provider(e.to_string()))
    }

    async fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        let mut running = self.running.lock();
        if let Some(running) = running.as_mut() {
            if let Err(e) = running.child.start_kill() {
                tracing::debug!(error = %e, "abort: child already gone");
            }
        }
    }

    async fn compact(&self, directive: &str) -> Result<(), SdkError> {
        let _ = self.event_tx.send(SdkEvent::CompactionStart).await;
        let tokens_before = *self.last_tokens.lock();
        let mut args = self.turn_args(directive);
        args.push("--compact".to_string());
        let result = self.run_turn(args).await;
        let tokens_after = *self.last_tokens.lock();
        let _ = self
            .event_tx
            .send(SdkEvent::CompactionEnd {
                tokens_before,
                tokens_after,
            })
            .await;
        result
    }

    async fn context_usage(&self) -> Result<ContextUsage, SdkError> {
        Ok(ContextUsage {
            tokens: *self.last_tokens.lock(),
            context_window: self.config.context_window,
        })
    }

    fn session_file(&self) -> PathBuf {
        self.session_file.clone()
    }
}

/// Orchestrator tool names handled inline by the adapter.
fn is_orchestrator_tool(name: &str) -> bool {
    matches!(
        name,
        tf_core::contract::TOOL_TASK_COMPLETE
            | tf_core::contract::TOOL_SAVE_PLAN
            | tf_core::contract::TOOL_ATTACH_FILE
    )
}

enum Parsed {
    Event(SdkEvent),
    OrchestratorTool {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
}

/// Incremental parser over the child's stream-json stdout.
struct StreamParser {
    /// Tool call ids whose results we supply ourselves; their stream
    /// tool_result lines are dropped.
    orchestrator_ids: HashSet<String>,
    saw_turn_end: bool,
}

impl StreamParser {
    fn new() -> Self {
        Self {
            orchestrator_ids: HashSet::new(),
            saw_turn_end: false,
        }
    }

    fn parse_line(&mut self, line: &str) -> Vec<Parsed> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let json: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        match json.get("type").and_then(|v| v.as_str()) {
            Some("assistant") => self.parse_assistant(&json),
            Some("user") => self.parse_tool_results(&json),
            Some("result") => {
                self.saw_turn_end = true;
                vec![Parsed::Event(SdkEvent::TurnEnd)]
            }
            _ => Vec::new(),
        }
    }

    fn parse_assistant(&mut self, json: &serde_json::Value) -> Vec<Parsed> {
        let Some(message) = json.get("message") else {
            return Vec::new();
        };

        let mut out = vec![Parsed::Event(SdkEvent::MessageStart {
            role: MessageRole::Assistant,
        })];

        let mut text = String::new();
        if let Some(blocks) = message.get("content").and_then(|c| c.as_array()) {
            for block in blocks {
                match block.get("type").and_then(|v| v.as_str()) {
                    Some("text") => {
                        if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                            text.push_str(t);
                            out.push(Parsed::Event(SdkEvent::TextDelta {
                                text: t.to_string(),
                            }));
                        }
                    }
                    Some("thinking") => {
                        if let Some(t) = block.get("thinking").and_then(|v| v.as_str()) {
                            out.push(Parsed::Event(SdkEvent::ThinkingDelta {
                                text: t.to_string(),
                            }));
                        }
                    }
                    Some("tool_use") => {
                        let tool_call_id = block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let tool_name = block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let args = block.get("input").cloned().unwrap_or(serde_json::Value::Null);

                        out.push(Parsed::Event(SdkEvent::ToolStart {
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                            args: args.clone(),
                        }));
                        if is_orchestrator_tool(&tool_name) {
                            self.orchestrator_ids.insert(tool_call_id.clone());
                            out.push(Parsed::OrchestratorTool {
                                tool_call_id,
                                tool_name,
                                args,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        let model = message
            .get("model")
            .and_then(|v| v.as_str())
            .map(String::from);
        let usage = message.get("usage").map(parse_usage);
        let stop_reason = match message.get("stop_reason").and_then(|v| v.as_str()) {
            Some("max_tokens") | Some("length") => StopReason::Length,
            Some("error") => StopReason::Error(
                message
                    .get("stop_reason_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("provider error")
                    .to_string(),
            ),
            _ => StopReason::EndTurn,
        };

        out.push(Parsed::Event(SdkEvent::MessageEnd {
            role: MessageRole::Assistant,
            content: text,
            model,
            usage,
            stop_reason,
        }));
        out
    }

    fn parse_tool_results(&mut self, json: &serde_json::Value) -> Vec<Parsed> {
        let Some(blocks) = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
        else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for block in blocks {
            if block.get("type").and_then(|v| v.as_str()) != Some("tool_result") {
                continue;
            }
            let tool_call_id = block
                .get("tool_use_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            // Orchestrator tools already completed inline.
            if self.orchestrator_ids.remove(&tool_call_id) {
                continue;
            }
            let output = match block.get("content") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let is_error = block
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            out.push(Parsed::Event(SdkEvent::ToolEnd {
                tool_call_id,
                tool_name: String::new(),
                args: serde_json::Value::Null,
                output,
                is_error,
            }));
        }
        out
    }
}

fn parse_usage(usage: &serde_json::Value) -> UsageDelta {
    let get = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    UsageDelta {
        input_tokens: get("input_tokens"),
        output_tokens: get("output_tokens"),
        cache_read_tokens: get("cache_read_input_tokens"),
        cache_creation_tokens: get("cache_creation_input_tokens"),
        cost_usd: usage
            .get("cost_usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
