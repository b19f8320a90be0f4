// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SDK event demultiplexer.
//!
//! One task per session turns the SDK's event stream into persisted
//! activity and live bus events, arming and disarming watchdogs as the
//! turn progresses. The loop also owns watchdog expiry: the earliest
//! pending deadline races the next event.

use super::task_session::TaskSession;
use super::watchdog::WatchdogKind;
use super::SessionManager;
use crate::summary::{is_write_tool, touched_file};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use tf_adapters::{AgentSdk, SdkConversation, SdkEvent, StopReason};
use tf_core::contract::{strip_contract_echo, TOOL_SAVE_PLAN};
use tf_core::{ChatRole, ExecutionStatus, LiveEvent, ToolCallMeta};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

/// Matches provider messages that indicate a turn/length ceiling.
fn is_turn_limit_message(message: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(build_turn_limit_pattern).is_match(message)
}

#[allow(clippy::unwrap_used)]
fn build_turn_limit_pattern() -> regex::Regex {
    regex::Regex::new(r"(?i)turn limit|max turns|too many turns").unwrap()
}

pub(crate) struct DemuxCtx<S: AgentSdk> {
    pub manager: SessionManager<S>,
    pub session: Arc<TaskSession<S>>,
}

pub(crate) async fn run<S: AgentSdk>(ctx: DemuxCtx<S>, mut rx: mpsc::Receiver<SdkEvent>) {
    loop {
        let deadline = ctx.session.watchdogs.lock().next_deadline();
        let sleep_target = deadline
            .map(|(_, at)| at)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            _ = ctx.session.wait_closed() => break,

            event = rx.recv() => {
                match event {
                    Some(event) => {
                        // Stale sessions silently drop events.
                        if !ctx.manager.is_active(&ctx.session) {
                            continue;
                        }
                        handle_event(&ctx, event).await;
                    }
                    None => break,
                }
            }
            _ = sleep_until(sleep_target), if deadline.is_some() => {
                // Re-check: the turn may have ended (disarming the
                // timers) while this branch was parked.
                let due = ctx
                    .session
                    .watchdogs
                    .lock()
                    .next_deadline()
                    .filter(|(_, at)| *at <= Instant::now());
                if let Some((kind, _)) = due {
                    if ctx.session.is_running() {
                        fire_watchdog(&ctx, kind).await;
                        break;
                    }
                    // A straggler event re-armed a timer after the turn
                    // settled; stalls only exist inside a turn.
                    ctx.session.watchdogs.lock().disarm_all();
                }
            }
        }
    }
}

async fn fire_watchdog<S: AgentSdk>(ctx: &DemuxCtx<S>, kind: WatchdogKind) {
    if !ctx.manager.is_active(&ctx.session) {
        return;
    }
    ctx.manager.watchdog_recover(&ctx.session, kind).await;
}

async fn handle_event<S: AgentSdk>(ctx: &DemuxCtx<S>, event: SdkEvent) {
    let session = &ctx.session;
    let activity = ctx.manager.activity();
    let ws = &session.workspace_id;
    let task_id = &session.task_id;

    session.watchdogs.lock().on_event();

    match event {
        SdkEvent::AgentStart => {
            session.clear_stream_buffers();
            activity.emit_live(
                ws,
                LiveEvent::Status {
                    task_id: task_id.clone(),
                    status: ExecutionStatus::Streaming,
                    message: None,
                },
            );
            broadcast_context_usage(ctx).await;
        }

        SdkEvent::MessageStart { role } => {
            if role != tf_adapters::MessageRole::Assistant {
                return;
            }
            session.watchdogs.lock().arm_stream();
            activity.emit_live(
                ws,
                LiveEvent::StreamingStart {
                    task_id: task_id.clone(),
                },
            );
        }

        SdkEvent::TextDelta { text } => {
            if session.mark_first_token() {
                tracing::debug!(
                    task_id = %task_id,
                    elapsed_ms = session.started_at.elapsed().as_millis() as u64,
                    "first assistant token"
                );
            }
            session.text_buffer.lock().push_str(&text);
            session.watchdogs.lock().arm_stream();
            activity.emit_live(
                ws,
                LiveEvent::StreamingText {
                    task_id: task_id.clone(),
                    text,
                },
            );
        }

        SdkEvent::ThinkingDelta { text } => {
            session.thinking_buffer.lock().push_str(&text);
            session.watchdogs.lock().arm_stream();
            activity.emit_live(
                ws,
                LiveEvent::ThinkingDelta {
                    task_id: task_id.clone(),
                    text,
                },
            );
        }

        SdkEvent::MessageEnd {
            role,
            content,
            model,
            usage,
            stop_reason,
        } => {
            if role != tf_adapters::MessageRole::Assistant {
                return;
            }
            session.watchdogs.lock().disarm_stream();

            if !session.thinking_buffer.lock().is_empty() {
                activity.emit_live(
                    ws,
                    LiveEvent::ThinkingEnd {
                        task_id: task_id.clone(),
                    },
                );
                session.thinking_buffer.lock().clear();
            }
            activity.emit_live(
                ws,
                LiveEvent::StreamingEnd {
                    task_id: task_id.clone(),
                },
            );
            session.text_buffer.lock().clear();

            let stripped = strip_contract_echo(&content);
            if !stripped.is_empty() && !is_tool_echo(ctx, &stripped) {
                if let Err(e) = activity.chat_message(
                    ws,
                    Some(task_id.clone()),
                    ChatRole::Agent,
                    stripped,
                    Vec::new(),
                    None,
                ) {
                    tracing::warn!(task_id = %task_id, error = %e, "failed to persist agent message");
                }
            }

            if let Some(delta) = usage {
                ctx.manager
                    .record_usage(session, model.clone(), delta)
                    .await;
            }

            match &stop_reason {
                StopReason::Error(message) => {
                    session.set_turn_error(message.clone());
                    if let Some(guardrails) = session.guardrails() {
                        if is_turn_limit_message(message) {
                            guardrails.mark_turn_limit();
                        }
                    }
                    activity.emit_live(
                        ws,
                        LiveEvent::Status {
                            task_id: task_id.clone(),
                            status: ExecutionStatus::Error,
                            message: Some(message.clone()),
                        },
                    );
                }
                StopReason::Length => {
                    if let Some(guardrails) = session.guardrails() {
                        guardrails.mark_turn_limit();
                    }
                }
                StopReason::EndTurn => {}
            }

            broadcast_context_usage(ctx).await;
        }

        SdkEvent::ToolStart {
            tool_call_id,
            tool_name,
            args,
        } => {
            session.inflight_tools.lock().insert(
                tool_call_id.clone(),
                super::task_session::InflightTool {
                    tool_name: tool_name.clone(),
                    args,
                    streamed: String::new(),
                },
            );
            session.watchdogs.lock().arm_tool();

            // Grace-turn restriction: anything but save_plan aborts.
            if let Some(guardrails) = session.guardrails() {
                if guardrails.is_grace_restricted() && tool_name != TOOL_SAVE_PLAN {
                    guardrails.trip(format!(
                        "tool {} called during the grace turn",
                        tool_name
                    ));
                    abort_in_background(ctx);
                }
            }

            activity.emit_live(
                ws,
                LiveEvent::Status {
                    task_id: task_id.clone(),
                    status: ExecutionStatus::ToolUse,
                    message: None,
                },
            );
            activity.emit_live(
                ws,
                LiveEvent::ToolStart {
                    task_id: task_id.clone(),
                    tool_call_id,
                    tool_name,
                },
            );
        }

        SdkEvent::ToolUpdate {
            tool_call_id,
            output,
        } => {
            let delta = {
                let mut inflight = session.inflight_tools.lock();
                match inflight.get_mut(&tool_call_id) {
                    Some(tool) => {
                        let delta = output
                            .strip_prefix(tool.streamed.as_str())
                            .unwrap_or(&output)
                            .to_string();
                        tool.streamed = output;
                        delta
                    }
                    None => output,
                }
            };
            session.watchdogs.lock().arm_tool();
            activity.emit_live(
                ws,
                LiveEvent::ToolUpdate {
                    task_id: task_id.clone(),
                    tool_call_id,
                    delta,
                },
            );
        }

        SdkEvent::ToolEnd {
            tool_call_id,
            tool_name,
            args,
            output,
            is_error,
        } => {
            let inflight = session.inflight_tools.lock().remove(&tool_call_id);
            let (tool_name, args) = match inflight {
                Some(tool) if tool_name.is_empty() => (tool.tool_name, tool.args),
                _ => (tool_name, args),
            };

            session.tool_calls.fetch_add(1, Ordering::SeqCst);
            if is_write_tool(&tool_name) {
                if let Some(path) = touched_file(&args) {
                    session.touched_files.lock().insert(path);
                }
            }

            if let Err(e) = activity.chat_message(
                ws,
                Some(task_id.clone()),
                ChatRole::System,
                output.clone(),
                Vec::new(),
                Some(ToolCallMeta {
                    tool_name: tool_name.clone(),
                    tool_call_id: tool_call_id.clone(),
                    args: args.clone(),
                    is_error,
                }),
            ) {
                tracing::warn!(task_id = %task_id, error = %e, "failed to persist tool result");
            }

            *session.last_tool_result.lock() = Some((output.clone(), Instant::now()));

            {
                let mut watchdogs = session.watchdogs.lock();
                watchdogs.disarm_tool();
                watchdogs.arm_post_tool();
            }

            // Guardrail accounting counts completed calls and read bytes.
            if let Some(guardrails) = session.guardrails() {
                let calls = guardrails.tool_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if calls > guardrails.max_tool_calls {
                    guardrails.trip(format!(
                        "tool-call budget exceeded ({}/{})",
                        calls, guardrails.max_tool_calls
                    ));
                    abort_in_background(ctx);
                }
                let bytes = guardrails
                    .read_bytes
                    .fetch_add(output.len() as u64, Ordering::SeqCst)
                    + output.len() as u64;
                if bytes > guardrails.read_byte_budget {
                    guardrails.trip(format!(
                        "read budget exceeded ({} bytes)",
                        bytes
                    ));
                    abort_in_background(ctx);
                }
            }

            activity.emit_live(
                ws,
                LiveEvent::ToolEnd {
                    task_id: task_id.clone(),
                    tool_call_id,
                    tool_name,
                    is_error,
                },
            );
            activity.emit_live(
                ws,
                LiveEvent::Status {
                    task_id: task_id.clone(),
                    status: ExecutionStatus::Streaming,
                    message: None,
                },
            );
        }

        SdkEvent::TurnEnd => {
            session.turns.fetch_add(1, Ordering::SeqCst);
            activity.emit_live(
                ws,
                LiveEvent::TurnEnd {
                    task_id: task_id.clone(),
                },
            );
            broadcast_context_usage(ctx).await;
        }

        SdkEvent::CompactionStart => {
            tracing::info!(task_id = %task_id, "auto compaction started");
            let _ = activity.system_event(
                ws,
                Some(task_id.clone()),
                "compaction-started",
                "conversation compaction started",
                None,
            );
        }

        SdkEvent::CompactionEnd {
            tokens_before,
            tokens_after,
        } => {
            tracing::info!(task_id = %task_id, tokens_before, tokens_after, "auto compaction finished");
            let _ = activity.system_event(
                ws,
                Some(task_id.clone()),
                "compaction-finished",
                format!(
                    "conversation compacted: {} → {} tokens",
                    tokens_before, tokens_after
                ),
                Some(serde_json::json!({
                    "tokensBefore": tokens_before,
                    "tokensAfter": tokens_after,
                })),
            );
        }

        SdkEvent::RetryAttempt {
            attempt,
            delay_ms,
            error,
        } => {
            tracing::warn!(task_id = %task_id, attempt, delay_ms, error = %error, "provider retry");
            let _ = activity.system_event(
                ws,
                Some(task_id.clone()),
                "retry",
                format!("provider error, retry {} in {} ms", attempt, delay_ms),
                Some(serde_json::json!({
                    "attempt": attempt,
                    "delayMs": delay_ms,
                    "error": error,
                })),
            );
        }

        SdkEvent::RetryExhausted { error } => {
            session.set_turn_error(error.clone());
            let _ = activity.system_event(
                ws,
                Some(task_id.clone()),
                "retry-exhausted",
                "provider retries exhausted",
                Some(serde_json::json!({ "error": error })),
            );
        }
    }
}

/// Assistant text that merely echoes the last tool result within the
/// dedup window is suppressed from persistence (the live events still
/// flowed, so clients clear their buffers).
fn is_tool_echo<S: AgentSdk>(ctx: &DemuxCtx<S>, stripped: &str) -> bool {
    let window = ctx.manager.dedup_window();
    let last = ctx.session.last_tool_result.lock();
    match &*last {
        Some((text, at)) => at.elapsed() <= window && text.trim() == stripped.trim(),
        None => false,
    }
}

async fn broadcast_context_usage<S: AgentSdk>(ctx: &DemuxCtx<S>) {
    let Some(conversation) = ctx.session.conversation() else {
        return;
    };
    match conversation.context_usage().await {
        Ok(usage) => {
            ctx.manager.activity().emit_live(
                &ctx.session.workspace_id,
                LiveEvent::ContextUsage {
                    task_id: ctx.session.task_id.clone(),
                    tokens: usage.tokens,
                    context_window: usage.context_window,
                    percent: usage.percent(),
                },
            );
        }
        Err(e) => {
            tracing::debug!(task_id = %ctx.session.task_id, error = %e, "context usage unavailable");
        }
    }
}

fn abort_in_background<S: AgentSdk>(ctx: &DemuxCtx<S>) {
    if let Some(conversation) = ctx.session.conversation() {
        tokio::spawn(async move {
            conversation.abort().await;
        });
    }
}
