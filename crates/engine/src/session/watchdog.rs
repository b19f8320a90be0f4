// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered stall watchdogs for execution turns.
//!
//! Five independent timers cover the ways a turn can go quiet. Each is
//! armed/disarmed by specific SDK events; expiry triggers one
//! cooperative recovery for the whole session, never a hard failure.
//! Planning and chat turns do not arm them.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Timeouts for the five watchdogs.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    /// SDK produced no event at all after turn start.
    pub no_first_event: Duration,
    /// Assistant streaming went silent mid-message.
    pub stream_silence: Duration,
    /// A tool started but never completed.
    pub tool_execution: Duration,
    /// A tool completed and nothing followed.
    pub post_tool: Duration,
    /// Absolute ceiling for one turn.
    pub max_turn: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            no_first_event: Duration::from_secs(20),
            stream_silence: Duration::from_secs(60),
            tool_execution: Duration::from_secs(120),
            post_tool: Duration::from_secs(120),
            max_turn: Duration::from_secs(600),
        }
    }
}

/// Which watchdog fired. The display form is the `stallPhase` value in
/// stall telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogKind {
    NoFirstEvent,
    StreamSilence,
    ToolExecution,
    PostTool,
    MaxTurnDuration,
}

impl fmt::Display for WatchdogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchdogKind::NoFirstEvent => write!(f, "no-first-event"),
            WatchdogKind::StreamSilence => write!(f, "stream-silence"),
            WatchdogKind::ToolExecution => write!(f, "tool-execution"),
            WatchdogKind::PostTool => write!(f, "post-tool"),
            WatchdogKind::MaxTurnDuration => write!(f, "max-turn-duration"),
        }
    }
}

/// Deadline state for one session.
#[derive(Debug)]
pub struct Watchdogs {
    config: WatchdogConfig,
    /// Armed only for execution turns.
    enabled: bool,
    no_first_event: Option<Instant>,
    stream_silence: Option<Instant>,
    tool_execution: Option<Instant>,
    post_tool: Option<Instant>,
    max_turn: Option<Instant>,
}

impl Watchdogs {
    pub fn new(config: WatchdogConfig, enabled: bool) -> Self {
        Self {
            config,
            enabled,
            no_first_event: None,
            stream_silence: None,
            tool_execution: None,
            post_tool: None,
            max_turn: None,
        }
    }

    /// Arm the turn-start watchdogs.
    pub fn arm_turn_start(&mut self) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        self.no_first_event = Some(now + self.config.no_first_event);
        self.max_turn = Some(now + self.config.max_turn);
    }

    /// Any SDK event clears the no-first-event and post-tool timers.
    pub fn on_event(&mut self) {
        self.no_first_event = None;
        self.post_tool = None;
    }

    pub fn arm_stream(&mut self) {
        if !self.enabled {
            return;
        }
        self.stream_silence = Some(Instant::now() + self.config.stream_silence);
    }

    pub fn disarm_stream(&mut self) {
        self.stream_silence = None;
    }

    pub fn arm_tool(&mut self) {
        if !self.enabled {
            return;
        }
        self.tool_execution = Some(Instant::now() + self.config.tool_execution);
        // A running tool supersedes stream silence.
        self.stream_silence = None;
    }

    pub fn disarm_tool(&mut self) {
        self.tool_execution = None;
    }

    pub fn arm_post_tool(&mut self) {
        if !self.enabled {
            return;
        }
        self.post_tool = Some(Instant::now() + self.config.post_tool);
    }

    /// Disarm everything (turn over, session torn down).
    pub fn disarm_all(&mut self) {
        self.no_first_event = None;
        self.stream_silence = None;
        self.tool_execution = None;
        self.post_tool = None;
        self.max_turn = None;
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<(WatchdogKind, Instant)> {
        let candidates = [
            (WatchdogKind::NoFirstEvent, self.no_first_event),
            (WatchdogKind::StreamSilence, self.stream_silence),
            (WatchdogKind::ToolExecution, self.tool_execution),
            (WatchdogKind::PostTool, self.post_tool),
            (WatchdogKind::MaxTurnDuration, self.max_turn),
        ];
        candidates
            .into_iter()
            .filter_map(|(kind, deadline)| deadline.map(|d| (kind, d)))
            .min_by_key(|(_, deadline)| *deadline)
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
