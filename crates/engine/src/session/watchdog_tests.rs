// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn armed() -> Watchdogs {
    let mut watchdogs = Watchdogs::new(WatchdogConfig::default(), true);
    watchdogs.arm_turn_start();
    watchdogs
}

#[tokio::test(start_paused = true)]
async fn turn_start_arms_first_event_and_ceiling() {
    let watchdogs = armed();
    let (kind, _) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::NoFirstEvent);
}

#[tokio::test(start_paused = true)]
async fn any_event_clears_no_first_event() {
    let mut watchdogs = armed();
    watchdogs.on_event();
    let (kind, _) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::MaxTurnDuration);
}

#[tokio::test(start_paused = true)]
async fn stream_silence_beats_turn_ceiling() {
    let mut watchdogs = armed();
    watchdogs.on_event();
    watchdogs.arm_stream();
    let (kind, at) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::StreamSilence);
    assert_eq!(at - Instant::now(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn tool_watchdog_supersedes_stream() {
    let mut watchdogs = armed();
    watchdogs.on_event();
    watchdogs.arm_stream();
    watchdogs.arm_tool();
    let (kind, _) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::ToolExecution);
}

#[tokio::test(start_paused = true)]
async fn tool_end_hands_off_to_post_tool() {
    let mut watchdogs = armed();
    watchdogs.on_event();
    watchdogs.arm_tool();
    watchdogs.disarm_tool();
    watchdogs.arm_post_tool();
    let (kind, _) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::PostTool);
}

#[tokio::test(start_paused = true)]
async fn next_event_clears_post_tool() {
    let mut watchdogs = armed();
    watchdogs.on_event();
    watchdogs.arm_post_tool();
    watchdogs.on_event();
    let (kind, _) = watchdogs.next_deadline().unwrap();
    assert_eq!(kind, WatchdogKind::MaxTurnDuration);
}

#[tokio::test(start_paused = true)]
async fn disabled_watchdogs_never_arm() {
    let mut watchdogs = Watchdogs::new(WatchdogConfig::default(), false);
    watchdogs.arm_turn_start();
    watchdogs.arm_stream();
    watchdogs.arm_tool();
    watchdogs.arm_post_tool();
    assert!(watchdogs.next_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn disarm_all_clears_everything() {
    let mut watchdogs = armed();
    watchdogs.arm_stream();
    watchdogs.arm_tool();
    watchdogs.disarm_all();
    assert!(watchdogs.next_deadline().is_none());
}

#[tokio::test(start_paused = true)]
async fn stall_phase_labels() {
    assert_eq!(WatchdogKind::NoFirstEvent.to_string(), "no-first-event");
    assert_eq!(WatchdogKind::StreamSilence.to_string(), "stream-silence");
    assert_eq!(WatchdogKind::ToolExecution.to_string(), "tool-execution");
    assert_eq!(WatchdogKind::PostTool.to_string(), "post-tool");
    assert_eq!(WatchdogKind::MaxTurnDuration.to_string(), "max-turn-duration");
}
