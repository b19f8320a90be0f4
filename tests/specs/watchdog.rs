// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stall recovery: a silent stream trips the stream-silence watchdog.

use super::prelude::*;
use tf_adapters::{FakeTurn, MessageRole, SdkCall, SdkEvent};
use tf_core::{ActivityKind, Actor, BusEvent, LiveEvent};

#[tokio::test(start_paused = true)]
async fn stream_silence_recovery() {
    let h = Harness::new();
    let task = h.ready_task("Stalls", &["never finishes"]).await;
    let mut rx = h.subscribe();

    // message_start then nothing for 60 s.
    h.sdk.push_turn(
        FakeTurn::new()
            .event(SdkEvent::AgentStart)
            .event(SdkEvent::MessageStart {
                role: MessageRole::Assistant,
            })
            .held(),
    );
    let (seen, hook) = completion_probe();
    h.sessions
        .start_execution(&h.ws, &task.id, Actor::User, Some(hook))
        .await
        .expect("start execution");

    wait_until(|| h.sessions.get_active(&task.id).is_none()).await;

    let events = drain(&mut rx);

    // Exactly one stall system event with the right phase marker.
    let stalls: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BusEvent::Activity { activity } => match &activity.kind {
                ActivityKind::SystemEvent { event, metadata, .. } if event == "stall" => {
                    metadata.clone()
                }
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(stalls.len(), 1);
    assert_eq!(stalls[0]["stallPhase"], "stream-silence");

    // Session recovered to idle with a turn_end; SDK abort attempted.
    assert!(events.iter().any(|e| matches!(
        e,
        BusEvent::Live(LiveEvent::Status {
            status: tf_core::ExecutionStatus::Idle,
            ..
        })
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, BusEvent::Live(LiveEvent::TurnEnd { .. }))));
    wait_until(|| h.sdk.calls().iter().any(|c| matches!(c, SdkCall::Abort))).await;

    // Never a completion.
    assert_eq!(*seen.lock(), None);
}
