// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn context_usage_percent() {
    let usage = ContextUsage {
        tokens: 50_000,
        context_window: 200_000,
    };
    assert!((usage.percent() - 25.0).abs() < f64::EPSILON);
}

#[test]
fn context_usage_percent_handles_zero_window() {
    let usage = ContextUsage {
        tokens: 10,
        context_window: 0,
    };
    assert_eq!(usage.percent(), 0.0);
}

#[test]
fn request_resumes_only_with_handle_and_no_force() {
    let mut request = ConversationRequest::new("/tmp/ws".into(), tf_core::TaskId::new("TF-1"));
    assert!(!request.resumes());

    request.session_file = Some("/tmp/ws/.sessions/s.jsonl".into());
    assert!(request.resumes());

    request.force_new = true;
    assert!(!request.resumes());
}

#[test]
fn stop_reason_error_message() {
    assert_eq!(StopReason::EndTurn.error_message(), None);
    assert_eq!(StopReason::Length.error_message(), None);
    assert_eq!(
        StopReason::Error("boom".into()).error_message(),
        Some("boom")
    );
}
