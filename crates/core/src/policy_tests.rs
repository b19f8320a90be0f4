// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_are_conservative() {
    let policy = WorkflowPolicy::default();
    assert_eq!(policy.ready_limit, 0);
    assert_eq!(policy.executing_limit, 1);
    assert!(!policy.backlog_to_ready);
    assert!(!policy.ready_to_executing);
}

#[test]
fn zero_limit_means_unlimited() {
    let policy = WorkflowPolicy {
        ready_limit: 0,
        executing_limit: 0,
        ..Default::default()
    };
    assert!(policy.ready_has_room(10_000));
    assert!(policy.executing_has_room(10_000));
}

#[test]
fn limits_are_exclusive_at_the_cap() {
    let policy = WorkflowPolicy {
        executing_limit: 2,
        ..Default::default()
    };
    assert!(policy.executing_has_room(1));
    assert!(!policy.executing_has_room(2));
}

#[test]
fn override_layering_inherits_nones() {
    let ws = PolicyOverride {
        executing_limit: Some(3),
        ..Default::default()
    };
    let resolved = ws.layer(WorkflowPolicy::default());
    assert_eq!(resolved.executing_limit, 3);
    assert_eq!(resolved.ready_limit, 0);
}

#[test]
fn task_override_wins_over_workspace() {
    let ws = PolicyOverride {
        executing_limit: Some(3),
        backlog_to_ready: Some(true),
        ..Default::default()
    };
    let task = PolicyOverride {
        executing_limit: Some(1),
        ..Default::default()
    };
    let resolved = effective_policy(&task, &ws, WorkflowPolicy::default());
    assert_eq!(resolved.executing_limit, 1);
    assert!(resolved.backlog_to_ready);
}

#[test]
fn merge_replaces_only_set_fields() {
    let mut base = PolicyOverride {
        ready_limit: Some(5),
        backlog_to_ready: Some(false),
        ..Default::default()
    };
    base.merge(PolicyOverride {
        backlog_to_ready: Some(true),
        ..Default::default()
    });
    assert_eq!(base.ready_limit, Some(5));
    assert_eq!(base.backlog_to_ready, Some(true));
}

#[test]
fn empty_override_detection() {
    assert!(PolicyOverride::default().is_empty());
    assert!(!PolicyOverride {
        ready_limit: Some(1),
        ..Default::default()
    }
    .is_empty());
}
