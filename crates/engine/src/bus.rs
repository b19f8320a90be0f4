// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace broadcast fan-out.
//!
//! One `tokio::sync::broadcast` channel per workspace carries the mixed
//! stream of persisted activity entries and ephemeral live events.
//! Dropping a receiver is the (idempotent) unsubscribe. Slow receivers
//! lag and observe `RecvError::Lagged` instead of blocking senders.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tf_core::{BusEvent, LiveEvent, WorkspaceId};
use tokio::sync::broadcast;

/// Buffered events per subscriber before lagging kicks in.
const CHANNEL_CAPACITY: usize = 1024;

/// Handle to every workspace's broadcast channel.
#[derive(Clone, Default)]
pub struct WorkspaceBus {
    channels: Arc<Mutex<HashMap<WorkspaceId, broadcast::Sender<BusEvent>>>>,
}

impl WorkspaceBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, workspace_id: &WorkspaceId) -> broadcast::Sender<BusEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(workspace_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to everything broadcast for a workspace from now on.
    pub fn subscribe(&self, workspace_id: &WorkspaceId) -> broadcast::Receiver<BusEvent> {
        self.sender(workspace_id).subscribe()
    }

    /// Fire-and-forget broadcast. A workspace with no subscribers
    /// swallows the event.
    pub fn broadcast(&self, workspace_id: &WorkspaceId, event: BusEvent) {
        let _ = self.sender(workspace_id).send(event);
    }

    /// Convenience for live events.
    pub fn live(&self, workspace_id: &WorkspaceId, event: LiveEvent) {
        self.broadcast(workspace_id, BusEvent::Live(event));
    }

    /// Number of active subscribers for a workspace.
    pub fn subscriber_count(&self, workspace_id: &WorkspaceId) -> usize {
        self.channels
            .lock()
            .get(workspace_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
