// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::activity::ActivityService;
use crate::automation::AutomationController;
use crate::bus::WorkspaceBus;
use crate::planning::{PlanningConfig, PlanningPipeline};
use crate::session::{SessionConfig, SessionManager};
use crate::store::{CreateTaskRequest, TaskStore};
use tf_adapters::{FakeSdk, Toolbox};
use tf_core::{Actor, BusEvent, Task, TaskPhase, WorkflowPolicy, WorkspaceId};
use tokio::sync::broadcast;

pub(crate) struct Fixture {
    pub dir: tempfile::TempDir,
    pub ws: WorkspaceId,
    pub bus: WorkspaceBus,
    pub activity: ActivityService,
    pub store: TaskStore,
    pub toolbox: Toolbox,
    pub sdk: FakeSdk,
    pub sessions: SessionManager<FakeSdk>,
    pub automation: AutomationController<FakeSdk>,
    pub planning: PlanningPipeline<FakeSdk>,
}

impl Fixture {
    /// Full engine over a temp workspace with a fake SDK. The
    /// automation kick loop is running.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default(), PlanningConfig::default())
    }

    pub fn with_config(session_config: SessionConfig, planning_config: PlanningConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = WorkspaceBus::new();
        let activity = ActivityService::new(bus.clone());
        let store = TaskStore::new(bus.clone(), WorkflowPolicy::default());

        let ws = WorkspaceId::new("ws-1");
        store
            .create_workspace(ws.clone(), "test", dir.path())
            .expect("create workspace");
        activity.register_workspace(&ws, dir.path());

        let toolbox = Toolbox::new();
        let sdk = FakeSdk::new(toolbox.clone());
        let sessions = SessionManager::new(
            sdk.clone(),
            toolbox.clone(),
            store.clone(),
            activity.clone(),
            session_config,
        );
        let automation =
            AutomationController::new(store.clone(), activity.clone(), sessions.clone())
                .with_retry_backoff(std::time::Duration::from_millis(50));
        let planning = PlanningPipeline::new(sessions.clone(), automation.clone(), planning_config);

        let (kick_tx, kick_rx) = tokio::sync::mpsc::unbounded_channel();
        store.set_kick_channel(kick_tx);
        automation.spawn_kick_loop(kick_rx);

        Self {
            dir,
            ws,
            bus,
            activity,
            store,
            toolbox,
            sdk,
            sessions,
            automation,
            planning,
        }
    }

    pub fn create_task(&self, title: &str, criteria: &[&str]) -> Task {
        self.store
            .create(
                &self.ws,
                CreateTaskRequest {
                    title: title.to_string(),
                    acceptance_criteria: criteria.iter().map(|c| c.to_string()).collect(),
                    ..Default::default()
                },
            )
            .expect("create task")
    }

    pub async fn move_to(&self, task: &Task, phase: TaskPhase) -> Task {
        self.store
            .move_task(&self.ws, &task.id, phase, Actor::User, None)
            .await
            .expect("move task")
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe(&self.ws)
    }
}

/// Drain whatever is currently buffered on a bus receiver.
pub(crate) fn drain(rx: &mut broadcast::Receiver<BusEvent>) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Await a condition, letting the (possibly paused) clock advance far
/// enough to cover every watchdog deadline.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}
