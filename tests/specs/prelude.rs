// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the spec suite.

use std::sync::Arc;
use tf_adapters::{FakeSdk, Toolbox};
use tf_core::{Actor, BusEvent, PolicyOverride, Task, TaskPhase, WorkflowPolicy, WorkspaceId};
use tf_engine::{
    ActivityService, AutomationController, CreateTaskRequest, PlanningConfig, PlanningPipeline,
    SessionConfig, SessionManager, TaskStore, WorkspaceBus,
};
use tokio::sync::broadcast;

pub struct Harness {
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

impl Harness {
    pub fn new() -> Self {
        Self::with_planning(PlanningConfig::default())
    }

    pub fn with_planning(planning_config: PlanningConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = WorkspaceBus::new();
        let activity = ActivityService::new(bus.clone());
        let store = TaskStore::new(bus.clone(), WorkflowPolicy::default());

        let ws = WorkspaceId::new("specs");
        store
            .create_workspace(ws.clone(), "specs", dir.path())
            .expect("create workspace");
        activity.register_workspace(&ws, dir.path());

        let toolbox = Toolbox::new();
        let sdk = FakeSdk::new(toolbox.clone());
        let sessions = SessionManager::new(
            sdk.clone(),
            toolbox.clone(),
            store.clone(),
            activity.clone(),
            SessionConfig::default(),
        );
        let automation =
            AutomationController::new(store.clone(), activity.clone(), sessions.clone());
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

    pub async fn ready_task(&self, title: &str, criteria: &[&str]) -> Task {
        let task = self.create_task(title, criteria);
        self.store
            .move_task(&self.ws, &task.id, TaskPhase::Ready, Actor::User, None)
            .await
            .expect("move to ready")
    }

    pub fn enable_queue_policy(&self, executing_limit: u32) {
        self.store
            .patch_workspace_policy(
                &self.ws,
                PolicyOverride {
                    ready_to_executing: Some(true),
                    executing_limit: Some(executing_limit),
                    ..Default::default()
                },
                &[],
            )
            .expect("patch policy");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe(&self.ws)
    }

    pub fn phase_of(&self, task: &Task) -> TaskPhase {
        self.store
            .require(&self.ws, &task.id)
            .expect("task exists")
            .phase
    }
}

/// A completion probe usable as an `on_complete` hook.
pub type Completion = Arc<parking_lot::Mutex<Option<(bool, Option<String>)>>>;

pub fn completion_probe() -> (Completion, tf_engine::session::CompletionHook) {
    let seen: Completion = Arc::new(parking_lot::Mutex::new(None));
    let probe = Arc::clone(&seen);
    let hook: tf_engine::session::CompletionHook = Box::new(move |success, error| {
        *probe.lock() = Some((success, error));
    });
    (seen, hook)
}

/// Await a condition, letting the paused clock advance past every
/// watchdog deadline.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}

/// Drain whatever is buffered on a bus receiver.
pub fn drain(rx: &mut broadcast::Receiver<BusEvent>) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_system_events(events: &[BusEvent], name: &str) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                BusEvent::Activity { activity } if matches!(
                    &activity.kind,
                    tf_core::ActivityKind::SystemEvent { event, .. } if event == name
                )
            )
        })
        .count()
}
