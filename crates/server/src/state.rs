// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App state: the wired orchestrator components.

use std::path::{Path, PathBuf};
use tf_adapters::{AgentSdk, Toolbox};
use tf_core::WorkflowPolicy;
use tf_engine::{
    ActivityService, AutomationController, PlanningConfig, PlanningPipeline, SessionConfig,
    SessionManager, TaskStore, WorkspaceBus,
};
use tf_storage::workspace_config::discover_workspaces;

/// Shared handler state. Cloning is cheap; every component is a handle.
pub struct AppState<S: AgentSdk> {
    pub data_dir: PathBuf,
    pub bus: WorkspaceBus,
    pub activity: ActivityService,
    pub store: TaskStore,
    pub toolbox: Toolbox,
    pub sessions: SessionManager<S>,
    pub automation: AutomationController<S>,
    pub planning: PlanningPipeline<S>,
}

impl<S: AgentSdk> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            data_dir: self.data_dir.clone(),
            bus: self.bus.clone(),
            activity: self.activity.clone(),
            store: self.store.clone(),
            toolbox: self.toolbox.clone(),
            sessions: self.sessions.clone(),
            automation: self.automation.clone(),
            planning: self.planning.clone(),
        }
    }
}

impl<S: AgentSdk> AppState<S> {
    /// Wire the orchestrator. `make_sdk` receives the toolbox handle the
    /// SDK needs for its tool callbacks. Existing workspaces under the
    /// data dir are opened, their activity logs registered, and stale
    /// execution leases recovered.
    pub fn build(
        data_dir: &Path,
        make_sdk: impl FnOnce(Toolbox) -> S,
        session_config: SessionConfig,
        planning_config: PlanningConfig,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let bus = WorkspaceBus::new();
        let activity = ActivityService::new(bus.clone());
        let store = TaskStore::new(bus.clone(), WorkflowPolicy::default());
        let toolbox = Toolbox::new();
        let sdk = make_sdk(toolbox.clone());
        let sessions = SessionManager::new(
            sdk,
            toolbox.clone(),
            store.clone(),
            activity.clone(),
            session_config,
        );
        let automation =
            AutomationController::new(store.clone(), activity.clone(), sessions.clone());
        let planning = PlanningPipeline::new(sessions.clone(), automation.clone(), planning_config);

        let (kick_tx, kick_rx) = tokio::sync::mpsc::unbounded_channel();
        store.set_kick_channel(kick_tx);
        automation.spawn_kick_loop(kick_rx);

        for root in discover_workspaces(data_dir)? {
            let workspace = store.open_workspace(&root)?;
            activity.register_workspace(&workspace.id, &root);
            let sessions = sessions.clone();
            let workspace_id = workspace.id.clone();
            tokio::spawn(async move {
                if let Err(e) = sessions.recover_stale_leases(&workspace_id).await {
                    tracing::warn!(workspace_id = %workspace_id, error = %e, "lease recovery failed");
                }
            });
            tracing::info!(workspace_id = %workspace.id, path = %root.display(), "workspace opened");
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            bus,
            activity,
            store,
            toolbox,
            sessions,
            automation,
            planning,
        })
    }
}
