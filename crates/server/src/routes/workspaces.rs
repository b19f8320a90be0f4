// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace CRUD.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tf_adapters::AgentSdk;
use tf_core::{Workspace, WorkspaceId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub name: String,
    /// Filesystem root; defaults to `<data_dir>/<id>`.
    #[serde(default)]
    pub path: Option<std::path::PathBuf>,
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub async fn list<S: AgentSdk>(State(state): State<AppState<S>>) -> Json<Vec<Workspace>> {
    let mut workspaces = state.store.workspaces();
    workspaces.sort_by(|a, b| a.id.cmp(&b.id));
    Json(workspaces)
}

pub async fn create<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Json(request): Json<CreateWorkspaceRequest>,
) -> Result<Json<Workspace>, ApiError> {
    let slug = slugify(&request.name);
    if slug.is_empty() {
        return Err(tf_engine::EngineError::Validation("workspace name is required".into()).into());
    }
    let id = WorkspaceId::new(slug.clone());
    let root = request.path.unwrap_or_else(|| state.data_dir.join(&slug));

    let workspace = state.store.create_workspace(id.clone(), &request.name, &root)?;
    state.activity.register_workspace(&id, &root);
    Ok(Json(workspace))
}

pub async fn show<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<Workspace>, ApiError> {
    Ok(Json(state.store.workspace(&WorkspaceId::new(ws))?))
}

/// Close a workspace. Task files stay on disk; the workspace just
/// stops being served.
pub async fn remove<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = WorkspaceId::new(ws);
    state.store.workspace(&id)?;
    state.store.close_workspace(&id);
    state.activity.unregister_workspace(&id);
    Ok(Json(serde_json::json!({ "removed": true })))
}
