// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow policy and queue control.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use tf_adapters::AgentSdk;
use tf_core::{PolicyOverride, WorkspaceId};
use tf_engine::QueueStatus;

/// GET: the workspace override plus the resolved effective policy.
pub async fn show<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);
    let workspace = state.store.workspace(&ws)?;
    let effective = state.store.effective_policy(&ws, None)?;
    Ok(Json(serde_json::json!({
        "override": workspace.automation,
        "effective": effective,
        "queueEnabled": workspace.queue_enabled,
    })))
}

/// PATCH: merge set fields; an explicit JSON null clears the override
/// for that field (inherit again).
pub async fn patch_policy<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);

    let mut clear = Vec::new();
    let mut patch = PolicyOverride::default();
    if let Some(object) = body.as_object() {
        for (key, value) in object {
            if value.is_null() {
                clear.push(key.clone());
                continue;
            }
            match key.as_str() {
                "readyLimit" => patch.ready_limit = value.as_u64().map(|v| v as u32),
                "executingLimit" => patch.executing_limit = value.as_u64().map(|v| v as u32),
                "backlogToReady" => patch.backlog_to_ready = value.as_bool(),
                "readyToExecuting" => patch.ready_to_executing = value.as_bool(),
                _ => {}
            }
        }
    }

    let workspace = state.store.patch_workspace_policy(&ws, patch, &clear)?;
    let effective = state.store.effective_policy(&ws, None)?;
    Ok(Json(serde_json::json!({
        "override": workspace.automation,
        "effective": effective,
        "queueEnabled": workspace.queue_enabled,
    })))
}

pub async fn queue_start<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    let ws = WorkspaceId::new(ws);
    state.automation.start_queue(&ws).await?;
    Ok(Json(state.automation.status(&ws)?))
}

pub async fn queue_stop<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    let ws = WorkspaceId::new(ws);
    state.automation.stop_queue(&ws).await?;
    Ok(Json(state.automation.status(&ws)?))
}

pub async fn queue_status<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    Ok(Json(state.automation.status(&WorkspaceId::new(ws))?))
}
