// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task CRUD, moves, execution and planning triggers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tf_adapters::AgentSdk;
use tf_core::{Actor, ModelConfig, PolicyOverride, Task, TaskId, TaskPhase, WorkspaceId};
use tf_engine::store::ListScope;
use tf_engine::{CreateTaskRequest, EngineError, TaskPatch};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub pre_planning_skills: Vec<String>,
    #[serde(default)]
    pub pre_execution_skills: Vec<String>,
    #[serde(default)]
    pub post_execution_skills: Vec<String>,
    #[serde(default)]
    pub planning_model: Option<ModelConfig>,
    #[serde(default)]
    pub execution_model: Option<ModelConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<Vec<String>>,
    #[serde(default)]
    pub pre_planning_skills: Option<Vec<String>>,
    #[serde(default)]
    pub pre_execution_skills: Option<Vec<String>>,
    #[serde(default)]
    pub post_execution_skills: Option<Vec<String>>,
    #[serde(default)]
    pub planning_model: Option<ModelConfig>,
    #[serde(default)]
    pub execution_model: Option<ModelConfig>,
    #[serde(default)]
    pub automation: Option<PolicyOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBody {
    pub to_phase: TaskPhase,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBody {
    pub phase: TaskPhase,
    pub task_ids: Vec<TaskId>,
}

pub async fn list<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let scope = match query.scope.as_deref() {
        None | Some("active") => ListScope::Active,
        Some("archived") => ListScope::Archived,
        Some("all") => ListScope::All,
        Some(other) => {
            return Err(EngineError::Validation(format!("unknown scope: {}", other)).into())
        }
    };
    Ok(Json(state.store.list(&WorkspaceId::new(ws), scope)?))
}

pub async fn create<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Json(body): Json<CreateBody>,
) -> Result<Json<Task>, ApiError> {
    let task = state.store.create(
        &WorkspaceId::new(ws),
        CreateTaskRequest {
            title: body.title,
            description: body.description,
            acceptance_criteria: body.acceptance_criteria,
            pre_planning_skills: body.pre_planning_skills,
            pre_execution_skills: body.pre_execution_skills,
            post_execution_skills: body.post_execution_skills,
            planning_model: body.planning_model,
            execution_model: body.execution_model,
        },
    )?;
    Ok(Json(task))
}

pub async fn update<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
    Json(body): Json<PatchBody>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .store
        .update(
            &WorkspaceId::new(ws),
            &TaskId::new(task),
            TaskPatch {
                title: body.title,
                description: body.description,
                acceptance_criteria: body.acceptance_criteria,
                pre_planning_skills: body.pre_planning_skills,
                pre_execution_skills: body.pre_execution_skills,
                post_execution_skills: body.post_execution_skills,
                planning_model: body.planning_model,
                execution_model: body.execution_model,
                automation: body.automation,
            },
        )
        .await?;
    Ok(Json(task))
}

pub async fn remove<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);
    let task = TaskId::new(task);
    // Tear down any live session before the record disappears.
    let _ = state.sessions.stop(&task).await;
    state.store.delete(&ws, &task).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn move_task<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
    Json(body): Json<MoveBody>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .store
        .move_task(
            &WorkspaceId::new(ws),
            &TaskId::new(task),
            body.to_phase,
            Actor::User,
            body.reason,
        )
        .await?;
    Ok(Json(task))
}

pub async fn reorder<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .reorder(&WorkspaceId::new(ws), body.phase, &body.task_ids)
        .await?;
    Ok(Json(serde_json::json!({ "reordered": true })))
}

pub async fn stop<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((_ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stopped = state.sessions.stop(&TaskId::new(task)).await?;
    Ok(Json(serde_json::json!({ "stopped": stopped })))
}

pub async fn execute<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .sessions
        .start_execution(&WorkspaceId::new(ws), &TaskId::new(task), Actor::User, None)
        .await?;
    Ok(Json(serde_json::json!({ "started": true })))
}

/// Kick off planning against the existing conversation (research kept).
pub async fn regenerate_plan<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    spawn_planning(state, ws, task, true)
}

/// Kick off planning from scratch (fresh conversation).
pub async fn regenerate_criteria<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    spawn_planning(state, ws, task, false)
}

fn spawn_planning<S: AgentSdk>(
    state: AppState<S>,
    ws: String,
    task: String,
    resume: bool,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);
    let task_id = TaskId::new(task);
    state.store.require(&ws, &task_id)?;
    if state.sessions.has_running_session(&task_id) {
        return Err(EngineError::SessionActive(task_id).into());
    }

    let planning = state.planning.clone();
    tokio::spawn(async move {
        if let Err(e) = planning.run(&ws, &task_id, resume).await {
            tracing::warn!(task_id = %task_id, error = %e, "planning run failed");
        }
    });
    Ok(Json(serde_json::json!({ "planning": true })))
}

pub async fn summary<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state
        .store
        .load_summary(&WorkspaceId::new(ws), &TaskId::new(task))?;
    Ok(Json(serde_json::json!({ "summary": summary })))
}

/// Re-render the summary from the persisted task record. Useful after
/// criteria edits; the session digest is gone once the session is.
pub async fn generate_summary<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);
    let task_id = TaskId::new(task);
    let task = state.store.require(&ws, &task_id)?;
    let digest = tf_engine::summary::SessionDigest {
        completion_summary: state.store.load_summary(&ws, &task_id)?,
        ..Default::default()
    };
    let rendered = tf_engine::summary::render_summary(&task, &digest);
    state.store.save_summary(&ws, &task_id, &rendered)?;
    Ok(Json(serde_json::json!({ "summary": rendered })))
}
