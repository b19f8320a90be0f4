// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity timeline reads and user message posting.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tf_adapters::AgentSdk;
use tf_core::{ActivityEntry, ChatRole, TaskId, WorkspaceId};

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageBody {
    pub task_id: TaskId,
    pub content: String,
    pub role: ChatRole,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

pub async fn timeline<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(state.activity.timeline(&WorkspaceId::new(ws), limit)?))
}

pub async fn task_timeline<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(state.activity.task_timeline(
        &WorkspaceId::new(ws),
        &TaskId::new(task),
        limit,
    )?))
}

/// Post a message. User messages route into the task's conversation
/// (steer, follow-up, resume or fresh chat); agent-role messages are
/// persisted verbatim.
pub async fn post_message<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path(ws): Path<String>,
    Json(body): Json<PostMessageBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ws = WorkspaceId::new(ws);
    match body.role {
        ChatRole::User => {
            state
                .sessions
                .post_user_message(&ws, &body.task_id, &body.content, body.attachment_ids)
                .await?;
        }
        ChatRole::Agent | ChatRole::System => {
            state.activity.chat_message(
                &ws,
                Some(body.task_id.clone()),
                body.role,
                body.content,
                body.attachment_ids,
                None,
            )?;
        }
    }
    Ok(Json(serde_json::json!({ "posted": true })))
}
