// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment upload (multipart) and download by stored name.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tf_adapters::AgentSdk;
use tf_core::{AttachmentMeta, TaskId, WorkspaceId};
use tf_engine::EngineError;

pub async fn upload<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<Vec<AttachmentMeta>>, ApiError> {
    let ws = WorkspaceId::new(ws);
    let task = TaskId::new(task);
    state.store.require(&ws, &task)?;

    let mut stored = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| EngineError::Validation(format!("malformed multipart body: {}", e)))?
    {
        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| EngineError::Validation(format!("failed to read upload: {}", e)))?;

        let meta = state
            .store
            .add_attachment(&ws, &task, &filename, &mime_type, &bytes)
            .await?;
        stored.push(meta);
    }

    if stored.is_empty() {
        return Err(EngineError::Validation("no files in upload".into()).into());
    }
    Ok(Json(stored))
}

pub async fn download<S: AgentSdk>(
    State(state): State<AppState<S>>,
    Path((ws, task, stored)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let ws = WorkspaceId::new(ws);
    let task = TaskId::new(task);
    let path = state.store.attachment_path(&ws, &task, &stored)?;

    let record = state.store.require(&ws, &task)?;
    let mime_type = record
        .attachments
        .iter()
        .find(|a| a.stored_name == stored)
        .map(|a| a.mime_type.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| EngineError::Storage(tf_storage::StorageError::Io(e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", stored),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}
