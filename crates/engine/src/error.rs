// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use tf_adapters::SdkError;
use tf_core::{MoveBlocked, TaskId, WorkspaceId};
use tf_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Phase transition rejected by the state machine.
    #[error(transparent)]
    Move(#[from] MoveBlocked),

    #[error("{0}")]
    Validation(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("a session is already running for task {0}")]
    SessionActive(TaskId),

    #[error("no active session for task {0}")]
    NoSession(TaskId),

    #[error("task {0} has no session file to resume")]
    NoSessionFile(TaskId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("planning failed: {0}")]
    Planning(String),
}

impl EngineError {
    /// True for caller errors (4xx at the HTTP surface).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Move(_)
                | EngineError::Validation(_)
                | EngineError::WorkspaceNotFound(_)
                | EngineError::TaskNotFound(_)
                | EngineError::SessionActive(_)
                | EngineError::NoSession(_)
                | EngineError::NoSessionFile(_)
        )
    }
}
