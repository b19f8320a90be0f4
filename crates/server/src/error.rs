// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tf_engine::EngineError;

/// Engine errors carried to the HTTP surface.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::WorkspaceNotFound(_) | EngineError::TaskNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::SessionActive(_) => StatusCode::CONFLICT,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
