// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tf-server: HTTP + WebSocket surface over the orchestrator.
//!
//! The server is a thin adapter: request handlers translate between the
//! wire contract and engine operations and never carry behavior of
//! their own. Live updates fan out over a WebSocket bridge per
//! workspace subscription.

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, patch, post};
use axum::Router;
use tf_adapters::AgentSdk;
use tower_http::trace::TraceLayer;

/// Build the full router over an app state.
pub fn router<S: AgentSdk>(state: AppState<S>) -> Router {
    Router::new()
        .route(
            "/workspaces",
            get(routes::workspaces::list).post(routes::workspaces::create),
        )
        .route(
            "/workspaces/:ws",
            get(routes::workspaces::show).delete(routes::workspaces::remove),
        )
        .route(
            "/workspaces/:ws/tasks",
            get(routes::tasks::list).post(routes::tasks::create),
        )
        .route(
            "/workspaces/:ws/tasks/reorder",
            post(routes::tasks::reorder),
        )
        .route(
            "/workspaces/:ws/tasks/:task",
            patch(routes::tasks::update).delete(routes::tasks::remove),
        )
        .route("/workspaces/:ws/tasks/:task/move", post(routes::tasks::move_task))
        .route("/workspaces/:ws/tasks/:task/stop", post(routes::tasks::stop))
        .route(
            "/workspaces/:ws/tasks/:task/execute",
            post(routes::tasks::execute),
        )
        .route(
            "/workspaces/:ws/tasks/:task/plan/regenerate",
            post(routes::tasks::regenerate_plan),
        )
        .route(
            "/workspaces/:ws/tasks/:task/acceptance-criteria/regenerate",
            post(routes::tasks::regenerate_criteria),
        )
        .route(
            "/workspaces/:ws/tasks/:task/summary",
            get(routes::tasks::summary),
        )
        .route(
            "/workspaces/:ws/tasks/:task/summary/generate",
            post(routes::tasks::generate_summary),
        )
        .route(
            "/workspaces/:ws/tasks/:task/activity",
            get(routes::activity::task_timeline),
        )
        .route(
            "/workspaces/:ws/activity",
            get(routes::activity::timeline).post(routes::activity::post_message),
        )
        .route(
            "/workspaces/:ws/automation",
            get(routes::automation::show).patch(routes::automation::patch_policy),
        )
        .route(
            "/workspaces/:ws/queue/start",
            post(routes::automation::queue_start),
        )
        .route(
            "/workspaces/:ws/queue/stop",
            post(routes::automation::queue_stop),
        )
        .route(
            "/workspaces/:ws/queue/status",
            post(routes::automation::queue_status),
        )
        .route(
            "/workspaces/:ws/tasks/:task/attachments",
            post(routes::attachments::upload),
        )
        .route(
            "/workspaces/:ws/tasks/:task/attachments/:stored",
            get(routes::attachments::download),
        )
        .route("/ws", get(ws::ws_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
