// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Taskforge daemon (tfd)
//!
//! Serves the HTTP + WebSocket surface over the agent session
//! orchestrator. Exit codes: 0 on clean shutdown, non-zero on fatal
//! init (bad config, unbindable address); runtime errors surface via
//! HTTP statuses.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tf_adapters::{ProcessSdk, ProcessSdkConfig};
use tf_engine::{PlanningConfig, SessionConfig};
use tf_server::AppState;
use tracing::info;

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (tfd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "tfd", about = "Taskforge orchestration server", version)]
struct Args {
    /// Directory holding workspaces.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1:4400")]
    bind: SocketAddr,

    /// Agent CLI binary driven by the SDK adapter.
    #[arg(long, default_value = "claude")]
    agent_command: String,

    /// Extra arguments appended to every agent invocation.
    #[arg(long)]
    agent_arg: Vec<String>,

    /// Log to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_file.as_deref())?;
    info!(data_dir = %args.data_dir.display(), "starting tfd");

    let sdk_config = ProcessSdkConfig {
        command: args.agent_command.clone(),
        extra_args: args.agent_arg.clone(),
        ..Default::default()
    };
    let state = AppState::build(
        &args.data_dir,
        move |toolbox| ProcessSdk::new(sdk_config, toolbox),
        SessionConfig::default(),
        PlanningConfig::default(),
    )
    .context("failed to initialize orchestrator")?;

    let router = tf_server::router(state);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "tfd ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("tfd stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        result = tokio::signal::ctrl_c() => {
            if result.is_ok() {
                info!("received SIGINT, shutting down");
            }
        }
    }
}

/// Rotate an oversized log file: `.3` is deleted, `.2`→`.3`, `.1`→`.2`,
/// current → `.1`. Best-effort; the server still starts if it fails.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            rotate_log_if_needed(path);
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(parent)?;
            let file_name = path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(parent, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
