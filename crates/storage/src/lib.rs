// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tf-storage: On-disk state for Taskforge workspaces.
//!
//! Layout per workspace directory:
//!
//! ```text
//! <workspace>/
//!   workspace.toml          - workspace record (policy, id high-water mark)
//!   activity.jsonl          - append-only activity timeline
//!   usage.jsonl             - append-only per-turn usage ledger
//!   shared_context.md       - optional context injected into prompts
//!   skills/<id>.md          - skill snippets
//!   templates/<name>.md     - prompt template overrides
//!   leases/<task_id>        - execution lease heartbeat files
//!   tasks/<task_id>/
//!     task.yaml             - task record
//!     summary.md            - post-execution summary
//!     attachments/<stored>  - attachment bytes by stored name
//! ```
//!
//! Formats are semantic, not bit-stable: records re-serialize cleanly
//! across versions via serde defaults.

pub mod activity_log;
pub mod attachments;
pub mod error;
pub mod lease;
pub mod paths;
pub mod skills;
pub mod tasks;
pub mod usage_log;
pub mod workspace_config;

pub use activity_log::ActivityLog;
pub use attachments::AttachmentStore;
pub use error::StorageError;
pub use lease::LeaseFile;
pub use tasks::TaskDir;
pub use usage_log::{UsageLog, UsageRecord};
pub use workspace_config::WorkspaceConfig;

use std::fs;
use std::io::Write;
use std::path::Path;

/// Write a file atomically: temp file in the same directory, flush,
/// then rename over the target. Readers never observe a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent directory"))?;
    fs::create_dir_all(parent)?;

    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "write".to_string())
    ));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
