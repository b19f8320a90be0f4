// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace directory layout helpers.
//!
//! All path construction goes through here so the layout is defined in
//! exactly one place.

use std::path::{Path, PathBuf};

pub fn workspace_config(root: &Path) -> PathBuf {
    root.join("workspace.toml")
}

pub fn activity_log(root: &Path) -> PathBuf {
    root.join("activity.jsonl")
}

pub fn usage_log(root: &Path) -> PathBuf {
    root.join("usage.jsonl")
}

pub fn shared_context(root: &Path) -> PathBuf {
    root.join("shared_context.md")
}

pub fn tasks_dir(root: &Path) -> PathBuf {
    root.join("tasks")
}

pub fn task_dir(root: &Path, task_id: &str) -> PathBuf {
    tasks_dir(root).join(task_id)
}

pub fn task_record(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join("task.yaml")
}

pub fn task_summary(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join("summary.md")
}

pub fn attachments_dir(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join("attachments")
}

pub fn attachment(root: &Path, task_id: &str, stored_name: &str) -> PathBuf {
    attachments_dir(root, task_id).join(stored_name)
}

pub fn leases_dir(root: &Path) -> PathBuf {
    root.join("leases")
}

pub fn lease(root: &Path, task_id: &str) -> PathBuf {
    leases_dir(root).join(task_id)
}

pub fn skills_dir(root: &Path) -> PathBuf {
    root.join("skills")
}

pub fn skill(root: &Path, skill_id: &str) -> PathBuf {
    skills_dir(root).join(format!("{}.md", skill_id))
}

pub fn templates_dir(root: &Path) -> PathBuf {
    root.join("templates")
}

pub fn template(root: &Path, name: &str) -> PathBuf {
    templates_dir(root).join(format!("{}.md", name))
}
