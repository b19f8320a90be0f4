// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill snippet loading.
//!
//! Skills are markdown files under `skills/<id>.md`. Pre-planning and
//! pre-execution skills are rendered into prompts; post-execution skills
//! run as follow-up turns.

use crate::error::StorageError;
use crate::paths;
use std::path::Path;

/// A loaded skill snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub id: String,
    pub content: String,
}

/// Load one skill by id.
pub fn load_skill(root: &Path, skill_id: &str) -> Result<Skill, StorageError> {
    let path = paths::skill(root, skill_id);
    let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound(format!("skill {}", skill_id)),
        _ => StorageError::Io(e),
    })?;
    Ok(Skill {
        id: skill_id.to_string(),
        content,
    })
}

/// Load an ordered list of skills, skipping missing ids with a warning.
pub fn load_skills(root: &Path, ids: &[String]) -> Vec<Skill> {
    let mut skills = Vec::new();
    for id in ids {
        match load_skill(root, id) {
            Ok(skill) => skills.push(skill),
            Err(e) => {
                tracing::warn!(skill_id = %id, error = %e, "skill not loadable, skipping");
            }
        }
    }
    skills
}

/// List skill ids available in the workspace.
pub fn list_skills(root: &Path) -> Result<Vec<String>, StorageError> {
    let dir = paths::skills_dir(root);
    let mut ids = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(StorageError::Io(e)),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(id) = name.strip_suffix(".md") {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Read the workspace shared-context file, if present.
pub fn load_shared_context(root: &Path) -> Result<Option<String>, StorageError> {
    match std::fs::read_to_string(paths::shared_context(root)) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Read a prompt template override, if present.
pub fn load_template_override(root: &Path, name: &str) -> Result<Option<String>, StorageError> {
    match std::fs::read_to_string(paths::template(root, name)) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Write a skill snippet (used by tests and seeding).
pub fn save_skill(root: &Path, skill_id: &str, content: &str) -> Result<(), StorageError> {
    let path = paths::skill(root, skill_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
#[path = "skills_tests.rs"]
mod tests;
