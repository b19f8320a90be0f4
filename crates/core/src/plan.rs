// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan produced by the planning pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An implementation plan persisted by the `save_plan` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub validation: Vec<String>,
    #[serde(default)]
    pub cleanup: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            validation: Vec::new(),
            cleanup: Vec::new(),
            generated_at,
        }
    }
}
