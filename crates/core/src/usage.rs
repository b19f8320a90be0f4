// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token usage accounting.
//!
//! Usage deltas are extracted from SDK assistant messages and rolled up
//! into per-task totals with a per-model breakdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single turn's usage as reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageDelta {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    /// Provider-reported cost, when available.
    #[serde(default)]
    pub cost_usd: f64,
}

impl UsageDelta {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.cache_read_tokens == 0
            && self.cache_creation_tokens == 0
            && self.cost_usd == 0.0
    }
}

/// Cumulative token/cost totals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

impl UsageTotals {
    pub fn absorb(&mut self, delta: &UsageDelta) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.cache_read_tokens += delta.cache_read_tokens;
        self.cache_creation_tokens += delta.cache_creation_tokens;
        self.cost_usd += delta.cost_usd;
    }
}

/// Usage rollup stored on the task record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    #[serde(default)]
    pub totals: UsageTotals,
    /// Breakdown keyed by model id, ordered for stable serialization.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_model: BTreeMap<String, UsageTotals>,
}

impl UsageMetrics {
    /// Fold one turn's usage into the rollup.
    pub fn record(&mut self, model: Option<&str>, delta: &UsageDelta) {
        if delta.is_zero() {
            return;
        }
        self.totals.absorb(delta);
        if let Some(model) = model {
            self.per_model.entry(model.to_string()).or_default().absorb(delta);
        }
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
