// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Score block extraction from free-form judge output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

static SCORES_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\{\s*"scores"\s*:\s*\{[^{}]*?\}\s*\}"#).unwrap());

/// Scores below this fail the metric.
pub const PASS_THRESHOLD: i64 = 3;

/// Marker value written in place of scores for failed verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullMarker {
    /// `"NULL"`
    #[serde(rename = "NULL")]
    Null,
}

/// Per-metric scores of one verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JudgeScores {
    /// Sentinel `{"score": "NULL"}` for verdicts without usable scores
    Null {
        /// Always `"NULL"`
        score: NullMarker,
    },
    /// Metric name to integer score
    Metrics(BTreeMap<String, i64>),
}

impl JudgeScores {
    /// The NULL sentinel.
    pub fn null() -> Self {
        Self::Null {
            score: NullMarker::Null,
        }
    }

    /// Numeric scores, if any.
    pub fn metrics(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            Self::Metrics(m) => Some(m),
            Self::Null { .. } => None,
        }
    }
}

fn as_score(value: &serde_json::Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 1e15)
            .map(|f| f as i64)
    })
}

/// Find the first `{"scores": {...}}` block in `text` and keep every
/// integer score, in range or not, so that a score below
/// [`PASS_THRESHOLD`] always fails its metric. Returns `None` when no block
/// is found, it is not valid JSON, or no value is an integer.
pub fn extract_scores(text: &str) -> Option<BTreeMap<String, i64>> {
    let block = SCORES_BLOCK.find(text)?;
    let parsed: serde_json::Value = match serde_json::from_str(block.as_str()) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "score block is not valid JSON");
            return None;
        }
    };

    let scores: BTreeMap<String, i64> = parsed
        .get("scores")?
        .as_object()?
        .iter()
        .filter_map(|(metric, value)| as_score(value).map(|s| (metric.clone(), s)))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores)
    }
}

/// Names of metrics scored below [`PASS_THRESHOLD`].
pub fn failing_metrics(scores: &BTreeMap<String, i64>) -> Vec<&str> {
    scores
        .iter()
        .filter(|(_, s)| **s < PASS_THRESHOLD)
        .map(|(m, _)| m.as_str())
        .collect()
}
