// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scenario data model and JSONL profile loading.
//!
//! Three JSONL inputs drive a benchmark:
//!
//! - scenario specs (`text_prompt`, `task`, `golden_answer`, ...)
//! - model profiles (which models to call and what they cost)
//! - judge profiles (which models grade the responses)
//!
//! Specs and model profiles are cross-joined into [`Scenario`]s. A scenario
//! is immutable once built and already carries its resolved
//! [`ProviderKind`].

use crate::provider::{InferenceConfig, ProviderKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading JSONL inputs.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be opened or read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A line was not a valid record
    #[error("invalid record at {path}:{line}: {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// One-based line number
        line: usize,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for loading operations.
pub type Result<T> = std::result::Result<T, LoadError>;

fn default_output_tokens() -> u32 {
    200
}

fn default_region() -> String {
    "us-east-2".to_string()
}

fn default_latency_profile() -> String {
    "standard".to_string()
}

/// Task description attached to a scenario spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Short task category, e.g. "Summarization"
    pub task_type: String,
    /// Free-form grading criteria handed to the judges
    pub task_criteria: String,
}

/// One line of the scenario input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Prompt sent to every model
    #[serde(default)]
    pub text_prompt: String,
    /// Task metadata
    pub task: TaskSpec,
    /// Reference answer for the judges
    #[serde(default)]
    pub golden_answer: String,
    /// Output token budget for the request
    #[serde(default = "default_output_tokens")]
    pub expected_output_tokens: u32,
    /// Region used when the model profile does not name one
    #[serde(default = "default_region")]
    pub region: String,
}

/// One line of the model profile file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model identifier; `vendor/model` ids are routed to third-party vendors
    pub model_id: String,
    /// Region override for every scenario using this model
    #[serde(default)]
    pub region: Option<String>,
    /// Latency profile passed as `performanceConfig.latency`
    #[serde(default = "default_latency_profile")]
    pub inference_profile: String,
    /// USD per 1000 input tokens
    pub input_token_cost: f64,
    /// USD per 1000 output tokens
    pub output_token_cost: f64,
}

/// One line of the judge profile file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeProfile {
    /// Judge model identifier
    pub model_id: String,
    /// Region the judge is called in
    #[serde(default = "default_region")]
    pub region: String,
    /// USD per 1000 input tokens
    pub input_cost_per_1k: f64,
    /// USD per 1000 output tokens
    pub output_cost_per_1k: f64,
}

/// A fully resolved unit of work: one prompt against one model at one
/// temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Prompt text
    pub prompt: String,
    /// Region the model is called in
    pub region: String,
    /// Task category
    #[serde(rename = "task_types")]
    pub task_type: String,
    /// Grading criteria
    pub task_criteria: String,
    /// Reference answer
    pub golden_answer: String,
    /// Target model
    pub model_id: String,
    /// Latency profile
    pub inference_profile: String,
    /// USD per 1000 input tokens
    #[serde(rename = "input_token_cost")]
    pub input_cost_per_1k: f64,
    /// USD per 1000 output tokens
    #[serde(rename = "output_token_cost")]
    pub output_cost_per_1k: f64,
    /// Output token budget
    #[serde(rename = "configured_output_tokens_for_request")]
    pub max_output_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling cutoff
    pub top_p: f64,
    /// Backend serving this scenario
    pub provider: ProviderKind,
}

impl Scenario {
    /// Build a scenario from a spec and a model profile.
    ///
    /// The model profile's region wins over the spec's region.
    pub fn from_parts(
        spec: &ScenarioSpec,
        model: &ModelProfile,
        temperature: f64,
        top_p: f64,
    ) -> Self {
        Self {
            prompt: spec.text_prompt.clone(),
            region: model.region.clone().unwrap_or_else(|| spec.region.clone()),
            task_type: spec.task.task_type.clone(),
            task_criteria: spec.task.task_criteria.clone(),
            golden_answer: spec.golden_answer.clone(),
            model_id: model.model_id.clone(),
            inference_profile: model.inference_profile.clone(),
            input_cost_per_1k: model.input_token_cost,
            output_cost_per_1k: model.output_token_cost,
            max_output_tokens: spec.expected_output_tokens,
            temperature,
            top_p,
            provider: ProviderKind::resolve(&model.model_id),
        }
    }

    /// Inference parameters for this scenario.
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    /// Return a copy of this scenario at another temperature.
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }
}

/// Cross-join every model profile with every scenario spec.
///
/// Output is grouped by model, in input order.
pub fn cross_join(
    specs: &[ScenarioSpec],
    models: &[ModelProfile],
    temperature: f64,
    top_p: f64,
) -> Vec<Scenario> {
    models
        .iter()
        .flat_map(|model| {
            specs
                .iter()
                .map(move |spec| Scenario::from_parts(spec, model, temperature, top_p))
        })
        .collect()
}

/// Read one JSON record per non-blank line.
pub fn load_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}
