// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types and algorithms for LLM Jury Bench.
//!
//! This crate holds everything the benchmark engine needs that does not
//! touch the network directly:
//!
//! - [`scenario`] - scenario, model and judge profiles plus JSONL loading
//! - [`config`] - the immutable, validated [`BenchConfig`]
//! - [`expand`] - temperature sweep expansion
//! - [`provider`] - the provider capability traits and invocation results
//! - [`retry`] - exponential backoff with jitter around provider calls
//! - [`cost`] - per-1000-token cost math
//! - [`judge`] - the multi-judge panel and majority vote
//!
//! # Quick Start
//!
//! ```no_run
//! use llm_jurybench_core::{expand::expand_scenarios, BenchConfig};
//!
//! let config = BenchConfig::builder().temperature_variations(2).build()?;
//! let scenarios = expand_scenarios(&[], config.temperature_variations());
//! assert!(scenarios.is_empty());
//! # Ok::<(), llm_jurybench_core::config::ConfigError>(())
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod cost;
pub mod expand;
pub mod judge;
pub mod provider;
pub mod retry;
pub mod scenario;

pub use config::BenchConfig;
pub use judge::{AggregatedVerdict, JudgeClient, JudgePanel, JudgeVerdict, Judgment};
pub use provider::{
    InferenceConfig, InferenceProvider, InvocationResult, ProviderError, ProviderKind,
    ThirdPartyVendor,
};
pub use retry::RetryPolicy;
pub use scenario::{JudgeProfile, ModelProfile, Scenario, ScenarioSpec};

/// Status string recorded for an invocation that completed end to end.
pub const STATUS_SUCCESS: &str = "Success";

/// Status string recorded when no judge produced a usable verdict.
pub const STATUS_JURY_ERROR: &str = "LLM-AS-A-JURY EVALUATION ERROR";

/// Current UTC time formatted the way every record timestamp is written.
pub fn timestamp_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
