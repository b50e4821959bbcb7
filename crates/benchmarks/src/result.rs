// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark record types.
//!
//! A [`BenchmarkRecord`] is one row of output: the scenario, what the model
//! returned, how the jury judged it, and when. Failures never become
//! records; they are kept as [`UnprocessedRecord`]s for inspection.

use chrono::{DateTime, Utc};
use llm_jurybench_core::judge::{AggregatedVerdict, JudgeVerdict, Judgment};
use llm_jurybench_core::{InvocationResult, Scenario, STATUS_SUCCESS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Jury outcome attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Majority judgment was PASS
    pub judge_success: bool,
    /// Majority explanations joined by `;`
    pub judge_explanation: String,
    /// Every judge's verdict
    pub judge_details: Vec<JudgeVerdict>,
    /// `AVG_<metric>` scores
    pub judge_scores: BTreeMap<String, f64>,
}

impl From<&AggregatedVerdict> for PerformanceMetrics {
    fn from(verdict: &AggregatedVerdict) -> Self {
        Self {
            judge_success: verdict.majority_judgment == Judgment::Pass,
            judge_explanation: verdict.joined_explanation(),
            judge_details: verdict.judge_details.clone(),
            judge_scores: verdict.majority_score.clone(),
        }
    }
}

/// One invocation of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Scenario that was run
    #[serde(flatten)]
    pub scenario: Scenario,
    /// Provider outcome
    #[serde(flatten)]
    pub result: InvocationResult,
    /// Jury outcome
    pub performance_metrics: PerformanceMetrics,
    /// Total judge cost in USD
    pub evaluation_cost: f64,
    /// `Success`, the jury error status, or `"<code> <message>"`
    pub api_call_status: String,
    /// Provider error code, when the call failed
    pub error_code: Option<String>,
    /// When the invocation started
    pub job_timestamp_iso: String,
    /// One-based invocation index within the scenario
    pub invocation: u32,
    /// One-based run index
    pub run_count: u32,
    /// When the run's records were stamped
    pub timestamp: DateTime<Utc>,
}

impl BenchmarkRecord {
    /// Create a successful record without a jury outcome yet.
    pub fn new(
        scenario: Scenario,
        result: InvocationResult,
        invocation: u32,
        run_count: u32,
        job_timestamp_iso: impl Into<String>,
    ) -> Self {
        Self {
            scenario,
            result,
            performance_metrics: PerformanceMetrics::default(),
            evaluation_cost: 0.0,
            api_call_status: STATUS_SUCCESS.to_string(),
            error_code: None,
            job_timestamp_iso: job_timestamp_iso.into(),
            invocation,
            run_count,
            timestamp: Utc::now(),
        }
    }

    /// Attach the jury outcome.
    pub fn with_verdict(mut self, verdict: &AggregatedVerdict) -> Self {
        self.performance_metrics = PerformanceMetrics::from(verdict);
        self.evaluation_cost = verdict.total_evaluation_cost;
        self
    }

    /// Mark the record as failed.
    pub fn with_status(mut self, status: impl Into<String>, error_code: Option<String>) -> Self {
        self.api_call_status = status.into();
        self.error_code = error_code;
        self
    }

    /// Whether the invocation completed end to end.
    pub fn is_success(&self) -> bool {
        self.api_call_status == STATUS_SUCCESS && self.error_code.is_none()
    }

    /// Response cost plus evaluation cost.
    pub fn total_cost(&self) -> f64 {
        self.result.response_cost.unwrap_or(0.0) + self.evaluation_cost
    }
}

/// What is known about a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDetail {
    /// The partially filled record of the failed invocation
    Result(Box<BenchmarkRecord>),
    /// Message of an unexpected failure
    Exception(String),
}

/// A failure routed to the unprocessed sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnprocessedRecord {
    /// Scenario, when the failure can be tied to one
    pub scenario: Option<Scenario>,
    /// Failed record or exception message
    #[serde(flatten)]
    pub detail: FailureDetail,
    /// Short reason
    pub reason: String,
    /// When the failure was recorded
    pub timestamp: String,
}

impl UnprocessedRecord {
    /// Failure carrying the failed record.
    pub fn from_record(record: BenchmarkRecord, reason: impl Into<String>) -> Self {
        Self {
            scenario: Some(record.scenario.clone()),
            detail: FailureDetail::Result(Box::new(record)),
            reason: reason.into(),
            timestamp: llm_jurybench_core::timestamp_iso(),
        }
    }

    /// Failure carrying an exception message.
    pub fn exception(
        scenario: Option<Scenario>,
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            scenario,
            detail: FailureDetail::Exception(message.into()),
            reason: reason.into(),
            timestamp: llm_jurybench_core::timestamp_iso(),
        }
    }
}
