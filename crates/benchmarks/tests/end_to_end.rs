// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Full benchmark runs against in-process providers and judges.

use async_trait::async_trait;
use llm_jurybench_benchmarks::io::{count_unprocessed_files, read_records_jsonl, read_unprocessed};
use llm_jurybench_benchmarks::{
    BenchError, DispatchEngine, FailureDetail, FileRunSink, RunOrchestrator,
};
use llm_jurybench_core::judge::{JudgeClient, JudgeReply};
use llm_jurybench_core::provider::{ProviderSet, Result as ProviderResult};
use llm_jurybench_core::scenario::{cross_join, TaskSpec};
use llm_jurybench_core::{
    BenchConfig, InferenceConfig, InferenceProvider, InvocationResult, JudgePanel, JudgeProfile,
    ModelProfile, ProviderError, RetryPolicy, Scenario, ScenarioSpec, STATUS_SUCCESS,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers every prompt, except for `rejected-model` which always fails
/// with a non-retryable error.
#[derive(Default)]
struct ScriptedProvider {
    calls: AtomicU32,
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn invoke(&self, scenario: &Scenario) -> ProviderResult<InvocationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if scenario.model_id == "rejected-model" {
            return Err(ProviderError::from_code(
                "ValidationException",
                "model does not support this request",
            ));
        }
        Ok(InvocationResult {
            time_to_first_byte: Some(0.2),
            time_to_last_byte: Some(1.0),
            throughput_tokens_per_sec: InvocationResult::throughput(Some(40), Some(1.0)),
            input_tokens: Some(10),
            output_tokens: Some(40),
            response_cost: Some(0.05),
            response_text: "Paris".to_string(),
            provider_request_count: 1,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// First judge gives high marks, second fails Format.
struct SplitJury;

#[async_trait]
impl JudgeClient for SplitJury {
    async fn complete(
        &self,
        judge: &JudgeProfile,
        _prompt: &str,
        _config: &InferenceConfig,
    ) -> ProviderResult<JudgeReply> {
        let text = if judge.model_id == "judge-a" {
            r#"Looks good. {"scores": {"Correctness": 5, "Format": 4}}"#
        } else {
            r#"{"scores": {"Correctness": 4, "Format": 2}}"#
        };
        Ok(JudgeReply {
            text: text.to_string(),
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}

fn spec() -> ScenarioSpec {
    ScenarioSpec {
        text_prompt: "What is the capital of France?".to_string(),
        task: TaskSpec {
            task_type: "QA".to_string(),
            task_criteria: "Answer with the city name".to_string(),
        },
        golden_answer: "Paris".to_string(),
        expected_output_tokens: 50,
        region: "us-east-2".to_string(),
    }
}

fn model(id: &str) -> ModelProfile {
    ModelProfile {
        model_id: id.to_string(),
        region: Some("us-west-2".to_string()),
        inference_profile: "standard".to_string(),
        input_token_cost: 1.0,
        output_token_cost: 1.0,
    }
}

fn judges(ids: &[&str]) -> Vec<JudgeProfile> {
    ids.iter()
        .map(|id| JudgeProfile {
            model_id: id.to_string(),
            region: "us-east-1".to_string(),
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 1.0,
        })
        .collect()
}

fn engine(provider: Arc<ScriptedProvider>, jury: &[&str], config: BenchConfig) -> DispatchEngine {
    let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2), false);
    DispatchEngine::new(
        ProviderSet::new(provider.clone(), provider),
        JudgePanel::new(Arc::new(SplitJury), retry),
        judges(jury),
        Arc::new(config),
    )
}

fn single_pass_config() -> BenchConfig {
    BenchConfig::builder()
        .parallel_calls(2)
        .invocations_per_scenario(1)
        .sleep_between_invocations(Duration::ZERO)
        .experiment_counts(1)
        .temperature_variations(0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_single_scenario_two_judges() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileRunSink::new(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::default());
    let scenarios = cross_join(&[spec()], &[model("amazon.nova-pro-v1")], 0.7, 1.0);

    let orchestrator = RunOrchestrator::new(
        engine(provider.clone(), &["judge-a", "judge-b"], single_pass_config()),
        sink.clone(),
    );
    let outcome = orchestrator.run(&scenarios).await.unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.unprocessed, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let record = &outcome.records[0];
    assert_eq!(record.api_call_status, STATUS_SUCCESS);
    assert_eq!(record.scenario.region, "us-west-2");
    assert_eq!(record.run_count, 1);
    assert_eq!(record.invocation, 1);
    assert_eq!(record.result.throughput_tokens_per_sec, Some(40.0));

    // one PASS, one FAIL: ties go to FAIL
    let metrics = &record.performance_metrics;
    assert!(!metrics.judge_success);
    assert_eq!(metrics.judge_explanation, "Format");
    assert_eq!(metrics.judge_details.len(), 2);
    assert_eq!(metrics.judge_scores["AVG_Correctness"], 4.5);
    assert_eq!(metrics.judge_scores["AVG_Format"], 3.0);

    // 150 tokens at $1/1k per judge
    assert!((record.evaluation_cost - 0.3).abs() < 1e-9);
    assert!((record.total_cost() - 0.35).abs() < 1e-9);

    let written = read_records_jsonl(sink.records_path(1)).unwrap();
    assert_eq!(written, outcome.records);
    assert_eq!(count_unprocessed_files(sink.unprocessed_dir()).unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_model_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileRunSink::new(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::default());
    let scenarios = cross_join(
        &[spec()],
        &[model("amazon.nova-pro-v1"), model("rejected-model")],
        0.7,
        1.0,
    );

    let orchestrator = RunOrchestrator::new(
        engine(provider.clone(), &["judge-a"], single_pass_config()),
        sink.clone(),
    );
    let outcome = orchestrator.run(&scenarios).await.unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].scenario.model_id, "amazon.nova-pro-v1");
    assert!(outcome.records[0].performance_metrics.judge_success);
    assert_eq!(outcome.unprocessed, 1);
    // the provider is never retried for a non-transient error
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    assert_eq!(count_unprocessed_files(sink.unprocessed_dir()).unwrap(), 1);
    let file = std::fs::read_dir(sink.unprocessed_dir())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let failures = read_unprocessed(file).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, "API error: ValidationException");
    match &failures[0].detail {
        FailureDetail::Result(record) => {
            assert_eq!(record.scenario.model_id, "rejected-model");
            assert_eq!(record.error_code.as_deref(), Some("ValidationException"));
            assert_eq!(
                record.api_call_status,
                "ValidationException model does not support this request"
            );
        }
        other => panic!("unexpected detail: {other:?}"),
    }
}

#[tokio::test]
async fn test_every_run_failing_reports_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileRunSink::new(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::default());
    let scenarios = cross_join(&[spec()], &[model("rejected-model")], 0.7, 1.0);
    let config = BenchConfig::builder()
        .invocations_per_scenario(2)
        .sleep_between_invocations(Duration::ZERO)
        .experiment_counts(3)
        .build()
        .unwrap();

    let orchestrator = RunOrchestrator::new(engine(provider.clone(), &["judge-a"], config), sink.clone());
    let err = orchestrator.run(&scenarios).await.unwrap_err();

    assert!(matches!(err, BenchError::NoResults { runs: 3 }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    assert_eq!(count_unprocessed_files(sink.unprocessed_dir()).unwrap(), 3);
}
