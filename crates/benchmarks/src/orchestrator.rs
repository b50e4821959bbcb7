// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Repeated runs over one expanded scenario set.

use crate::engine::{DispatchEngine, RunOutput};
use crate::result::BenchmarkRecord;
use llm_jurybench_core::expand::expand_scenarios;
use llm_jurybench_core::Scenario;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that fail a whole benchmark.
#[derive(Debug, Error)]
pub enum BenchError {
    /// No run produced a persisted record
    #[error("no results were produced across {runs} run(s)")]
    NoResults {
        /// Runs attempted
        runs: u32,
    },
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Destination for the output of each run.
///
/// Called from the blocking thread pool, so implementations may do
/// synchronous file I/O.
pub trait RunSink: Send + Sync {
    /// Persist one run's records and failures.
    fn persist_run(&self, run: u32, output: &RunOutput) -> io::Result<()>;
}

/// Summary of a finished benchmark.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkOutcome {
    /// Records of every run that was persisted
    pub records: Vec<BenchmarkRecord>,
    /// Runs whose output reached the sink
    pub runs_persisted: u32,
    /// Failures across all runs
    pub unprocessed: usize,
}

/// Drives the dispatch engine `experiment_counts` times.
pub struct RunOrchestrator {
    engine: DispatchEngine,
    sink: Arc<dyn RunSink>,
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl RunOrchestrator {
    /// Create an orchestrator.
    pub fn new(engine: DispatchEngine, sink: Arc<dyn RunSink>) -> Self {
        Self { engine, sink }
    }

    /// Expand the scenarios once, then dispatch and persist every run.
    ///
    /// A failed run is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::NoResults`] when no run persisted a record.
    pub async fn run(&self, scenarios: &[Scenario]) -> Result<BenchmarkOutcome> {
        let config = self.engine.config();
        let runs = config.experiment_counts();
        let expanded = expand_scenarios(scenarios, config.temperature_variations());

        info!(
            experiment = config.experiment_name(),
            base_scenarios = scenarios.len(),
            expanded_scenarios = expanded.len(),
            runs,
            "starting benchmark"
        );

        let mut outcome = BenchmarkOutcome::default();
        for run in 1..=runs {
            info!(run, runs, "starting run");
            let mut output = match self.engine.run(&expanded, run).await {
                Ok(output) => output,
                Err(e) => {
                    error!(run, error = %e, "run failed");
                    continue;
                }
            };
            output.stamp(run, chrono::Utc::now());

            let sink = Arc::clone(&self.sink);
            let persisted = tokio::task::spawn_blocking(move || {
                let result = sink.persist_run(run, &output);
                (output, result)
            })
            .await;
            let output = match persisted {
                Ok((output, Ok(()))) => output,
                Ok((_, Err(e))) => {
                    error!(run, error = %e, "failed to persist run");
                    continue;
                }
                Err(e) => {
                    error!(run, error = %e, "persist task panicked");
                    continue;
                }
            };

            if !output.unprocessed.is_empty() {
                warn!(run, unprocessed = output.unprocessed.len(), "run had failures");
            }
            info!(run, records = output.records.len(), "run complete");

            outcome.runs_persisted += 1;
            outcome.unprocessed += output.unprocessed.len();
            outcome.records.extend(output.records);
        }

        if outcome.records.is_empty() {
            return Err(BenchError::NoResults { runs });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::scenario;
    use async_trait::async_trait;
    use llm_jurybench_core::judge::{JudgeClient, JudgeReply};
    use llm_jurybench_core::provider::{ProviderSet, Result as ProviderResult};
    use llm_jurybench_core::{
        BenchConfig, InferenceConfig, InferenceProvider, InvocationResult, JudgePanel,
        JudgeProfile, ProviderError, RetryPolicy,
    };
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    struct StaticProvider(Option<&'static str>);

    #[async_trait]
    impl InferenceProvider for StaticProvider {
        async fn invoke(&self, _scenario: &Scenario) -> ProviderResult<InvocationResult> {
            match self.0 {
                Some(text) => Ok(InvocationResult {
                    response_text: text.to_string(),
                    provider_request_count: 1,
                    ..InvocationResult::default()
                }),
                None => Err(ProviderError::from_code("AccessDeniedException", "no access")),
            }
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    struct PassingJudge;

    #[async_trait]
    impl JudgeClient for PassingJudge {
        async fn complete(
            &self,
            _judge: &JudgeProfile,
            _prompt: &str,
            _config: &InferenceConfig,
        ) -> ProviderResult<JudgeReply> {
            Ok(JudgeReply {
                text: r#"{"scores": {"Correctness": 5}}"#.to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        fail_run: Option<u32>,
        persisted: Mutex<Vec<(u32, usize, usize)>>,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl RunSink for MemorySink {
        fn persist_run(&self, run: u32, output: &RunOutput) -> io::Result<()> {
            self.threads.lock().unwrap().push(thread::current().id());
            if self.fail_run == Some(run) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            self.persisted
                .lock()
                .unwrap()
                .push((run, output.records.len(), output.unprocessed.len()));
            Ok(())
        }
    }

    fn orchestrator(text: Option<&'static str>, sink: Arc<MemorySink>, runs: u32) -> RunOrchestrator {
        let provider = Arc::new(StaticProvider(text));
        let retry = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1), false);
        let config = BenchConfig::builder()
            .parallel_calls(2)
            .invocations_per_scenario(1)
            .sleep_between_invocations(Duration::ZERO)
            .experiment_counts(runs)
            .temperature_variations(1)
            .base_temperature(0.5)
            .build()
            .unwrap();
        let judges = vec![JudgeProfile {
            model_id: "judge".into(),
            region: "us-east-1".into(),
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }];
        let engine = DispatchEngine::new(
            ProviderSet::new(provider.clone(), provider),
            JudgePanel::new(Arc::new(PassingJudge), retry),
            judges,
            Arc::new(config),
        );
        RunOrchestrator::new(engine, sink)
    }

    #[tokio::test]
    async fn test_runs_are_persisted_and_stamped() {
        let sink = Arc::new(MemorySink::default());
        let orchestrator = orchestrator(Some("ok"), sink.clone(), 2);
        let base = scenario("m").with_temperature(0.5);

        let outcome = orchestrator.run(&[base]).await.unwrap();

        // 0.5 with one variation expands to 0.375, 0.5, 0.625
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.runs_persisted, 2);
        assert_eq!(outcome.records.iter().filter(|r| r.run_count == 2).count(), 3);
        assert_eq!(*sink.persisted.lock().unwrap(), vec![(1, 3, 0), (2, 3, 0)]);
    }

    #[tokio::test]
    async fn test_sink_runs_off_the_async_thread() {
        let sink = Arc::new(MemorySink::default());
        let orchestrator = orchestrator(Some("ok"), sink.clone(), 2);

        orchestrator.run(&[scenario("m")]).await.unwrap();

        let threads = sink.threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != thread::current().id()));
    }

    #[tokio::test]
    async fn test_sink_failure_skips_run() {
        let sink = Arc::new(MemorySink {
            fail_run: Some(1),
            ..MemorySink::default()
        });
        let orchestrator = orchestrator(Some("ok"), sink.clone(), 2);

        let outcome = orchestrator.run(&[scenario("m")]).await.unwrap();

        assert_eq!(outcome.runs_persisted, 1);
        assert!(outcome.records.iter().all(|r| r.run_count == 2));
    }

    #[tokio::test]
    async fn test_no_results_is_an_error() {
        let sink = Arc::new(MemorySink::default());
        let orchestrator = orchestrator(None, sink.clone(), 2);

        let err = orchestrator.run(&[scenario("m")]).await.unwrap_err();

        assert!(matches!(err, BenchError::NoResults { runs: 2 }));
        // failures are still persisted
        assert_eq!(sink.persisted.lock().unwrap().len(), 2);
    }
}
