// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded-parallel dispatch of scenarios.
//!
//! One task is spawned per scenario and gated by a semaphore holding
//! `parallel_calls` permits. A task runs its invocations sequentially:
//! provider call, then the judge panel, then a record. Every outcome is
//! sent over a channel to a single collector task, so no container is
//! shared between workers.
//!
//! Failures never stop the run. Provider errors, empty responses, jury
//! errors and panics inside an invocation all become
//! [`UnprocessedRecord`]s; a task that dies outside an invocation becomes
//! an unprocessed record without a scenario.

use crate::result::{BenchmarkRecord, UnprocessedRecord};
use futures::FutureExt;
use llm_jurybench_core::judge::EvaluationRequest;
use llm_jurybench_core::provider::ProviderSet;
use llm_jurybench_core::{
    timestamp_iso, BenchConfig, InvocationResult, JudgePanel, JudgeProfile, Scenario,
    STATUS_JURY_ERROR,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

const CHANNEL_CAPACITY: usize = 256;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The collector task stopped before all results arrived
    #[error("result collector failed: {0}")]
    Collector(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything one run produced.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Successful invocations
    pub records: Vec<BenchmarkRecord>,
    /// Failed invocations and lost tasks
    pub unprocessed: Vec<UnprocessedRecord>,
}

impl RunOutput {
    fn push(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Record(record) => self.records.push(*record),
            Outcome::Unprocessed(failure) => self.unprocessed.push(*failure),
        }
    }

    /// Set the run index and timestamp on every record.
    pub fn stamp(&mut self, run: u32, at: chrono::DateTime<chrono::Utc>) {
        for record in &mut self.records {
            record.run_count = run;
            record.timestamp = at;
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Record(Box<BenchmarkRecord>),
    Unprocessed(Box<UnprocessedRecord>),
}

impl Outcome {
    fn failed(record: BenchmarkRecord, reason: impl Into<String>) -> Self {
        Self::Unprocessed(Box::new(UnprocessedRecord::from_record(record, reason)))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs scenarios against providers and the judge panel.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    providers: ProviderSet,
    panel: JudgePanel,
    judges: Arc<[JudgeProfile]>,
    config: Arc<BenchConfig>,
}

impl DispatchEngine {
    /// Create an engine.
    pub fn new(
        providers: ProviderSet,
        panel: JudgePanel,
        judges: Vec<JudgeProfile>,
        config: Arc<BenchConfig>,
    ) -> Self {
        Self {
            providers,
            panel,
            judges: judges.into(),
            config,
        }
    }

    /// Configuration the engine runs with.
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run every scenario `invocations_per_scenario` times.
    pub async fn run(&self, scenarios: &[Scenario], run_index: u32) -> Result<RunOutput> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_calls()));
        let (tx, mut rx) = mpsc::channel::<Outcome>(CHANNEL_CAPACITY);

        let collector = tokio::spawn(async move {
            let mut output = RunOutput::default();
            while let Some(outcome) = rx.recv().await {
                output.push(outcome);
            }
            output
        });

        let mut handles = Vec::with_capacity(scenarios.len());
        for scenario in scenarios.iter().cloned() {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "dispatch semaphore closed");
                        return;
                    }
                };
                engine.run_scenario(scenario, run_index, &tx).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, run = run_index, "scenario task failed");
                let failure =
                    UnprocessedRecord::exception(None, e.to_string(), "Scenario task failed");
                if tx.send(Outcome::Unprocessed(Box::new(failure))).await.is_err() {
                    warn!("collector closed before task failure could be recorded");
                }
            }
        }
        drop(tx);

        let output = collector
            .await
            .map_err(|e| EngineError::Collector(e.to_string()))?;

        info!(
            run = run_index,
            records = output.records.len(),
            unprocessed = output.unprocessed.len(),
            "run dispatch complete"
        );
        Ok(output)
    }

    async fn run_scenario(&self, scenario: Scenario, run_index: u32, tx: &mpsc::Sender<Outcome>) {
        let invocations = self.config.invocations_per_scenario();
        let pause = self.config.sleep_between_invocations();
        let (mut processed, mut failed) = (0u32, 0u32);

        for invocation in 1..=invocations {
            debug!(
                model_id = %scenario.model_id,
                region = %scenario.region,
                temperature = scenario.temperature,
                invocation,
                invocations,
                run = run_index,
                "running scenario"
            );

            let outcome = match AssertUnwindSafe(self.invoke_once(&scenario, invocation, run_index))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload);
                    error!(model_id = %scenario.model_id, panic = %message, "invocation panicked");
                    Outcome::Unprocessed(Box::new(UnprocessedRecord::exception(
                        Some(scenario.clone()),
                        message,
                        "Exception during processing",
                    )))
                }
            };

            match &outcome {
                Outcome::Record(_) => processed += 1,
                Outcome::Unprocessed(_) => failed += 1,
            }
            if tx.send(outcome).await.is_err() {
                warn!(model_id = %scenario.model_id, "collector closed, abandoning scenario");
                return;
            }

            if invocation < invocations && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        info!(
            model_id = %scenario.model_id,
            region = %scenario.region,
            temperature = scenario.temperature,
            processed,
            failed,
            "completed scenario"
        );
    }

    async fn invoke_once(&self, scenario: &Scenario, invocation: u32, run_index: u32) -> Outcome {
        let job_ts = timestamp_iso();
        let provider = self.providers.resolve(scenario.provider);

        let result = match provider.invoke(scenario).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    model_id = %scenario.model_id,
                    provider = provider.name(),
                    error = %e,
                    "provider call failed"
                );
                let code = e.code().to_string();
                let record = BenchmarkRecord::new(
                    scenario.clone(),
                    InvocationResult::default(),
                    invocation,
                    run_index,
                    job_ts,
                )
                .with_status(e.to_string(), Some(code.clone()));
                return Outcome::failed(record, format!("API error: {}", code));
            }
        };

        if result.response_text.is_empty() {
            warn!(model_id = %scenario.model_id, "model returned an empty response");
            let record = BenchmarkRecord::new(scenario.clone(), result, invocation, run_index, job_ts)
                .with_status(STATUS_JURY_ERROR, None);
            return Outcome::failed(record, "Empty model response");
        }

        let request = EvaluationRequest {
            prompt: &scenario.prompt,
            response: &result.response_text,
            golden_answer: &scenario.golden_answer,
            task_types: &scenario.task_type,
            task_criteria: &scenario.task_criteria,
        };
        let verdict = self
            .panel
            .evaluate(&request, &self.judges, self.config.custom_metrics())
            .await;

        let record = BenchmarkRecord::new(scenario.clone(), result, invocation, run_index, job_ts)
            .with_verdict(&verdict);

        if verdict.all_errored() {
            warn!(model_id = %scenario.model_id, "no judge produced a usable verdict");
            return Outcome::failed(
                record.with_status(STATUS_JURY_ERROR, None),
                "All judges failed to evaluate the response",
            );
        }

        Outcome::Record(Box::new(record))
    }
}
