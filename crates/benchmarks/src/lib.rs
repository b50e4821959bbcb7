// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark execution for LLM Jury Bench.
//!
//! # Quick Start
//!
//! ```no_run
//! use llm_jurybench_benchmarks::{DispatchEngine, FileRunSink, RunOrchestrator};
//! use llm_jurybench_core::Scenario;
//! use std::sync::Arc;
//!
//! # async fn demo(engine: DispatchEngine, scenarios: Vec<Scenario>) -> anyhow::Result<()> {
//! let sink = Arc::new(FileRunSink::new("benchmark_results")?);
//! let outcome = RunOrchestrator::new(engine, sink).run(&scenarios).await?;
//! println!("{} records", outcome.records.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`engine`] - bounded-parallel dispatch with a single result collector
//! - [`orchestrator`] - repeated runs and the [`orchestrator::RunSink`] seam
//! - [`result`] - `BenchmarkRecord` and `UnprocessedRecord`
//! - [`io`] - JSONL and JSON persistence
//! - [`markdown`] - per-model summary report

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod engine;
pub mod io;
pub mod markdown;
pub mod orchestrator;
pub mod result;

pub use engine::{DispatchEngine, EngineError, RunOutput};
pub use io::FileRunSink;
pub use orchestrator::{BenchError, BenchmarkOutcome, RunOrchestrator, RunSink};
pub use result::{BenchmarkRecord, FailureDetail, PerformanceMetrics, UnprocessedRecord};
