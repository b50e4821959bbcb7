// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown summary of a benchmark, one table row per model.

use crate::result::BenchmarkRecord;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// Aggregates for one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSummary {
    /// Records seen
    pub records: usize,
    /// Records the jury passed
    pub passed: usize,
    /// Mean time to first byte, seconds
    pub mean_ttfb: Option<f64>,
    /// Mean time to last byte, seconds
    pub mean_ttlb: Option<f64>,
    /// Mean output tokens per second
    pub mean_throughput: Option<f64>,
    /// Response plus evaluation cost, USD
    pub total_cost: f64,
}

impl ModelSummary {
    /// Share of records that passed, in percent.
    pub fn pass_rate(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.passed as f64 * 100.0 / self.records as f64
        }
    }
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// Group records by model id.
pub fn summarize(records: &[BenchmarkRecord]) -> BTreeMap<String, ModelSummary> {
    let mut by_model: BTreeMap<&str, Vec<&BenchmarkRecord>> = BTreeMap::new();
    for record in records {
        by_model
            .entry(record.scenario.model_id.as_str())
            .or_default()
            .push(record);
    }

    by_model
        .into_iter()
        .map(|(model, rows)| {
            let summary = ModelSummary {
                records: rows.len(),
                passed: rows
                    .iter()
                    .filter(|r| r.performance_metrics.judge_success)
                    .count(),
                mean_ttfb: mean(rows.iter().map(|r| r.result.time_to_first_byte)),
                mean_ttlb: mean(rows.iter().map(|r| r.result.time_to_last_byte)),
                mean_throughput: mean(rows.iter().map(|r| r.result.throughput_tokens_per_sec)),
                total_cost: rows.iter().map(|r| r.total_cost()).sum(),
            };
            (model.to_string(), summary)
        })
        .collect()
}

fn cell(value: Option<f64>, places: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", places, v))
}

/// Render the summary table.
pub fn generate_summary(experiment: &str, records: &[BenchmarkRecord]) -> Result<String, fmt::Error> {
    let mut output = String::new();

    writeln!(output, "# {}", experiment)?;
    writeln!(output)?;
    writeln!(output, "Generated: {}", chrono::Utc::now().to_rfc3339())?;
    writeln!(output)?;
    writeln!(
        output,
        "| Model | Records | Pass rate | Avg TTFB (s) | Avg TTLB (s) | Avg throughput (tok/s) | Total cost (USD) |"
    )?;
    writeln!(output, "|-------|---------|-----------|--------------|--------------|------------------------|------------------|")?;

    for (model, summary) in summarize(records) {
        writeln!(
            output,
            "| {} | {} | {:.1}% | {} | {} | {} | {:.6} |",
            model,
            summary.records,
            summary.pass_rate(),
            cell(summary.mean_ttfb, 4),
            cell(summary.mean_ttlb, 4),
            cell(summary.mean_throughput, 2),
            summary.total_cost
        )?;
    }

    writeln!(output)?;
    writeln!(output, "---")?;
    writeln!(output, "Total records: {}", records.len())?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::scenario;
    use llm_jurybench_core::InvocationResult;

    fn record(model_id: &str, ttfb: Option<f64>, passed: bool) -> BenchmarkRecord {
        let mut record = BenchmarkRecord::new(
            scenario(model_id),
            InvocationResult {
                time_to_first_byte: ttfb,
                response_cost: Some(0.5),
                ..InvocationResult::default()
            },
            1,
            1,
            "2025-01-01T00:00:00Z",
        );
        record.performance_metrics.judge_success = passed;
        record.evaluation_cost = 0.25;
        record
    }

    #[test]
    fn test_summarize_groups_by_model() {
        let records = vec![
            record("a", Some(1.0), true),
            record("a", Some(3.0), false),
            record("a", None, false),
            record("b", None, true),
        ];

        let summary = summarize(&records);

        let a = &summary["a"];
        assert_eq!(a.records, 3);
        assert_eq!(a.passed, 1);
        assert_eq!(a.mean_ttfb, Some(2.0));
        assert_eq!(a.mean_ttlb, None);
        assert!((a.total_cost - 2.25).abs() < 1e-12);
        assert_eq!(summary["b"].pass_rate(), 100.0);
    }

    #[test]
    fn test_generate_summary_table() {
        let records = vec![record("a", Some(1.0), true), record("b", None, false)];
        let text = generate_summary("Benchmark-test", &records).unwrap();

        assert!(text.starts_with("# Benchmark-test"));
        assert!(text.contains("| a | 1 | 100.0% | 1.0000 | - | - | 0.750000 |"));
        assert!(text.contains("| b | 1 | 0.0% | - |"));
        assert!(text.contains("Total records: 2"));
    }
}
