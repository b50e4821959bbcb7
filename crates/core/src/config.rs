// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed, validated benchmark configuration.
//!
//! [`BenchConfig`] is built once, validated by [`BenchConfigBuilder::build`],
//! and shared read-only by every task afterwards. Layered sources (files,
//! environment) deserialize into [`BenchSettings`] first and are converted
//! with `TryFrom`.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A count that must be positive was zero
    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    /// A sampling parameter was outside `[0, 1]`
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Parameter name
        name: &'static str,
        /// Rejected value
        value: f64,
    },

    /// A duration was negative or not finite
    #[error("{0} must be a non-negative number of seconds")]
    InvalidDuration(&'static str),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Immutable benchmark configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    parallel_calls: usize,
    invocations_per_scenario: u32,
    sleep_between_invocations: Duration,
    temperature_variations: u32,
    experiment_counts: u32,
    experiment_name: String,
    base_temperature: f64,
    top_p: f64,
    custom_metrics: Vec<String>,
    retry: RetryPolicy,
}

impl BenchConfig {
    /// Create a builder populated with defaults.
    pub fn builder() -> BenchConfigBuilder {
        BenchConfigBuilder::default()
    }

    /// Maximum concurrent scenario tasks.
    pub fn parallel_calls(&self) -> usize {
        self.parallel_calls
    }

    /// Sequential invocations per scenario.
    pub fn invocations_per_scenario(&self) -> u32 {
        self.invocations_per_scenario
    }

    /// Pause between invocations of the same scenario.
    pub fn sleep_between_invocations(&self) -> Duration {
        self.sleep_between_invocations
    }

    /// Temperature sweep steps.
    pub fn temperature_variations(&self) -> u32 {
        self.temperature_variations
    }

    /// Number of full runs.
    pub fn experiment_counts(&self) -> u32 {
        self.experiment_counts
    }

    /// Experiment label.
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Temperature the sweep is centered on.
    pub fn base_temperature(&self) -> f64 {
        self.base_temperature
    }

    /// Nucleus sampling cutoff for target models.
    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// User-defined judge metrics.
    pub fn custom_metrics(&self) -> &[String] {
        &self.custom_metrics
    }

    /// Retry policy wrapped around every provider and judge call.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        let b = BenchConfigBuilder::default();
        Self {
            parallel_calls: b.parallel_calls,
            invocations_per_scenario: b.invocations_per_scenario,
            sleep_between_invocations: b.sleep_between_invocations,
            temperature_variations: b.temperature_variations,
            experiment_counts: b.experiment_counts,
            experiment_name: b.experiment_name,
            base_temperature: b.base_temperature,
            top_p: b.top_p,
            custom_metrics: b.custom_metrics,
            retry: b.retry,
        }
    }
}

/// Builder for [`BenchConfig`].
#[derive(Debug, Clone)]
pub struct BenchConfigBuilder {
    parallel_calls: usize,
    invocations_per_scenario: u32,
    sleep_between_invocations: Duration,
    temperature_variations: u32,
    experiment_counts: u32,
    experiment_name: String,
    base_temperature: f64,
    top_p: f64,
    custom_metrics: Vec<String>,
    retry: RetryPolicy,
}

impl Default for BenchConfigBuilder {
    fn default() -> Self {
        Self {
            parallel_calls: 4,
            invocations_per_scenario: 2,
            sleep_between_invocations: Duration::from_secs(3),
            temperature_variations: 0,
            experiment_counts: 2,
            experiment_name: default_experiment_name(),
            base_temperature: 1.0,
            top_p: 1.0,
            custom_metrics: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BenchConfigBuilder {
    /// Set the maximum concurrent scenario tasks.
    pub fn parallel_calls(mut self, n: usize) -> Self {
        self.parallel_calls = n;
        self
    }

    /// Set the invocations per scenario.
    pub fn invocations_per_scenario(mut self, n: u32) -> Self {
        self.invocations_per_scenario = n;
        self
    }

    /// Set the pause between invocations.
    pub fn sleep_between_invocations(mut self, d: Duration) -> Self {
        self.sleep_between_invocations = d;
        self
    }

    /// Set the temperature sweep steps.
    pub fn temperature_variations(mut self, n: u32) -> Self {
        self.temperature_variations = n;
        self
    }

    /// Set the number of runs.
    pub fn experiment_counts(mut self, n: u32) -> Self {
        self.experiment_counts = n;
        self
    }

    /// Set the experiment label.
    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    /// Set the base temperature.
    pub fn base_temperature(mut self, t: f64) -> Self {
        self.base_temperature = t;
        self
    }

    /// Set top-p.
    pub fn top_p(mut self, p: f64) -> Self {
        self.top_p = p;
        self
    }

    /// Set the custom metrics list.
    pub fn custom_metrics(mut self, metrics: Vec<String>) -> Self {
        self.custom_metrics = metrics;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<BenchConfig> {
        if self.parallel_calls == 0 {
            return Err(ConfigError::ZeroCount("parallel_calls"));
        }
        if self.invocations_per_scenario == 0 {
            return Err(ConfigError::ZeroCount("invocations_per_scenario"));
        }
        if self.experiment_counts == 0 {
            return Err(ConfigError::ZeroCount("experiment_counts"));
        }
        check_unit_range("base_temperature", self.base_temperature)?;
        check_unit_range("top_p", self.top_p)?;

        Ok(BenchConfig {
            parallel_calls: self.parallel_calls,
            invocations_per_scenario: self.invocations_per_scenario,
            sleep_between_invocations: self.sleep_between_invocations,
            temperature_variations: self.temperature_variations,
            experiment_counts: self.experiment_counts,
            experiment_name: self.experiment_name,
            base_temperature: self.base_temperature,
            top_p: self.top_p,
            custom_metrics: self.custom_metrics,
            retry: self.retry,
        })
    }
}

fn check_unit_range(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}

fn seconds(name: &'static str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration(name))
}

fn default_experiment_name() -> String {
    format!("Benchmark-{}", chrono::Local::now().format("%Y%m%d"))
}

/// Split a comma-separated metric list, trimming entries and replacing
/// inner spaces with `-`. Empty entries are dropped.
pub fn parse_custom_metrics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim().replace(' ', "-"))
        .filter(|m| !m.is_empty())
        .collect()
}

/// Loosely typed settings as read from layered configuration sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    /// Maximum concurrent scenario tasks
    pub parallel_calls: usize,
    /// Sequential invocations per scenario
    pub invocations_per_scenario: u32,
    /// Seconds between invocations
    pub sleep_between_invocations: f64,
    /// Temperature sweep steps
    pub temperature_variations: u32,
    /// Number of runs
    pub experiment_counts: u32,
    /// Experiment label
    pub experiment_name: Option<String>,
    /// Base temperature
    pub temperature: f64,
    /// Top-p for target models
    pub top_p: f64,
    /// Comma-separated custom metrics
    pub user_defined_metrics: Option<String>,
    /// Retry attempts after the first call
    pub max_retries: u32,
    /// First backoff in seconds
    pub initial_backoff: f64,
    /// Backoff ceiling in seconds
    pub max_backoff: f64,
    /// Randomize backoff
    pub jitter: bool,
}

impl Default for BenchSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            parallel_calls: 4,
            invocations_per_scenario: 2,
            sleep_between_invocations: 3.0,
            temperature_variations: 0,
            experiment_counts: 2,
            experiment_name: None,
            temperature: 1.0,
            top_p: 1.0,
            user_defined_metrics: None,
            max_retries: retry.max_retries(),
            initial_backoff: retry.initial_backoff().as_secs_f64(),
            max_backoff: retry.max_backoff().as_secs_f64(),
            jitter: retry.jitter(),
        }
    }
}

impl TryFrom<BenchSettings> for BenchConfig {
    type Error = ConfigError;

    fn try_from(s: BenchSettings) -> Result<Self> {
        let retry = RetryPolicy::new(
            s.max_retries,
            seconds("initial_backoff", s.initial_backoff)?,
            seconds("max_backoff", s.max_backoff)?,
            s.jitter,
        );

        let mut builder = BenchConfig::builder()
            .parallel_calls(s.parallel_calls)
            .invocations_per_scenario(s.invocations_per_scenario)
            .sleep_between_invocations(seconds(
                "sleep_between_invocations",
                s.sleep_between_invocations,
            )?)
            .temperature_variations(s.temperature_variations)
            .experiment_counts(s.experiment_counts)
            .base_temperature(s.temperature)
            .top_p(s.top_p)
            .retry(retry);

        if let Some(name) = s.experiment_name {
            builder = builder.experiment_name(name);
        }
        if let Some(raw) = s.user_defined_metrics.as_deref() {
            builder = builder.custom_metrics(parse_custom_metrics(raw));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BenchConfig::builder().build().unwrap();
        assert_eq!(cfg.parallel_calls(), 4);
        assert_eq!(cfg.invocations_per_scenario(), 2);
        assert_eq!(cfg.sleep_between_invocations(), Duration::from_secs(3));
        assert_eq!(cfg.experiment_counts(), 2);
        assert_eq!(cfg.base_temperature(), 1.0);
        assert!(cfg.experiment_name().starts_with("Benchmark-"));
        assert_eq!(cfg.retry(), BenchConfig::default().retry());
    }

    #[test]
    fn test_rejects_zero_counts() {
        assert_eq!(
            BenchConfig::builder().parallel_calls(0).build().unwrap_err(),
            ConfigError::ZeroCount("parallel_calls")
        );
        assert!(BenchConfig::builder().invocations_per_scenario(0).build().is_err());
        assert!(BenchConfig::builder().experiment_counts(0).build().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_sampling() {
        assert!(matches!(
            BenchConfig::builder().top_p(1.5).build(),
            Err(ConfigError::OutOfRange { name: "top_p", .. })
        ));
        assert!(BenchConfig::builder().base_temperature(-0.1).build().is_err());
    }

    #[test]
    fn test_parse_custom_metrics() {
        assert_eq!(
            parse_custom_metrics(" brand voice , tone,,Safety "),
            vec!["brand-voice", "tone", "Safety"]
        );
    }

    #[test]
    fn test_settings_conversion() {
        let settings = BenchSettings {
            parallel_calls: 8,
            sleep_between_invocations: 0.5,
            experiment_name: Some("exp".into()),
            user_defined_metrics: Some("a b".into()),
            max_retries: 3,
            jitter: false,
            ..BenchSettings::default()
        };
        let cfg = BenchConfig::try_from(settings).unwrap();
        assert_eq!(cfg.parallel_calls(), 8);
        assert_eq!(cfg.sleep_between_invocations(), Duration::from_millis(500));
        assert_eq!(cfg.experiment_name(), "exp");
        assert_eq!(cfg.custom_metrics(), ["a-b".to_string()]);
        assert_eq!(cfg.retry().max_retries(), 3);
        assert!(!cfg.retry().jitter());
    }

    #[test]
    fn test_settings_reject_negative_sleep() {
        let settings = BenchSettings {
            sleep_between_invocations: -1.0,
            ..BenchSettings::default()
        };
        assert_eq!(
            BenchConfig::try_from(settings).unwrap_err(),
            ConfigError::InvalidDuration("sleep_between_invocations")
        );
    }
}
