// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI for LLM Jury Bench.
//!
//! `jurybench run` loads scenarios, model profiles and judge profiles,
//! expands the temperature sweep and benchmarks every scenario against its
//! provider, grading responses with the judge panel. `jurybench plan` does
//! the loading and expansion only and prints what a run would do.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`--config`), then `JURYBENCH_*` environment variables, then flags.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

use anyhow::{ensure, Context};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File, FileFormat};
use llm_jurybench_adapters::{build_providers, ConverseConfig, ConverseJudgeClient, ThirdPartyConfig};
use llm_jurybench_benchmarks::io::{count_unprocessed_files, write_summary};
use llm_jurybench_benchmarks::{DispatchEngine, FileRunSink, RunOrchestrator};
use llm_jurybench_core::config::BenchSettings;
use llm_jurybench_core::expand::expand_scenarios;
use llm_jurybench_core::scenario::{cross_join, load_jsonl};
use llm_jurybench_core::{
    BenchConfig, JudgePanel, JudgeProfile, ModelProfile, ProviderKind, Scenario, ScenarioSpec,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Prefix of environment variables read into the settings.
pub const ENV_PREFIX: &str = "JURYBENCH";

/// LLM Jury Bench CLI.
#[derive(Parser, Debug)]
#[command(name = "jurybench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark every scenario and write the results.
    ///
    /// Each run writes `invocations_<run>_<ts>_<id>.jsonl` to the output
    /// directory. Failed invocations go to `<output>/unprocessed/`.
    Run(RunArgs),

    /// Print the expanded scenario plan without calling any model.
    Plan(InputArgs),
}

/// Input files and setting overrides shared by every command.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Scenario file (JSONL).
    pub input_file: PathBuf,

    /// Model profile file (JSONL).
    #[arg(long, default_value = "model_profiles.jsonl")]
    pub model_file: PathBuf,

    /// Judge profile file (JSONL).
    #[arg(long, default_value = "judge_profiles.jsonl")]
    pub judge_file: PathBuf,

    /// TOML settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Setting overrides.
    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

/// Flags that override layered settings.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsOverrides {
    /// Maximum scenarios in flight.
    #[arg(long)]
    pub parallel_calls: Option<usize>,

    /// Sequential invocations per scenario.
    #[arg(long)]
    pub invocations_per_scenario: Option<u32>,

    /// Seconds to pause between invocations of one scenario.
    #[arg(long)]
    pub sleep_between_invocations: Option<f64>,

    /// Number of runs.
    #[arg(long)]
    pub experiment_counts: Option<u32>,

    /// Experiment label.
    #[arg(long)]
    pub experiment_name: Option<String>,

    /// Temperature sweep steps around the base temperature.
    #[arg(long)]
    pub temperature_variations: Option<u32>,

    /// Base temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Top-p for target models.
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Extra judge metrics, comma-separated.
    #[arg(long)]
    pub user_defined_metrics: Option<String>,

    /// Retries after the first provider call.
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments of `run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Inputs and overrides.
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Directory results are written to.
    #[arg(long, default_value = "benchmark_results")]
    pub output_dir: PathBuf,

    /// Write a markdown summary per model after all runs.
    #[arg(long)]
    pub report: bool,

    /// Converse endpoint; `{region}` is replaced per call.
    #[arg(long, env = "JURYBENCH_CONVERSE_ENDPOINT")]
    pub converse_endpoint: Option<String>,

    /// OpenAI base URL.
    #[arg(long, env = "JURYBENCH_OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Gemini OpenAI-compatible base URL.
    #[arg(long, env = "JURYBENCH_GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    pub request_timeout: u64,
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve settings from the config file, environment and flags.
pub fn load_settings(
    config_file: Option<&Path>,
    overrides: &SettingsOverrides,
) -> anyhow::Result<BenchSettings> {
    let mut builder = Config::builder();
    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    builder = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .set_override_option("parallel_calls", overrides.parallel_calls.map(|v| v as i64))?
        .set_override_option(
            "invocations_per_scenario",
            overrides.invocations_per_scenario.map(i64::from),
        )?
        .set_override_option("sleep_between_invocations", overrides.sleep_between_invocations)?
        .set_override_option("experiment_counts", overrides.experiment_counts.map(i64::from))?
        .set_override_option("experiment_name", overrides.experiment_name.clone())?
        .set_override_option(
            "temperature_variations",
            overrides.temperature_variations.map(i64::from),
        )?
        .set_override_option("temperature", overrides.temperature)?
        .set_override_option("top_p", overrides.top_p)?
        .set_override_option("user_defined_metrics", overrides.user_defined_metrics.clone())?
        .set_override_option("max_retries", overrides.max_retries.map(i64::from))?;

    let settings = builder
        .build()
        .context("failed to read settings")?
        .try_deserialize::<BenchSettings>()
        .context("invalid settings")?;
    Ok(settings)
}

struct Inputs {
    config: Arc<BenchConfig>,
    scenarios: Vec<Scenario>,
    judges: Vec<JudgeProfile>,
}

fn load_inputs(args: &InputArgs) -> anyhow::Result<Inputs> {
    let settings = load_settings(args.config.as_deref(), &args.overrides)?;
    let config = BenchConfig::try_from(settings)?;

    let specs: Vec<ScenarioSpec> = load_jsonl(&args.input_file)?;
    let models: Vec<ModelProfile> = load_jsonl(&args.model_file)?;
    let judges: Vec<JudgeProfile> = load_jsonl(&args.judge_file)?;
    ensure!(!specs.is_empty(), "no scenarios in {}", args.input_file.display());
    ensure!(!models.is_empty(), "no model profiles in {}", args.model_file.display());
    ensure!(!judges.is_empty(), "no judge profiles in {}", args.judge_file.display());

    let scenarios = cross_join(&specs, &models, config.base_temperature(), config.top_p());
    info!(
        scenarios = specs.len(),
        models = models.len(),
        judges = judges.len(),
        "loaded inputs"
    );

    Ok(Inputs {
        config: Arc::new(config),
        scenarios,
        judges,
    })
}

fn provider_label(kind: ProviderKind) -> String {
    match kind {
        ProviderKind::Converse => "converse".to_string(),
        ProviderKind::ThirdParty(vendor) => vendor.to_string(),
    }
}

/// Describe what a run of `expanded` would do.
pub fn render_plan(
    config: &BenchConfig,
    expanded: &[Scenario],
    judges: usize,
) -> Result<String, std::fmt::Error> {
    let mut by_model: BTreeMap<(&str, &str), (String, BTreeSet<String>, usize)> = BTreeMap::new();
    for scenario in expanded {
        let entry = by_model
            .entry((scenario.model_id.as_str(), scenario.region.as_str()))
            .or_insert_with(|| (provider_label(scenario.provider), BTreeSet::new(), 0));
        entry.1.insert(format!("{:.3}", scenario.temperature));
        entry.2 += 1;
    }

    let runs = u64::from(config.experiment_counts());
    let invocations = u64::from(config.invocations_per_scenario());
    let total = expanded.len() as u64 * invocations * runs;

    let mut out = String::new();
    writeln!(out, "Experiment: {}", config.experiment_name())?;
    writeln!(out, "Scenarios after expansion: {}", expanded.len())?;
    writeln!(
        out,
        "Runs: {}  Invocations per scenario: {}  Total invocations: {}",
        runs, invocations, total
    )?;
    writeln!(out, "Judges per invocation: {}", judges)?;
    writeln!(out, "Parallel calls: {}", config.parallel_calls())?;
    writeln!(out)?;
    writeln!(out, "| Model | Region | Provider | Temperatures | Scenarios |")?;
    writeln!(out, "|-------|--------|----------|--------------|-----------|")?;
    for ((model, region), (provider, temps, count)) in by_model {
        let temps: Vec<String> = temps.into_iter().collect();
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            model,
            region,
            provider,
            temps.join(", "),
            count
        )?;
    }
    Ok(out)
}

async fn run_benchmark(args: RunArgs) -> anyhow::Result<()> {
    let Inputs {
        config,
        scenarios,
        judges,
    } = load_inputs(&args.inputs)?;
    let timeout = Duration::from_secs(args.request_timeout);

    let mut converse = ConverseConfig::from_env();
    converse.timeout = timeout;
    if let Some(endpoint) = args.converse_endpoint {
        converse = converse.with_endpoint(endpoint);
    }
    let mut third_party = ThirdPartyConfig::from_env();
    third_party.timeout = timeout;
    if let Some(url) = args.openai_base_url {
        third_party.openai_base_url = url;
    }
    if let Some(url) = args.gemini_base_url {
        third_party.gemini_base_url = url;
    }

    let retry = *config.retry();
    let providers = build_providers(converse.clone(), third_party, retry)?;
    let panel = JudgePanel::new(Arc::new(ConverseJudgeClient::new(converse)?), retry);
    let engine = DispatchEngine::new(providers, panel, judges, Arc::clone(&config));

    let sink = Arc::new(
        FileRunSink::new(&args.output_dir)
            .with_context(|| format!("cannot create {}", args.output_dir.display()))?,
    );
    let outcome = RunOrchestrator::new(engine, sink.clone()).run(&scenarios).await;

    let unprocessed_files = count_unprocessed_files(sink.unprocessed_dir())?;
    if unprocessed_files > 0 {
        warn!(
            files = unprocessed_files,
            dir = %sink.unprocessed_dir().display(),
            "unprocessed records found, inspect them before trusting the results"
        );
    }

    let outcome = outcome?;
    if args.report {
        let path = write_summary(&outcome.records, config.experiment_name(), sink.output_dir())?;
        info!(path = %path.display(), "wrote summary");
    }

    println!(
        "Completed {} records across {} run(s)",
        outcome.records.len(),
        outcome.runs_persisted
    );
    println!("Results written to {}", sink.output_dir().display());
    Ok(())
}

fn plan(args: InputArgs) -> anyhow::Result<()> {
    let inputs = load_inputs(&args)?;
    let expanded = expand_scenarios(&inputs.scenarios, inputs.config.temperature_variations());
    print!("{}", render_plan(&inputs.config, &expanded, inputs.judges.len())?);
    Ok(())
}

/// Run the parsed command.
///
/// # Errors
///
/// Fails on unreadable inputs, invalid settings, or when no run produced a
/// record.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_benchmark(args).await,
        Commands::Plan(args) => plan(args),
    }
}
