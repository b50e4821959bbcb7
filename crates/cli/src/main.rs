// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! LLM Jury Bench CLI entry point.

use clap::Parser;
use llm_jurybench_cli::{init_tracing, Cli};

#[tokio::main]
async fn main() {
    // Credentials may live in a .env file.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(e) = llm_jurybench_cli::run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
