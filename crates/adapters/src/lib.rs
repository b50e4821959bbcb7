// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Provider adapters for LLM Jury Bench.
//!
//! This crate implements the capability traits from `llm-jurybench-core`
//! over HTTP:
//!
//! - [`converse`] - streaming Converse provider and the judge client
//! - [`third_party`] - OpenAI, Gemini and Azure chat completion streams
//! - [`tokens`] - token counters for vendors without usage metadata
//! - [`error`] - HTTP error classification
//! - [`eventstream`] - binary event-stream frame decoding
//! - [`stream`] - line framing for streamed bodies
//!
//! # Example
//!
//! ```no_run
//! use llm_jurybench_adapters::{build_providers, ConverseConfig, ThirdPartyConfig};
//! use llm_jurybench_core::RetryPolicy;
//!
//! let providers = build_providers(
//!     ConverseConfig::from_env(),
//!     ThirdPartyConfig::from_env(),
//!     RetryPolicy::default(),
//! )?;
//! # Ok::<(), llm_jurybench_core::ProviderError>(())
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod converse;
pub mod error;
pub mod eventstream;
pub mod stream;
pub mod third_party;
pub mod tokens;

pub use converse::{ConverseConfig, ConverseJudgeClient, ConverseProvider};
pub use third_party::{ThirdPartyConfig, ThirdPartyProvider};
pub use tokens::{TiktokenCounter, TokenCounter, WhitespaceTokenCounter};

use llm_jurybench_core::provider::{ProviderSet, Result};
use llm_jurybench_core::RetryPolicy;
use std::sync::Arc;

/// Build the provider set used by the dispatch engine.
pub fn build_providers(
    converse: ConverseConfig,
    third_party: ThirdPartyConfig,
    retry: RetryPolicy,
) -> Result<ProviderSet> {
    Ok(ProviderSet::new(
        Arc::new(ConverseProvider::new(converse, retry)?),
        Arc::new(ThirdPartyProvider::new(third_party, retry)?),
    ))
}
