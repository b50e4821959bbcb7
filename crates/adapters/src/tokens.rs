// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! After-the-fact token counting for vendors that do not report usage.

use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::CoreBPE;

/// Tokenizer failed to load.
#[derive(Debug, Error)]
#[error("failed to load tokenizer: {0}")]
pub struct TokenizerError(String);

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> u64;
}

/// `o200k_base` BPE counter.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load the `o200k_base` encoding.
    pub fn new() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| TokenizerError(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TiktokenCounter(o200k_base)")
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> u64 {
        self.bpe.encode_with_special_tokens(text).len() as u64
    }
}

/// Rough fallback: one token per whitespace-separated word.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

/// The BPE counter, or the whitespace heuristic if it cannot be loaded.
pub fn default_counter() -> Arc<dyn TokenCounter> {
    match TiktokenCounter::new() {
        Ok(counter) => Arc::new(counter),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to whitespace token counting");
            Arc::new(WhitespaceTokenCounter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_counter() {
        let counter = WhitespaceTokenCounter;
        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.count("  spaces  everywhere  "), 2);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_tiktoken_counter() {
        let counter = TiktokenCounter::new().unwrap();
        assert_eq!(counter.count(""), 0);
        let n = counter.count("The quick brown fox jumps over the lazy dog.");
        assert!(n >= 9 && n <= 12, "unexpected token count {n}");
    }
}
