// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Line framing for streamed HTTP bodies.
//!
//! Chat-completion streams use Server-Sent Events whose payload sits on
//! `data:` lines, and Converse proxies may relay events as one JSON object
//! per line. Bytes are buffered raw and only complete lines are decoded, so
//! a multi-byte character split across chunks survives intact.

use llm_jurybench_core::provider::Result;
use llm_jurybench_core::ProviderError;

/// Upper bound on buffered bytes without a newline.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Accumulates body chunks and yields complete, non-empty lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

fn decode_line(bytes: &[u8]) -> Result<Option<String>> {
    let line = std::str::from_utf8(bytes)
        .map_err(|e| ProviderError::Decode(format!("stream line is not UTF-8: {e}")))?
        .trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line, trimmed.
    ///
    /// # Errors
    ///
    /// Fails when a complete line is not valid UTF-8, or when more than
    /// 1 MiB accumulates without a newline.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = decode_line(&line)? {
                lines.push(line);
            }
        }

        if self.buffer.len() > MAX_BUFFER_SIZE {
            return Err(ProviderError::Decode(format!(
                "stream line exceeds {} bytes without a newline",
                MAX_BUFFER_SIZE
            )));
        }

        Ok(lines)
    }

    /// Whatever remains once the body has ended.
    pub fn finish(self) -> Result<Option<String>> {
        decode_line(&self.buffer)
    }
}

/// Payload of an SSE `data:` line, or `None` for other fields and the
/// `[DONE]` terminator.
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}
