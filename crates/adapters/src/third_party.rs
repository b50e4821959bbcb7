// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Third-party vendors behind an OpenAI-compatible chat completions API.
//!
//! Model ids look like `vendor/model`; the part after the first `/` is the
//! model name sent to the vendor. These endpoints are called with
//! `stream: true` but usage is not trusted, so token counts come from a
//! [`TokenCounter`] applied to the prompt and the assembled response.

use crate::error::{self, transport};
use crate::stream::{sse_data, LineBuffer};
use crate::tokens::{self, TokenCounter};
use async_trait::async_trait;
use futures::StreamExt;
use llm_jurybench_core::cost::{round_to, token_cost};
use llm_jurybench_core::provider::Result;
use llm_jurybench_core::{
    InferenceProvider, InvocationResult, ProviderError, ProviderKind, RetryPolicy, Scenario,
    ThirdPartyVendor,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default OpenAI base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default Gemini OpenAI-compatible base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
/// Default Azure OpenAI API version.
pub const AZURE_API_VERSION: &str = "2024-06-01";
/// Environment variable holding the Azure resource URL.
pub const AZURE_API_BASE_ENV: &str = "AZURE_API_BASE";

/// Endpoints and credentials for third-party vendors.
#[derive(Debug, Clone)]
pub struct ThirdPartyConfig {
    /// OpenAI base URL
    pub openai_base_url: String,
    /// Gemini base URL
    pub gemini_base_url: String,
    /// Azure resource URL, e.g. `https://my-resource.openai.azure.com`
    pub azure_api_base: Option<String>,
    /// Azure `api-version` query parameter
    pub azure_api_version: String,
    /// OpenAI key
    pub openai_api_key: Option<String>,
    /// Gemini key
    pub google_api_key: Option<String>,
    /// Azure key
    pub azure_api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ThirdPartyConfig {
    fn default() -> Self {
        Self {
            openai_base_url: OPENAI_BASE_URL.to_string(),
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            azure_api_base: None,
            azure_api_version: AZURE_API_VERSION.to_string(),
            openai_api_key: None,
            google_api_key: None,
            azure_api_key: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ThirdPartyConfig {
    /// Defaults with keys and the Azure base read from the environment.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            openai_api_key: var(ThirdPartyVendor::OpenAI.api_key_env()),
            google_api_key: var(ThirdPartyVendor::Gemini.api_key_env()),
            azure_api_key: var(ThirdPartyVendor::Azure.api_key_env()),
            azure_api_base: var(AZURE_API_BASE_ENV),
            ..Self::default()
        }
    }

    fn api_key(&self, vendor: ThirdPartyVendor) -> Result<&str> {
        let key = match vendor {
            ThirdPartyVendor::OpenAI => &self.openai_api_key,
            ThirdPartyVendor::Gemini => &self.google_api_key,
            ThirdPartyVendor::Azure => &self.azure_api_key,
        };
        key.as_deref()
            .ok_or_else(|| ProviderError::MissingCredential(vendor.api_key_env().to_string()))
    }

    fn url(&self, vendor: ThirdPartyVendor, model: &str) -> Result<String> {
        match vendor {
            ThirdPartyVendor::OpenAI => Ok(format!(
                "{}/chat/completions",
                self.openai_base_url.trim_end_matches('/')
            )),
            ThirdPartyVendor::Gemini => Ok(format!(
                "{}/chat/completions",
                self.gemini_base_url.trim_end_matches('/')
            )),
            ThirdPartyVendor::Azure => {
                let base = self
                    .azure_api_base
                    .as_deref()
                    .ok_or_else(|| ProviderError::MissingCredential(AZURE_API_BASE_ENV.to_string()))?;
                Ok(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    base.trim_end_matches('/'),
                    model,
                    self.azure_api_version
                ))
            }
        }
    }
}

/// Model name sent to the vendor: everything after the first `/`.
pub fn vendor_model_name(model_id: &str) -> &str {
    model_id
        .split_once('/')
        .map(|(_, name)| name)
        .unwrap_or(model_id)
}

/// Chat completion request body.
pub fn chat_request_body(scenario: &Scenario) -> Value {
    json!({
        "model": vendor_model_name(&scenario.model_id),
        "messages": [{ "role": "user", "content": scenario.prompt }],
        "stream": true,
        "max_tokens": scenario.max_output_tokens,
        "temperature": scenario.temperature,
        "top_p": scenario.top_p,
    })
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Text content carried by one SSE line, if any.
fn chunk_text(line: &str) -> Option<String> {
    let data = sse_data(line)?;
    match serde_json::from_str::<Chunk>(data) {
        Ok(chunk) => {
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            Some(text)
        }
        Err(e) => {
            debug!(error = %e, "skipping unparseable stream chunk");
            None
        }
    }
}

/// Provider for `openai/…`, `gemini/…` and `azure/…` models.
#[derive(Clone)]
pub struct ThirdPartyProvider {
    client: reqwest::Client,
    config: ThirdPartyConfig,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for ThirdPartyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdPartyProvider")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ThirdPartyProvider {
    /// Create a provider using the default token counter.
    pub fn new(config: ThirdPartyConfig, retry: RetryPolicy) -> Result<Self> {
        Self::with_token_counter(config, retry, tokens::default_counter())
    }

    /// Create a provider with an explicit token counter.
    pub fn with_token_counter(
        config: ThirdPartyConfig,
        retry: RetryPolicy,
        tokens: Arc<dyn TokenCounter>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            config,
            retry,
            tokens,
        })
    }

    async fn open_stream(
        &self,
        vendor: ThirdPartyVendor,
        url: &str,
        key: &str,
        body: &Value,
    ) -> Result<(Instant, reqwest::Response)> {
        let request = self.client.post(url).json(body);
        let request = match vendor {
            ThirdPartyVendor::Azure => request.header("api-key", key),
            ThirdPartyVendor::OpenAI | ThirdPartyVendor::Gemini => request.bearer_auth(key),
        };

        let start = Instant::now();
        let response = request.send().await.map_err(transport)?;
        if response.status().is_success() {
            Ok((start, response))
        } else {
            Err(error::from_response(response).await)
        }
    }
}

#[async_trait]
impl InferenceProvider for ThirdPartyProvider {
    async fn invoke(&self, scenario: &Scenario) -> Result<InvocationResult> {
        let vendor = match scenario.provider {
            ProviderKind::ThirdParty(vendor) => vendor,
            ProviderKind::Converse => {
                return Err(ProviderError::Api {
                    code: "UnsupportedModel".to_string(),
                    message: format!("{} is not a third-party model", scenario.model_id),
                })
            }
        };
        let key = self.config.api_key(vendor)?;
        let url = self
            .config
            .url(vendor, vendor_model_name(&scenario.model_id))?;
        let body = chat_request_body(scenario);
        let label = format!("{} {}", vendor, scenario.model_id);

        let ((start, response), attempts) = self
            .retry
            .run(&label, || self.open_stream(vendor, &url, key, &body))
            .await?;

        let mut first_chunk_at = None;
        let mut text = String::new();
        let mut lines = LineBuffer::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            if first_chunk_at.is_none() {
                first_chunk_at = Some(start.elapsed());
            }
            for line in lines.feed(&chunk)? {
                if let Some(delta) = chunk_text(&line) {
                    text.push_str(&delta);
                }
            }
        }
        if let Some(delta) = lines.finish()?.as_deref().and_then(chunk_text) {
            text.push_str(&delta);
        }
        let total = start.elapsed();

        let input_tokens = self.tokens.count(&scenario.prompt);
        let output_tokens = self.tokens.count(&text);
        let ttlb = round_to(total.as_secs_f64(), 4);

        debug!(
            model_id = %scenario.model_id,
            vendor = %vendor,
            input_tokens,
            output_tokens,
            "third-party stream complete"
        );

        Ok(InvocationResult {
            time_to_first_byte: Some(round_to(first_chunk_at.unwrap_or(total).as_secs_f64(), 4)),
            time_to_last_byte: Some(ttlb),
            throughput_tokens_per_sec: InvocationResult::throughput(Some(output_tokens), Some(ttlb)),
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            response_cost: Some(token_cost(
                input_tokens,
                output_tokens,
                scenario.input_cost_per_1k,
                scenario.output_cost_per_1k,
            )),
            response_text: text,
            provider_request_count: attempts,
        })
    }

    fn name(&self) -> &'static str {
        "third_party"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_model_name() {
        assert_eq!(vendor_model_name("openai/gpt-4o"), "gpt-4o");
        assert_eq!(vendor_model_name("gemini/models/gemini-1.5"), "models/gemini-1.5");
        assert_eq!(vendor_model_name("plain"), "plain");
    }

    #[test]
    fn test_chunk_text() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(chunk_text(line).as_deref(), Some("Hi"));
        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(chunk_text(role_only).as_deref(), Some(""));
        assert!(chunk_text("data: [DONE]").is_none());
        assert!(chunk_text(": keep-alive").is_none());
    }

    #[test]
    fn test_azure_url_requires_base() {
        let cfg = ThirdPartyConfig::default();
        assert!(matches!(
            cfg.url(ThirdPartyVendor::Azure, "dep"),
            Err(ProviderError::MissingCredential(_))
        ));

        let cfg = ThirdPartyConfig {
            azure_api_base: Some("https://res.openai.azure.com/".into()),
            ..ThirdPartyConfig::default()
        };
        assert_eq!(
            cfg.url(ThirdPartyVendor::Azure, "dep").unwrap(),
            "https://res.openai.azure.com/openai/deployments/dep/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_missing_key() {
        let cfg = ThirdPartyConfig::default();
        let err = cfg.api_key(ThirdPartyVendor::Gemini).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing credential: environment variable GOOGLE_API is not set"
        );
    }
}
