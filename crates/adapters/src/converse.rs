// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Converse API adapters.
//!
//! [`ConverseProvider`] streams target-model responses from
//! `/model/{id}/converse-stream` and measures time to first and last byte.
//! [`ConverseJudgeClient`] makes the plain, non-streaming `/model/{id}/converse`
//! calls used by the judge panel.
//!
//! The runtime endpoint answers with binary
//! `application/vnd.amazon.eventstream` frames (see [`crate::eventstream`]),
//! each carrying one event named by its `:event-type` header. Any other
//! content type is read as newline-delimited JSON with the event name as
//! the outer key, which is how relaying proxies forward the same events:
//!
//! ```text
//! {"contentBlockDelta":{"delta":{"text":"Hel"},"contentBlockIndex":0}}
//! {"contentBlockDelta":{"delta":{"text":"lo"},"contentBlockIndex":0}}
//! {"messageStop":{"stopReason":"end_turn"}}
//! {"metadata":{"usage":{"inputTokens":12,"outputTokens":2}}}
//! ```

use crate::error::{self, transport};
use crate::eventstream::{
    self, EventMessage, EventStreamDecoder, EVENT_TYPE_HEADER, EXCEPTION_TYPE_HEADER,
    MESSAGE_TYPE_HEADER,
};
use crate::stream::LineBuffer;
use async_trait::async_trait;
use futures::StreamExt;
use llm_jurybench_core::cost::{round_to, token_cost};
use llm_jurybench_core::judge::JudgeReply;
use llm_jurybench_core::provider::Result;
use llm_jurybench_core::{
    InferenceConfig, InferenceProvider, InvocationResult, JudgeClient, JudgeProfile,
    ProviderError, RetryPolicy, Scenario,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default endpoint; `{region}` is replaced per call.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://bedrock-runtime.{region}.amazonaws.com";

/// Environment variable holding the bearer token.
pub const BEARER_TOKEN_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

/// Connection settings shared by the Converse provider and judge client.
#[derive(Debug, Clone)]
pub struct ConverseConfig {
    /// Endpoint URL, optionally containing `{region}`
    pub endpoint_template: String,
    /// Bearer token sent as `Authorization`
    pub bearer_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ConverseConfig {
    fn default() -> Self {
        Self {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            bearer_token: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ConverseConfig {
    /// Defaults with the bearer token taken from [`BEARER_TOKEN_ENV`].
    pub fn from_env() -> Self {
        Self {
            bearer_token: std::env::var(BEARER_TOKEN_ENV).ok(),
            ..Self::default()
        }
    }

    /// Override the endpoint template.
    pub fn with_endpoint(mut self, endpoint_template: impl Into<String>) -> Self {
        self.endpoint_template = endpoint_template.into();
        self
    }

    fn url(&self, region: &str, model_id: &str, operation: &str) -> String {
        let base = self.endpoint_template.replace("{region}", region);
        format!(
            "{}/model/{}/{}",
            base.trim_end_matches('/'),
            model_id,
            operation
        )
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(transport)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn user_message(text: &str) -> Value {
    json!([{ "role": "user", "content": [{ "text": text }] }])
}

/// Request body for a streamed target-model call.
pub fn stream_request_body(scenario: &Scenario) -> Value {
    json!({
        "messages": user_message(&format!("\n##USER:{}", scenario.prompt)),
        "inferenceConfig": scenario.inference_config(),
        "performanceConfig": { "latency": scenario.inference_profile },
    })
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    #[serde(default)]
    delta: Option<TextDelta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamEvent {
    #[serde(default)]
    content_block_delta: Option<ContentBlockDelta>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Exceptions arrive as `throttlingException`; codes are compared capitalized.
fn stream_exception(name: &str, body: &Value) -> ProviderError {
    let mut code = name.to_string();
    if let Some(first) = code.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    ProviderError::from_code(code, message)
}

/// Running state of one Converse stream.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    text: String,
    first_text_at: Option<Duration>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl StreamMetrics {
    /// Fold one event line received `elapsed` after the request was sent.
    ///
    /// Exception events embedded in the stream are returned as errors.
    pub fn apply(&mut self, line: &str, elapsed: Duration) -> Result<()> {
        let event: StreamEvent = serde_json::from_str(line)
            .map_err(|e| ProviderError::Decode(format!("stream event: {e}")))?;
        self.apply_event(event, elapsed)
    }

    /// Fold one event-stream message received `elapsed` after the request
    /// was sent.
    ///
    /// `exception` and `error` messages are returned as errors.
    pub fn apply_message(&mut self, message: &EventMessage, elapsed: Duration) -> Result<()> {
        let payload: Value = if message.payload.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&message.payload)
                .map_err(|e| ProviderError::Decode(format!("event payload: {e}")))?
        };

        match message.header(MESSAGE_TYPE_HEADER) {
            Some("event") => {
                let Some(name) = message.header(EVENT_TYPE_HEADER) else {
                    return Ok(());
                };
                let mut wrapped = Map::new();
                wrapped.insert(name.to_string(), payload);
                let event: StreamEvent = serde_json::from_value(Value::Object(wrapped))
                    .map_err(|e| ProviderError::Decode(format!("stream event {name}: {e}")))?;
                self.apply_event(event, elapsed)
            }
            Some("exception") => Err(stream_exception(
                message
                    .header(EXCEPTION_TYPE_HEADER)
                    .unwrap_or("UnknownException"),
                &payload,
            )),
            other => Err(ProviderError::Api {
                code: message
                    .header(":error-code")
                    .unwrap_or("EventStreamError")
                    .to_string(),
                message: message
                    .header(":error-message")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("unexpected message type {other:?}")),
            }),
        }
    }

    fn apply_event(&mut self, event: StreamEvent, elapsed: Duration) -> Result<()> {
        if let Some(text) = event
            .content_block_delta
            .and_then(|d| d.delta)
            .and_then(|d| d.text)
        {
            if self.first_text_at.is_none() {
                self.first_text_at = Some(elapsed);
            }
            self.text.push_str(&text);
        }

        if let Some(usage) = event.metadata.and_then(|m| m.usage) {
            self.input_tokens = usage.input_tokens;
            self.output_tokens = usage.output_tokens;
        }

        if let Some((name, body)) = event.other.iter().find(|(k, _)| k.ends_with("Exception")) {
            return Err(stream_exception(name, body));
        }

        Ok(())
    }

    /// Produce the invocation result once the stream has ended.
    pub fn finish(
        self,
        total: Duration,
        input_cost_per_1k: f64,
        output_cost_per_1k: f64,
        provider_request_count: u32,
    ) -> InvocationResult {
        let (ttfb, ttlb) = match self.first_text_at {
            Some(first) => (
                Some(round_to(first.as_secs_f64(), 4)),
                Some(round_to(total.as_secs_f64(), 4)),
            ),
            None => (None, None),
        };
        let response_cost = match (self.input_tokens, self.output_tokens) {
            (Some(i), Some(o)) => Some(token_cost(i, o, input_cost_per_1k, output_cost_per_1k)),
            _ => None,
        };

        InvocationResult {
            time_to_first_byte: ttfb,
            time_to_last_byte: ttlb,
            throughput_tokens_per_sec: InvocationResult::throughput(self.output_tokens, ttlb),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            response_cost,
            response_text: self.text,
            provider_request_count,
        }
    }
}

/// Streaming provider for Converse models.
#[derive(Debug, Clone)]
pub struct ConverseProvider {
    client: reqwest::Client,
    config: ConverseConfig,
    retry: RetryPolicy,
}

impl ConverseProvider {
    /// Create a provider.
    pub fn new(config: ConverseConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            config,
            retry,
        })
    }

    async fn open_stream(&self, url: &str, body: &Value) -> Result<(Instant, reqwest::Response)> {
        let start = Instant::now();
        let response = self
            .config
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok((start, response))
        } else {
            Err(error::from_response(response).await)
        }
    }
}

#[async_trait]
impl InferenceProvider for ConverseProvider {
    async fn invoke(&self, scenario: &Scenario) -> Result<InvocationResult> {
        let url = self
            .config
            .url(&scenario.region, &scenario.model_id, "converse-stream");
        let body = stream_request_body(scenario);
        let label = format!("model {}", scenario.model_id);

        let ((start, response), attempts) = self
            .retry
            .run(&label, || self.open_stream(&url, &body))
            .await?;

        let framed = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(eventstream::CONTENT_TYPE));

        let mut metrics = StreamMetrics::default();
        let mut stream = response.bytes_stream();
        if framed {
            let mut frames = EventStreamDecoder::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(transport)?;
                for message in frames.feed(&chunk)? {
                    metrics.apply_message(&message, start.elapsed())?;
                }
            }
            frames.finish()?;
        } else {
            let mut lines = LineBuffer::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(transport)?;
                for line in lines.feed(&chunk)? {
                    metrics.apply(&line, start.elapsed())?;
                }
            }
            if let Some(tail) = lines.finish()? {
                metrics.apply(&tail, start.elapsed())?;
            }
        }
        let total = start.elapsed();

        debug!(
            model_id = %scenario.model_id,
            input_tokens = ?metrics.input_tokens,
            output_tokens = ?metrics.output_tokens,
            "converse stream complete"
        );

        Ok(metrics.finish(
            total,
            scenario.input_cost_per_1k,
            scenario.output_cost_per_1k,
            attempts,
        ))
    }

    fn name(&self) -> &'static str {
        "converse"
    }
}

#[derive(Debug, Deserialize)]
struct ConverseContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    content: Vec<ConverseContent>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
    #[serde(default)]
    usage: Usage,
}

/// Non-streaming Converse client used for judge calls.
#[derive(Debug, Clone)]
pub struct ConverseJudgeClient {
    client: reqwest::Client,
    config: ConverseConfig,
}

impl ConverseJudgeClient {
    /// Create a judge client.
    pub fn new(config: ConverseConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }
}

#[async_trait]
impl JudgeClient for ConverseJudgeClient {
    async fn complete(
        &self,
        judge: &JudgeProfile,
        prompt: &str,
        config: &InferenceConfig,
    ) -> Result<JudgeReply> {
        let url = self.config.url(&judge.region, &judge.model_id, "converse");
        let body = json!({
            "messages": user_message(prompt),
            "inferenceConfig": config,
        });

        let response = self
            .config
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(error::from_response(response).await);
        }

        let parsed: ConverseResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let text = parsed
            .output
            .message
            .content
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .ok_or_else(|| ProviderError::Decode("response has no text content".to_string()))?;

        Ok(JudgeReply {
            text,
            input_tokens: parsed.usage.input_tokens.unwrap_or(0),
            output_tokens: parsed.usage.output_tokens.unwrap_or(0),
        })
    }
}
