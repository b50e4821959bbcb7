// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Provider capability traits and the normalized invocation result.
//!
//! Every backend, streaming or not, is reduced to the same contract:
//! [`InferenceProvider::invoke`] takes a [`Scenario`] and returns an
//! [`InvocationResult`] with text, token counts, timing and cost, or a
//! [`ProviderError`] that the [`crate::retry::RetryPolicy`] can classify.
//!
//! The backend for a scenario is chosen once, when the scenario is built,
//! and carried as a [`ProviderKind`]. The engine then looks the provider up
//! in a [`ProviderSet`] instead of inspecting model id strings per call.

use crate::scenario::Scenario;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Error codes that the retry policy treats as transient.
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "ServiceUnavailableException",
    "ModelErrorException",
];

/// Errors returned by provider and judge calls.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Throttling, rate limiting or transient service failure
    #[error("{code} {message}")]
    Throttled {
        /// Provider error code
        code: String,
        /// Provider error message
        message: String,
    },

    /// Non-retryable client or service error
    #[error("{code} {message}")]
    Api {
        /// Provider error code
        code: String,
        /// Provider error message
        message: String,
    },

    /// Connection, timeout or stream read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("malformed provider response: {0}")]
    Decode(String),

    /// Credential expected in the environment is absent
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// Transient errors persisted past the retry budget
    #[error("maximum retry attempts reached after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first call
        attempts: u32,
        /// Error returned by the final attempt
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Build an error from a provider error code, classifying it as
    /// transient when the code is one of [`TRANSIENT_ERROR_CODES`].
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if TRANSIENT_ERROR_CODES.contains(&code.as_str()) {
            Self::Throttled { code, message }
        } else {
            Self::Api { code, message }
        }
    }

    /// Whether the retry policy should back off and try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Short error code recorded alongside failed invocations.
    pub fn code(&self) -> &str {
        match self {
            Self::Throttled { code, .. } | Self::Api { code, .. } => code,
            Self::Transport(_) => "TransportError",
            Self::Decode(_) => "DecodeError",
            Self::MissingCredential(_) => "MissingCredential",
            Self::RetriesExhausted { last, .. } => last.code(),
        }
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Third-party vendors reached through an OpenAI-compatible chat API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThirdPartyVendor {
    /// OpenAI
    OpenAI,
    /// Google Gemini
    Gemini,
    /// Azure OpenAI deployments
    Azure,
}

impl ThirdPartyVendor {
    fn from_model_id(model_id: &str) -> Self {
        if model_id.contains("gemini") {
            Self::Gemini
        } else if model_id.contains("azure") {
            Self::Azure
        } else {
            Self::OpenAI
        }
    }

    /// Environment variable holding the API key for this vendor.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API",
            Self::Gemini => "GOOGLE_API",
            Self::Azure => "AZURE_API_KEY",
        }
    }
}

impl std::fmt::Display for ThirdPartyVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
            Self::Azure => "azure",
        };
        write!(f, "{}", name)
    }
}

/// Backend variant serving a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Streaming Converse API (Bedrock-style model ids)
    Converse,
    /// Non-streaming third-party vendor (`vendor/model` ids)
    ThirdParty(ThirdPartyVendor),
}

impl ProviderKind {
    /// Resolve the backend for a model id.
    ///
    /// Ids of the form `vendor/model` go to a third-party vendor, everything
    /// else is served by the Converse API.
    pub fn resolve(model_id: &str) -> Self {
        if model_id.contains('/') {
            Self::ThirdParty(ThirdPartyVendor::from_model_id(model_id))
        } else {
            Self::Converse
        }
    }
}

/// Inference parameters sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling cutoff
    pub top_p: f64,
}

/// Normalized outcome of one successful provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Seconds until the first content arrived
    pub time_to_first_byte: Option<f64>,
    /// Seconds until the response completed
    pub time_to_last_byte: Option<f64>,
    /// Output tokens per second, absent when it cannot be computed
    #[serde(rename = "throughput_tps")]
    pub throughput_tokens_per_sec: Option<f64>,
    /// Prompt tokens
    pub input_tokens: Option<u64>,
    /// Completion tokens
    pub output_tokens: Option<u64>,
    /// Cost of the call in USD
    pub response_cost: Option<f64>,
    /// Generated text
    #[serde(rename = "model_response")]
    pub response_text: String,
    /// Requests sent to the provider, retries included
    #[serde(rename = "inference_request_count")]
    pub provider_request_count: u32,
}

impl InvocationResult {
    /// Output tokens per second over the full response time, rounded to
    /// two decimals. `None` when either input is missing or the duration is
    /// not positive.
    pub fn throughput(output_tokens: Option<u64>, time_to_last_byte: Option<f64>) -> Option<f64> {
        match (output_tokens, time_to_last_byte) {
            (Some(tokens), Some(secs)) if secs > 0.0 => {
                Some(crate::cost::round_to(tokens as f64 / secs, 2))
            }
            _ => None,
        }
    }
}

/// Capability interface implemented by every inference backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Run the scenario's prompt against its model.
    async fn invoke(&self, scenario: &Scenario) -> Result<InvocationResult>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}

/// One provider per [`ProviderKind`] family.
#[derive(Clone)]
pub struct ProviderSet {
    converse: Arc<dyn InferenceProvider>,
    third_party: Arc<dyn InferenceProvider>,
}

impl ProviderSet {
    /// Create a provider set from the two backend families.
    pub fn new(
        converse: Arc<dyn InferenceProvider>,
        third_party: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            converse,
            third_party,
        }
    }

    /// Provider serving the given kind.
    pub fn resolve(&self, kind: ProviderKind) -> &Arc<dyn InferenceProvider> {
        match kind {
            ProviderKind::Converse => &self.converse,
            ProviderKind::ThirdParty(_) => &self.third_party,
        }
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("converse", &self.converse.name())
            .field("third_party", &self.third_party.name())
            .finish()
    }
}
