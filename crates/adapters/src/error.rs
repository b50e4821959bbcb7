// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Mapping of HTTP failures onto [`ProviderError`].
//!
//! The error code is taken, in order, from the `x-amzn-errortype` header,
//! the body's `__type`/`code` fields, or an OpenAI-style `error` object.
//! When none is present, 429 and 503 fall back to the matching transient
//! codes. A 429 or 503 is always transient, whatever code the vendor used.

use llm_jurybench_core::ProviderError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;

/// Header carrying the error type on AWS-style responses.
pub const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Strip AWS decorations: `Name:http://...` and `namespace#Name`.
fn clean_code(raw: &str) -> String {
    let raw = raw.split(':').next().unwrap_or(raw);
    raw.rsplit('#').next().unwrap_or(raw).trim().to_string()
}

fn body_code(body: &Value) -> Option<String> {
    let nested = body.get("error");
    body.get("__type")
        .or_else(|| body.get("code"))
        .or_else(|| nested.and_then(|e| e.get("code")))
        .or_else(|| nested.and_then(|e| e.get("type")))
        .or_else(|| nested.and_then(|e| e.get("status")))
        .and_then(|v| match v {
            Value::String(s) => Some(clean_code(s)),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

fn body_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("Message"))
        .or_else(|| body.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn fallback_code(status: StatusCode) -> String {
    match status {
        StatusCode::TOO_MANY_REQUESTS => "TooManyRequestsException".to_string(),
        StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailableException".to_string(),
        other => format!("HTTP{}", other.as_u16()),
    }
}

/// Build a [`ProviderError`] from a non-success response.
pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    let code = headers
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(clean_code)
        .filter(|c| !c.is_empty())
        .or_else(|| body_code(&parsed))
        .unwrap_or_else(|| fallback_code(status));
    let message = body_message(&parsed).unwrap_or_else(|| body.trim().to_string());

    match ProviderError::from_code(code, message) {
        ProviderError::Api { code, message }
            if status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::SERVICE_UNAVAILABLE =>
        {
            ProviderError::Throttled { code, message }
        }
        other => other,
    }
}

/// Map a reqwest failure (connect, timeout, body read) to a transport error.
pub fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

/// Read the body of a failed response and classify it.
pub async fn from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let headers = response.headers().clone();
    match response.text().await {
        Ok(body) => classify_response(status, &headers, &body),
        Err(e) => transport(e),
    }
}
