use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::AppConfig;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Category attached to a completion failure. Serialized into API
/// error payloads so clients can tell a quota problem from an outage.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    RateLimited,
    QuotaExhausted,
    InvalidCredentials,
    MalformedRequest,
    UpstreamUnavailable,
    Unknown,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Too many requests. Please try again in a few moments.")]
    RateLimited,
    #[error("API quota exceeded. Please check your billing status.")]
    QuotaExhausted,
    #[error("API key is invalid or expired. Please check your API configuration.")]
    InvalidCredentials,
    #[error("Invalid completion request: {0}")]
    MalformedRequest(String),
    #[error("Completion API is currently unavailable. Please try again later.")]
    Unavailable,
    #[error("Failed to get a completion: {0}")]
    Other(String),
}

impl CompletionError {
    pub fn kind(&self) -> CompletionKind {
        match self {
            CompletionError::RateLimited => CompletionKind::RateLimited,
            CompletionError::QuotaExhausted => CompletionKind::QuotaExhausted,
            CompletionError::InvalidCredentials => CompletionKind::InvalidCredentials,
            CompletionError::MalformedRequest(_) => CompletionKind::MalformedRequest,
            CompletionError::Unavailable => CompletionKind::UpstreamUnavailable,
            CompletionError::Other(_) => CompletionKind::Unknown,
        }
    }
}

/// Client for an OpenAI-compatible chat completions API. Constructed
/// once at startup and shared by all requests.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: config.openai_api_hostname.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.completion_timeout_secs),
        }
    }

    /// Request the next reply for an ordered list of turns. Timeouts
    /// and connection failures surface as `Unavailable` like any other
    /// upstream outage.
    pub async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.api_hostname.trim_end_matches("/")
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let raw = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &raw));
        }

        let body: Value =
            serde_json::from_str(&raw).map_err(|e| CompletionError::Other(e.to_string()))?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::Other(format!("missing completion content in: {}", raw)))
    }
}

fn transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() || err.is_connect() {
        CompletionError::Unavailable
    } else {
        CompletionError::Other(err.to_string())
    }
}

/// Map upstream error responses to the failure taxonomy. The error
/// body is best-effort parsed since some gateways return plain text.
fn status_error(status: u16, raw: &str) -> CompletionError {
    let body: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    let code = body["error"]["code"].as_str().unwrap_or_default();
    let detail = body["error"]["message"].as_str().unwrap_or("no error detail");
    match status {
        429 if code == "insufficient_quota" => CompletionError::QuotaExhausted,
        429 => CompletionError::RateLimited,
        401 => CompletionError::InvalidCredentials,
        400 => CompletionError::MalformedRequest(detail.to_string()),
        503 => CompletionError::Unavailable,
        _ => CompletionError::Other(format!("unexpected status {}: {}", status, detail)),
    }
}
