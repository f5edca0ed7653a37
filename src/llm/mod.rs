//! LLM provider transport.
//!
//! A thin chat client over the provider's HTTP API with bounded,
//! timeout-guarded retries. Agents never talk to the network directly;
//! they go through [`LlmClient::chat`] after reserving budget.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;

/// Base delay for exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Transport-level failure of one chat call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,
    #[error("cannot connect to provider")]
    Connect,
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unparseable provider response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Transient failures are worth a bounded retry: timeouts, connection
    /// refusals, rate limits, and provider-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout | LlmError::Connect => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Transport(_) | LlmError::Malformed(_) => false,
        }
    }
}

/// Retry `op` up to `attempts` times, backing off exponentially between
/// transient failures. Permanent failures return immediately; the retry
/// count is a hard bound, never a loop.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: usize,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt as u32);
                debug!(
                    "Transient call failure (attempt {}/{}), retrying in {:?}: {}",
                    attempt + 1,
                    attempts,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Chat client for the configured provider endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http, config })
    }

    /// Send one system+user exchange and return the reply text, retrying
    /// transient failures up to the configured bound.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        retry_with_backoff(self.config.retries, || self.send_once(system, user)).await
    }

    async fn send_once(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.endpoint_url);

        let request = ChatRequest {
            model: self.config.name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.config.temperature,
            },
        };

        let mut builder = self.http.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else if e.is_connect() {
                LlmError::Connect
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

/// Pull a JSON object out of a possibly noisy model reply.
///
/// Tries, in order: a ```json fenced block, a generic fenced block, the
/// outermost brace span, then the whole reply.
pub fn parse_json_response(response: &str) -> Option<Value> {
    let response = response.trim();
    if response.is_empty() {
        return None;
    }

    if let Some(start) = response.find("```json") {
        let rest = &response[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            if let Ok(value) = serde_json::from_str(rest[..end].trim()) {
                return Some(value);
            }
        }
    }

    if let Some(start) = response.find("```") {
        let rest = &response[start + "```".len()..];
        if let Some(end) = rest.find("```") {
            if let Ok(value) = serde_json::from_str(rest[..end].trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(l), Some(r)) = (response.find('{'), response.rfind('}')) {
        if r > l {
            if let Ok(value) = serde_json::from_str(&response[l..=r]) {
                return Some(value);
            }
        }
    }

    serde_json::from_str(response).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Connect.is_transient());
        assert!(LlmError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(LlmError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!LlmError::Malformed("x".to_string()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_two_timeouts() {
        // Two timeouts, then success, within a bound of three attempts.
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Timeout)
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_is_hard() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Connect) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = retry_with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::Status {
                    status: 400,
                    body: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here you go:\n```json\n{\"score\": 0.5}\n```\nDone.";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value["score"], 0.5);
    }

    #[test]
    fn test_parse_generic_fence() {
        let raw = "```\n{\"ok\": true}\n```";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_parse_embedded_braces() {
        let raw = "The result is {\"count\": 3} as requested.";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_json_response("no json here").is_none());
        assert!(parse_json_response("").is_none());
    }
}
