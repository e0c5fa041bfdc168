use std::time::Duration;

use async_trait::async_trait;
use cloudquote_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion response carried no text")]
    Empty,
}

impl LlmError {
    /// Transport hiccups, throttling and server errors are worth one more attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Empty => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Text completion service. Implementations return the raw model text; callers
/// treat it as untrusted.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

pub fn build_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>, LlmError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|error| LlmError::Transport(error.to_string()))?;
    let base_url = config.endpoint().trim_end_matches('/').to_string();
    let model = config.model.clone();

    Ok(match config.provider {
        LlmProvider::Ollama => Box::new(OllamaClient { http, base_url, model }),
        LlmProvider::OpenAi => Box::new(OpenAiClient {
            http,
            base_url,
            model,
            api_key: config.api_key.clone().unwrap_or_else(|| SecretString::from(String::new())),
        }),
        LlmProvider::Anthropic => Box::new(AnthropicClient {
            http,
            base_url,
            model,
            api_key: config.api_key.clone().unwrap_or_else(|| SecretString::from(String::new())),
        }),
    })
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            stream: false,
            format: "json",
        };
        let response = self.http.post(format!("{}/api/chat", self.base_url)).json(&request);
        let body: OllamaResponse = send(response).await?;
        non_empty(body.message.map(|message| message.content))
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: 0.2,
        };
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request);
        let body: OpenAiResponse = send(response).await?;
        non_empty(body.choices.into_iter().next().and_then(|choice| choice.message.content))
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = AnthropicRequest {
            model: &self.model,
            system,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: 2048,
        };
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&request);
        let body: AnthropicResponse = send(response).await?;
        let text =
            body.content.into_iter().filter_map(|block| block.text).collect::<Vec<_>>().join("");
        non_empty(Some(text))
    }
}

async fn send<T: for<'de> Deserialize<'de>>(request: reqwest::RequestBuilder) -> Result<T, LlmError> {
    let response = request.send().await.map_err(|error| {
        if error.is_timeout() {
            LlmError::Transport(format!("request timed out: {error}"))
        } else {
            LlmError::Transport(error.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status { status: status.as_u16(), body: truncate(&body, 256) });
    }

    response.json::<T>().await.map_err(|error| LlmError::Transport(error.to_string()))
}

fn non_empty(text: Option<String>) -> Result<String, LlmError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::Empty),
    }
}

fn truncate(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cloudquote_core::config::{AppConfig, LlmProvider};

    use super::{build_client, non_empty, truncate, LlmError};

    #[test]
    fn retryable_errors_cover_throttling_and_server_faults() {
        assert!(LlmError::Timeout(Duration::from_secs(12)).is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
    }

    #[test]
    fn blank_completion_is_an_error() {
        assert!(matches!(non_empty(Some("  \n".to_string())), Err(LlmError::Empty)));
        assert!(matches!(non_empty(None), Err(LlmError::Empty)));
        assert_eq!(non_empty(Some("{}".to_string())).ok().as_deref(), Some("{}"));
    }

    #[test]
    fn error_bodies_are_truncated_on_char_boundaries() {
        assert_eq!(truncate("ééééé", 2), "éé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn every_provider_builds_a_client() {
        for provider in [LlmProvider::Ollama, LlmProvider::OpenAi, LlmProvider::Anthropic] {
            let mut config = AppConfig::default().llm;
            config.provider = provider;
            assert!(build_client(&config).is_ok());
        }
    }
}
