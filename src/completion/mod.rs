//! Text-completion clients used for table extraction and grounded chat.
//!
//! Two adapters are provided: an Ollama runtime (`/api/generate`) and any OpenAI-compatible
//! chat completions endpoint. Both apply an explicit per-request timeout and report it as
//! [`CompletionError::Timeout`] so callers can decide whether to retry.

use crate::config::{CompletionProvider, Config};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached or refused the request.
    #[error("Completion provider unavailable: {0}")]
    Unavailable(String),
    /// Provider did not answer within the configured timeout.
    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),
    /// Provider answered with an error status.
    #[error("Completion failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Black-box text completion.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn invoke(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Identifier of the model answering requests, recorded for provenance.
    fn model_name(&self) -> &str;
}

/// Build the completion client selected by configuration.
pub fn build_completion_client(
    config: &Config,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let timeout = Duration::from_secs(config.completion_timeout_secs);
    let http = Client::builder()
        .user_agent("ragpipe/completion")
        .build()
        .map_err(|err| CompletionError::Unavailable(err.to_string()))?;

    let client: Arc<dyn CompletionClient> = match config.completion_provider {
        CompletionProvider::Ollama => Arc::new(OllamaCompletionClient {
            http,
            base_url: config.completion_url.clone(),
            model: config.completion_model.clone(),
            timeout,
        }),
        CompletionProvider::OpenAI => Arc::new(OpenAiCompletionClient {
            http,
            base_url: config.completion_url.clone(),
            model: config.completion_model.clone(),
            api_key: config.completion_api_key.clone(),
            timeout,
        }),
    };
    tracing::info!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        "Completion client initialized"
    );
    Ok(client)
}

fn map_send_error(error: reqwest::Error, base_url: &str, timeout: Duration) -> CompletionError {
    if error.is_timeout() {
        CompletionError::Timeout(timeout)
    } else {
        CompletionError::Unavailable(format!("failed to reach {base_url}: {error}"))
    }
}

async fn error_for_status(response: reqwest::Response) -> CompletionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND || status == StatusCode::SERVICE_UNAVAILABLE {
        CompletionError::Unavailable(format!("provider returned {status}: {body}"))
    } else {
        CompletionError::GenerationFailed(format!("provider returned {status}: {body}"))
    }
}

pub(crate) struct OllamaCompletionClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default = "default_done")]
    done: bool,
}

fn default_done() -> bool {
    true
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn invoke(&self, prompt: &str) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.1 }
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| map_send_error(err, &self.base_url, self.timeout))?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: OllamaResponse = response.json().await.map_err(|err| {
            if err.is_timeout() {
                CompletionError::Timeout(self.timeout)
            } else {
                CompletionError::InvalidResponse(format!("failed to decode Ollama response: {err}"))
            }
        })?;

        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        Ok(body.response.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub(crate) struct OpenAiCompletionClient {
    pub(crate) http: Client,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn invoke(&self, prompt: &str) -> Result<String, CompletionError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
            "max_tokens": 4000
        });

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_send_error(err, &self.base_url, self.timeout))?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|err| {
            CompletionError::InvalidResponse(format!("failed to decode completion: {err}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::InvalidResponse("response had no choices".into()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
