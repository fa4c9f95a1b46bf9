//! OpenAI-compatible chat completion client (`/v1/chat/completions`).
//!
//! Works against OpenAI itself, hosted inference routers, and local
//! servers (Ollama, LM Studio) that speak the same protocol. All wire
//! types are private to this module.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes news articles.";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Summarization request failed: {0}")]
    Request(String),
    #[error("Model returned empty or missing content")]
    EmptyResponse,
}

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
/// Cheap to clone; `reqwest::Client` is an Arc internally.
#[derive(Clone)]
pub struct ChatProvider {
    client: reqwest::Client,
    /// Full endpoint URL, e.g. `https://api.openai.com/v1/chat/completions`.
    api_base_url: String,
    model: String,
    temperature: f32,
    /// Per-request deadline. Applied here rather than on the client,
    /// which is shared with the fetcher and the extractor.
    timeout: Duration,
    api_key: Option<SecretString>,
}

impl ChatProvider {
    pub fn new(
        client: reqwest::Client,
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout: Duration,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            api_base_url,
            model,
            temperature,
            timeout,
            api_key,
        }
    }

    /// One round-trip: asks the model for a 2-3 sentence summary.
    pub async fn summarize_article(
        &self,
        title: &str,
        content: &str,
    ) -> Result<String, ProviderError> {
        let prompt = format!(
            "Please provide a concise summary of the following article in 2-3 sentences.\n\n\
             Title: {}\n\nContent: {}\n\nSummary:",
            title, content
        );
        self.complete(&prompt).await
    }

    async fn complete(&self, content: &str) -> Result<String, ProviderError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: content.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: 150,
        };

        tracing::debug!(
            model = %payload.model,
            content_len = content.len(),
            "Sending summarization request"
        );

        let mut request = self
            .client
            .post(&self.api_base_url)
            .timeout(self.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let response = check_status(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(format!("Failed to parse response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

impl std::fmt::Debug for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatProvider")
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    tracing::error!(%status, %message, "Summarization request returned HTTP error");
    Err(ProviderError::Request(message))
}
