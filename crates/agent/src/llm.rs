use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use sqlreact_core::config::{ConfigError, LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response could not be decoded: {0}")]
    Decode(String),
    #[error("completion provider returned no text")]
    EmptyResponse,
    #[error("scripted completions exhausted after {calls} calls")]
    ScriptExhausted { calls: usize },
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
}

/// A stateless text-completion capability. One prompt in, one completion out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T> LlmClient for Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        (**self).complete(prompt).await
    }
}

#[async_trait]
impl<T> LlmClient for Box<T>
where
    T: LlmClient + ?Sized,
{
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        (**self).complete(prompt).await
    }
}

/// HTTP completion client for Gemini, OpenAI-compatible and Ollama endpoints.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    temperature: f32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?.cloned();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ConfigError::Validation(format!("could not build llm http client: {error}"))
            })?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.effective_base_url().to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Gemini => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = request_body(self.provider, &self.model, prompt, self.temperature);
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = match self.provider {
                LlmProvider::Gemini => request.header("x-goog-api-key", key.expose_secret()),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    request.bearer_auth(key.expose_secret())
                }
            };
        }

        let response = request.send().await.map_err(|error| {
            warn!(
                event_name = "agent.llm.request_failed",
                provider = self.provider.as_str(),
                error = %error,
                "completion request failed"
            );
            ProviderError::Transport(error.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let payload: Value =
            response.json().await.map_err(|error| ProviderError::Decode(error.to_string()))?;
        let text = extract_text(self.provider, &payload).ok_or(ProviderError::EmptyResponse)?;
        debug!(
            event_name = "agent.llm.completion_received",
            provider = self.provider.as_str(),
            model = %self.model,
            chars = text.len(),
            "completion received"
        );
        Ok(text.trim().to_string())
    }
}

fn request_body(provider: LlmProvider, model: &str, prompt: &str, temperature: f32) -> Value {
    match provider {
        LlmProvider::Gemini => json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": temperature },
        }),
        LlmProvider::OpenAi => json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
        }),
        LlmProvider::Ollama => json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": temperature },
        }),
    }
}

fn extract_text(provider: LlmProvider, payload: &Value) -> Option<String> {
    let text = match provider {
        LlmProvider::Gemini => {
            let parts = payload
                .pointer("/candidates/0/content/parts")
                .and_then(Value::as_array)?
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>();
            parts.concat()
        }
        LlmProvider::OpenAi => {
            payload.pointer("/choices/0/message/content").and_then(Value::as_str)?.to_string()
        }
        LlmProvider::Ollama => payload.get("response").and_then(Value::as_str)?.to_string(),
    };
    (!text.trim().is_empty()).then_some(text)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

/// Replays canned completions in order and records every prompt it was given.
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Result<String, ProviderError>>,
    prompts: Vec<String>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|response| Ok(response.into())))
    }

    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        let state = ScriptState { responses: results.into_iter().collect(), prompts: Vec::new() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => state.prompts.clone(),
            Err(poisoned) => poisoned.into_inner().prompts.clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    pub fn remaining(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.responses.len(),
            Err(poisoned) => poisoned.into_inner().responses.len(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.prompts.push(prompt.to_string());
        let calls = state.prompts.len();
        state.responses.pop_front().unwrap_or(Err(ProviderError::ScriptExhausted { calls }))
    }
}
