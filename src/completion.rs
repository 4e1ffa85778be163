//! Completion model collaborators.
//!
//! Answering needs exactly one operation from a language model: prompt in,
//! text out. [`OpenAiChatCompletion`] speaks the OpenAI-compatible
//! `chat/completions` wire shape over HTTP; [`MockCompletionProvider`]
//! records prompts and replies with a canned answer for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::RagError;

/// Opaque "text in, text out" collaborator.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat-completion client for OpenAI-compatible endpoints.
pub struct OpenAiChatCompletion {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiChatCompletion {
    /// Builds a client against `base_url` (e.g. `https://api.openai.com/v1/`)
    /// using the given model name.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, RagError> {
        let base = Url::parse(base_url)
            .map_err(|err| RagError::Configuration(format!("invalid base url: {err}")))?;
        let endpoint = base
            .join("chat/completions")
            .map_err(|err| RagError::Configuration(format!("invalid base url: {err}")))?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|err| RagError::Configuration(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key: None,
            model: model.into(),
            temperature: 0.2,
        })
    }

    /// Reads the API key from the `OPENAI_API_KEY` environment variable.
    pub fn from_env(base_url: &str, model: impl Into<String>) -> Result<Self, RagError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RagError::Configuration("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self::new(base_url, model)?.with_api_key(api_key))
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChatCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        if prompt.trim().is_empty() {
            return Err(RagError::InvalidInput("empty prompt".to_string()));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RagError::ModelUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            // Overload and server faults are transient; the rest is on us.
            return if status.is_server_error() || status.as_u16() == 429 {
                Err(RagError::ModelUnavailable(format!("{status}: {detail}")))
            } else {
                Err(RagError::InvalidInput(format!("{status}: {detail}")))
            };
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| RagError::ModelUnavailable(format!("malformed response: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

/// Test double that records every prompt and returns a fixed answer.
pub struct MockCompletionProvider {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionProvider {
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        if prompt.trim().is_empty() {
            return Err(RagError::InvalidInput("empty prompt".to_string()));
        }
        self.prompts.lock().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}
