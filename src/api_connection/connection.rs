use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error};

use super::endpoints::{
    ChatCompletionRequest, ChatCompletionResponse, Provider, OPENAI_MODEL, OPENROUTER_MODEL,
};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found for provider: {0}")]
    MissingApiKey(&'static str),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("API error {status}: {error_body}")]
    ApiError {
        status: StatusCode,
        error_body: String,
    },
    #[error("No response content from AI")]
    EmptyCompletion,
}

impl ApiConnectionError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiConnectionError::ApiError { status, .. } => Some(*status),
            ApiConnectionError::NetworkError(err) => err.status(),
            _ => None,
        }
    }
}

impl Provider {
    pub fn openrouter(api_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self::OpenRouter {
            api_key: api_key.into(),
            url: url.into(),
        }
    }

    pub fn openai(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::OpenAi {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter { .. } => "openrouter",
            Provider::OpenAi { .. } => "openai",
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            Provider::OpenRouter { .. } => OPENROUTER_MODEL,
            Provider::OpenAi { .. } => OPENAI_MODEL,
        }
    }

    /// Fixed `(temperature, max_tokens)` used for conversational replies.
    pub fn chat_sampling(&self) -> (Option<f32>, Option<u32>) {
        match self {
            Provider::OpenRouter { .. } => (None, None),
            Provider::OpenAi { .. } => (Some(0.7), Some(800)),
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            Provider::OpenRouter { url, .. } => url.clone(),
            Provider::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
        }
    }

    fn api_key(&self) -> &str {
        match self {
            Provider::OpenRouter { api_key, .. } | Provider::OpenAi { api_key, .. } => api_key,
        }
    }

    pub async fn call_chat_completion(
        &self,
        client: &Client,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        let api_key = self.api_key();
        if api_key.is_empty() {
            return Err(ApiConnectionError::MissingApiKey(self.name()));
        }

        let url = self.endpoint();
        debug!(provider = self.name(), model = %request.model, messages = request.messages.len(), "sending chat completion");

        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            let body = response.bytes().await?;
            let chat_response = serde_json::from_slice::<ChatCompletionResponse>(&body)?;
            Ok(chat_response)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider = self.name(), %status, "chat completion rejected upstream");
            Err(ApiConnectionError::ApiError { status, error_body })
        }
    }
}
