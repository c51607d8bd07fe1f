use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::types::{ChatMessage, ChatOptions, ChatResponse, ToolDefinition};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A chat completion service that can be offered tools.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ChatResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Self::with_timeout(api_key, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::InvalidInput("api key is required".to_string()));
        }
        if model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.trim().to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at another OpenAI-compatible endpoint (proxies, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatService for LlmClient {
    #[tracing::instrument(level = "info", skip_all, fields(model))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);
        for tool in tools {
            validate_tool_name(&tool.name)?;
        }
        let c = OpenAiClient::new(self.client.clone(), &self.base_url, &self.api_key, model);
        c.chat(messages, tools, options.temperature).await
    }
}

/// OpenAI tool names must match `^[a-zA-Z0-9_-]{1,64}$`.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(LlmError::InvalidInput(format!(
            "tool name must be 1-64 characters, got {}",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
