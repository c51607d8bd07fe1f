use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            url: format!("{base_url}/chat/completions"),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
    ) -> Result<ChatResponse> {
        let req = OpenAiChatRequest::new(&self.model, messages, tools, temperature);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "openai chat status={status} body={body}"
            )));
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OpenAiChatRequest {
    fn new(
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: Option<f32>,
    ) -> Self {
        let tools: Vec<OpenAiTool> = tools.iter().map(to_openai_tool).collect();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());
        Self {
            model: model.to_string(),
            messages: messages.iter().map(to_openai_message).collect(),
            tools,
            tool_choice,
            temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiToolFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiToolFunction {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

fn to_openai_tool(t: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        r#type: "function".to_string(),
        function: OpenAiToolFunction {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn to_openai_message(m: &ChatMessage) -> OpenAiMessage {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    OpenAiMessage {
        role: role.to_string(),
        content: Some(m.content.clone()).filter(|s| !s.is_empty()),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    // OpenAI sends `null` here when the model answers in plain text.
    #[serde(default, deserialize_with = "null_as_empty")]
    tool_calls: Vec<OpenAiChoiceToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: OpenAiChoiceToolCallFunction,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiChoiceToolCallFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl TryFrom<OpenAiChatResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: OpenAiChatResponse) -> Result<Self> {
        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("openai response missing choices".to_string())
        })?;

        let usage = v.usage.unwrap_or(OpenAiUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
            },
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
