//! Single-round tool selection against the Rememberizer tools.
//!
//! The model picks at most one tool, the tool runs once, and the result is
//! wrapped into an instructional context block. The answer itself is composed
//! by the caller with a second chat call.

use crate::bindings::{HttpMethod, ToolBindings};
use crate::catalog::{ToolDescriptor, standard_tools};
use crate::error::ToolError;
use crate::rememberizer::{BearerToken, RememberizerApi};
use rz_llm::{ChatMessage, ChatOptions, ChatService, ToolCall};
use serde_json::{Map, Value};
use thiserror::Error;

pub const SYSTEM_PERSONA: &str = "You are a friendly AI assistant.";
pub const NO_CONTEXT_PROVIDED: &str = "No context provided";
pub const DEFAULT_FUNCTION_CALLING_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Instructional block carrying the fetched knowledge.
    Context(String),
    /// The model chose not to call a tool.
    NoContext,
    /// Something failed; the reason has already been logged.
    Unavailable(UnavailableReason),
}

impl HandleOutcome {
    /// Text to hand to the answer-composition call. Failures collapse to "".
    pub fn as_context(&self) -> &str {
        match self {
            HandleOutcome::Context(text) => text,
            HandleOutcome::NoContext => NO_CONTEXT_PROVIDED,
            HandleOutcome::Unavailable(_) => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnavailableReason {
    #[error("tool selection failed: {0}")]
    Llm(String),

    #[error("tool arguments are not a JSON object: {0}")]
    MalformedArguments(String),

    #[error("function {0} not found in the list of functions")]
    UnknownTool(String),

    #[error("tool arguments rejected: {0}")]
    InvalidArguments(String),

    #[error("request could not be built: {0}")]
    Request(String),
}

impl From<ToolError> for UnavailableReason {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::UnknownTool(name) => Self::UnknownTool(name),
            ToolError::InvalidArguments(msg) => Self::InvalidArguments(msg),
            other => Self::Request(other.to_string()),
        }
    }
}

/// Tool name and parsed arguments taken from the model's first tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn from_tool_call(call: &ToolCall) -> Result<Self, UnavailableReason> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(UnavailableReason::MalformedArguments(format!(
                        "expected object, got {other}"
                    )));
                }
                Err(e) => return Err(UnavailableReason::MalformedArguments(e.to_string())),
            }
        };
        Ok(Self {
            tool_name: call.name.clone(),
            arguments,
        })
    }
}

pub struct Orchestrator {
    api: RememberizerApi,
    model: String,
    tools: Vec<ToolDescriptor>,
    bindings: ToolBindings,
}

impl Orchestrator {
    pub fn new(api: RememberizerApi, model: &str) -> Self {
        Self {
            api,
            model: model.to_string(),
            tools: standard_tools(),
            bindings: ToolBindings::standard(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_bindings(mut self, bindings: ToolBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api(&self) -> &RememberizerApi {
        &self.api
    }

    /// Never fails: every error is logged and surfaced as [`HandleOutcome::Unavailable`].
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn handle(
        &self,
        question: &str,
        token: &BearerToken,
        llm: &dyn ChatService,
    ) -> HandleOutcome {
        match self.try_handle(question, token, llm).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::error!(
                    error = %reason,
                    detail = ?reason,
                    "something went wrong while connecting with rememberizer"
                );
                HandleOutcome::Unavailable(reason)
            }
        }
    }

    async fn try_handle(
        &self,
        question: &str,
        token: &BearerToken,
        llm: &dyn ChatService,
    ) -> Result<HandleOutcome, UnavailableReason> {
        let messages = [ChatMessage::system(SYSTEM_PERSONA), ChatMessage::user(question)];
        let tool_defs: Vec<_> = self.tools.iter().map(ToolDescriptor::to_llm_tool_def).collect();
        let options = ChatOptions::default().with_model(&self.model);

        let response = llm
            .chat(&messages, &tool_defs, &options)
            .await
            .map_err(|e| UnavailableReason::Llm(e.to_string()))?;

        let tool_calls = &response.message.tool_calls;
        let Some(first) = tool_calls.first() else {
            tracing::debug!("model selected no tool");
            return Ok(HandleOutcome::NoContext);
        };
        if tool_calls.len() > 1 {
            tracing::warn!(
                tool_calls = tool_calls.len(),
                "model requested several tools; only the first is used"
            );
        }

        let invocation = ToolInvocation::from_tool_call(first)?;
        let binding = self.bindings.resolve(&invocation.tool_name)?;
        let descriptor = self
            .tools
            .iter()
            .find(|t| t.name == invocation.tool_name)
            .ok_or_else(|| UnavailableReason::UnknownTool(invocation.tool_name.clone()))?;
        descriptor.validate_arguments(&invocation.arguments)?;

        let arguments = Value::Object(invocation.arguments.clone());
        tracing::debug!(
            tool = %invocation.tool_name,
            arguments = %arguments,
            "calling tool"
        );
        let result = self
            .api
            .authorized(token)
            .invoke_binding(binding, invocation.arguments)
            .await?;
        tracing::info!(
            tool = %binding.tool_name,
            success = result.success,
            "tool call executed"
        );

        let extra_content = responses_to_text(question, &result.payload);
        Ok(HandleOutcome::Context(extra_knowledge_message(
            &extra_content,
            binding.method,
        )))
    }
}

pub fn responses_to_text(user_message: &str, response: &Value) -> String {
    format!("Knowledge source: Rememberizer\n\tUser: {user_message}\n\tResponse: {response}\n\n")
}

pub fn extra_knowledge_message(extra_knowledge: &str, method: HttpMethod) -> String {
    match method {
        HttpMethod::Get => format!(
            "Below are some extra knowledge. Use it if necessary:\n{extra_knowledge}\n\n\
             ### Instructions\n- Use the provided knowledge to answer the user's query.\n\
             - Ensure the response is accurate and relevant to the query.\n"
        ),
        HttpMethod::Post => format!(
            "The action has been completed. Below is the extra knowledge obtained from the action:\n{extra_knowledge}\n\n\
             ### Instructions\n- Use the provided knowledge to generate a comprehensive response.\n\
             - Ensure the information is relevant and accurately reflects the result of the action.\n"
        ),
    }
}
