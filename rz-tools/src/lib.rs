//! Rememberizer tool bridge.
//!
//! The model selects one of a fixed set of read-only Rememberizer operations,
//! the client performs it with the caller's token, and the orchestrator turns
//! the result into context for the answer-composition call.

mod bindings;
mod catalog;
mod error;
mod orchestrator;
mod rememberizer;

pub use bindings::{
    ACCOUNT_ENDPOINT, DISCUSSION_CONTENT_ENDPOINT, DOCUMENTS_ENDPOINT, HttpMethod,
    INTEGRATIONS_ENDPOINT, Operation, SEARCH_ENDPOINT, ToolBinding, ToolBindings,
};
pub use catalog::{
    ACCOUNT_TOOL, DISCUSSION_CONTENT_TOOL, LIST_CHANNELS_TOOL, ParamKind, ParamSpec, SEARCH_TOOL,
    ToolDescriptor, standard_tools,
};
pub use error::{Result, ToolError};
pub use orchestrator::{
    DEFAULT_FUNCTION_CALLING_MODEL, HandleOutcome, NO_CONTEXT_PROVIDED, Orchestrator,
    SYSTEM_PERSONA, ToolInvocation, UnavailableReason, extra_knowledge_message,
    responses_to_text,
};
pub use rememberizer::{
    ApiResult, BearerToken, DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT, RememberizerApi,
    RememberizerClient,
};
