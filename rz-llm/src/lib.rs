//! BYO-key LLM chat client for the Rememberizer assistant.
//!
//! Pure HTTP client against an OpenAI-compatible chat completions API.
//! Callers depend on the [`ChatService`] trait so tests can swap in a fake.

mod client;
mod error;
mod openai;
mod types;

pub use client::{ChatService, LlmClient, validate_tool_name};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatOptions, ChatResponse, Role, ToolCall, ToolDefinition, Usage};
