use crate::catalog::{ACCOUNT_TOOL, DISCUSSION_CONTENT_TOOL, LIST_CHANNELS_TOOL, SEARCH_TOOL};
use crate::error::{Result, ToolError};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// Relative to the API base URL.
pub const SEARCH_ENDPOINT: &str = "documents/search/";
pub const ACCOUNT_ENDPOINT: &str = "account/";
pub const INTEGRATIONS_ENDPOINT: &str = "integrations/";
pub const DISCUSSION_CONTENT_ENDPOINT: &str = "discussions/{}/contents/";
pub const DOCUMENTS_ENDPOINT: &str = "documents/";

const ENDPOINT_SLOT: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            _ => Err(ToolError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Remote read operations the client knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Search,
    GetAccount,
    ListChannels,
    GetDiscussionContent,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Search,
        Operation::GetAccount,
        Operation::ListChannels,
        Operation::GetDiscussionContent,
    ];

    /// The binding used when the operation is called directly rather than by tool name.
    pub fn standard_binding(self) -> ToolBinding {
        match self {
            Operation::Search => {
                ToolBinding::new(SEARCH_TOOL, self, HttpMethod::Get, SEARCH_ENDPOINT)
            }
            Operation::GetAccount => {
                ToolBinding::new(ACCOUNT_TOOL, self, HttpMethod::Get, ACCOUNT_ENDPOINT)
            }
            Operation::ListChannels => {
                ToolBinding::new(LIST_CHANNELS_TOOL, self, HttpMethod::Get, INTEGRATIONS_ENDPOINT)
            }
            Operation::GetDiscussionContent => ToolBinding::new(
                DISCUSSION_CONTENT_TOOL,
                self,
                HttpMethod::Get,
                DISCUSSION_CONTENT_ENDPOINT,
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::GetAccount => "get_account",
            Operation::ListChannels => "list_channels",
            Operation::GetDiscussionContent => "get_discussion_content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinding {
    pub tool_name: String,
    pub operation: Operation,
    pub method: HttpMethod,
    /// May contain one `{}` slot, filled by [`ToolBinding::endpoint_with`].
    pub endpoint: String,
}

impl ToolBinding {
    pub fn new(tool_name: &str, operation: Operation, method: HttpMethod, endpoint: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            operation,
            method,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint_with(&self, slot: &str) -> Result<String> {
        if !self.endpoint.contains(ENDPOINT_SLOT) {
            return Err(ToolError::InvalidEndpoint(format!(
                "endpoint {} for {} has no substitution slot",
                self.endpoint, self.tool_name
            )));
        }
        Ok(self.endpoint.replacen(ENDPOINT_SLOT, slot, 1))
    }
}

/// Name-keyed lookup table from tool names to remote operations.
#[derive(Debug, Clone)]
pub struct ToolBindings {
    by_name: HashMap<String, ToolBinding>,
}

impl ToolBindings {
    pub fn new(bindings: impl IntoIterator<Item = ToolBinding>) -> Self {
        Self {
            by_name: bindings
                .into_iter()
                .map(|b| (b.tool_name.clone(), b))
                .collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new(Operation::ALL.map(Operation::standard_binding))
    }

    pub fn get(&self, tool_name: &str) -> Option<&ToolBinding> {
        self.by_name.get(tool_name)
    }

    pub fn resolve(&self, tool_name: &str) -> Result<&ToolBinding> {
        self.get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for ToolBindings {
    fn default() -> Self {
        Self::standard()
    }
}
