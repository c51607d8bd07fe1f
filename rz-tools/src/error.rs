use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("method not supported: {0}")]
    UnsupportedMethod(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<url::ParseError> for ToolError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidEndpoint(e.to_string())
    }
}
