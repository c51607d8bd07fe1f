//! Tool descriptors offered to the model during tool selection.
//!
//! Names, descriptions and parameter names of the standard set are part of the
//! prompt contract and must stay byte-for-byte stable.

use crate::error::{Result, ToolError};
use serde_json::{Map, Value, json};

pub const SEARCH_TOOL: &str = "search";
pub const ACCOUNT_TOOL: &str = "account";
pub const LIST_CHANNELS_TOOL: &str = "list_channels";
pub const DISCUSSION_CONTENT_TOOL: &str = "get_discussion_content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    /// Enforced locally; not emitted into the schema the model sees.
    pub required: bool,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind, description: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params,
        }
    }

    /// JSON Schema for the arguments, or `None` when the tool takes no arguments.
    pub fn parameters_schema(&self) -> Option<Value> {
        if self.params.is_empty() {
            return None;
        }
        let mut properties = Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                json!({
                    "type": p.kind.schema_type(),
                    "description": p.description,
                }),
            );
        }
        Some(json!({
            "type": "object",
            "properties": properties,
        }))
    }

    pub fn to_llm_tool_def(&self) -> rz_llm::ToolDefinition {
        rz_llm::ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    /// Rejects unknown keys, missing required keys and values of the wrong type.
    /// `null` values count as absent.
    pub fn validate_arguments(&self, args: &Map<String, Value>) -> Result<()> {
        for key in args.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(ToolError::InvalidArguments(format!(
                    "{}: unexpected key: {key}",
                    self.name
                )));
            }
        }
        for p in &self.params {
            match args.get(&p.name) {
                None | Some(Value::Null) => {
                    if p.required {
                        return Err(ToolError::InvalidArguments(format!(
                            "{}: missing key: {}",
                            self.name, p.name
                        )));
                    }
                }
                Some(v) => check_kind(&self.name, p, v)?,
            }
        }
        Ok(())
    }
}

fn check_kind(tool: &str, p: &ParamSpec, v: &Value) -> Result<()> {
    let ok = match p.kind {
        ParamKind::String => v.is_string(),
        ParamKind::Integer => as_integer(v).is_some(),
    };
    if ok {
        return Ok(());
    }
    Err(ToolError::InvalidArguments(format!(
        "{tool}: key {} must be {}, got {v}",
        p.name,
        p.kind.schema_type()
    )))
}

/// Integers arrive either as JSON numbers or as numeric strings.
pub(crate) fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn require_string(args: &Map<String, Value>, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

/// The four tools exposed to the model, in the order it sees them.
pub fn standard_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            SEARCH_TOOL,
            "Initiate a search with a query of up to 400 words to get highly relevant responses from stored knowledge. For Q&A, transform your question into an ideal answer format to find similar existing answers.",
            vec![
                ParamSpec::new(
                    "q",
                    ParamKind::String,
                    "Up to 400 words sentence for which you wish to find semantically similar chunks of knowledge.",
                    true,
                ),
                ParamSpec::new(
                    "n",
                    ParamKind::Integer,
                    "Number of semantically similar chunks of text to return. Use 'n=3' for up to 5, and 'n=10' for more information. If you do not receive enough information, consider trying again with a larger 'n' value.",
                    false,
                ),
            ],
        ),
        ToolDescriptor::new(
            DISCUSSION_CONTENT_TOOL,
            "Get the content of the Slack channel with the specified primary key. The response contains 2 fields, discussion_content, and thread_contents. The former contains the main messages of the chat, whereas the latter is the threads of the discussion.",
            vec![
                ParamSpec::new(
                    "discussion_id",
                    ParamKind::Integer,
                    "The primary key of the document",
                    true,
                ),
                ParamSpec::new(
                    "from",
                    ParamKind::String,
                    "The starting time when we want to retrieve the content of the discussion in ISO 8601 format at GMT+0. If not specified, the default time is now.",
                    false,
                ),
                ParamSpec::new(
                    "to",
                    ParamKind::String,
                    "The ending time when we want to retrieve the content of the discussion in ISO 8601 format at GMT+0. If not specified, it is 7 days before the 'from' parameter.",
                    false,
                ),
            ],
        ),
        ToolDescriptor::new(ACCOUNT_TOOL, "Get the Rememberizer account information", vec![]),
        ToolDescriptor::new(LIST_CHANNELS_TOOL, "List all Slack channels", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search() -> ToolDescriptor {
        standard_tools()
            .into_iter()
            .find(|t| t.name == SEARCH_TOOL)
            .expect("search descriptor")
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn standard_tools_keep_prompt_contract_names() {
        let names: Vec<String> = standard_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["search", "get_discussion_content", "account", "list_channels"]
        );
        for t in standard_tools() {
            rz_llm::validate_tool_name(&t.name).expect("provider-safe tool name");
        }
    }

    #[test]
    fn schema_lists_declared_parameters_without_required() {
        let schema = search().parameters_schema().expect("search has params");
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["q"]["type"], "string");
        assert_eq!(schema["properties"]["n"]["type"], "integer");
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn parameterless_tools_have_no_schema() {
        let account = standard_tools()
            .into_iter()
            .find(|t| t.name == ACCOUNT_TOOL)
            .expect("account descriptor");
        assert!(account.parameters_schema().is_none());
        let def = account.to_llm_tool_def();
        assert_eq!(def.description, "Get the Rememberizer account information");
        assert!(def.parameters.is_none());
    }

    #[test]
    fn validate_accepts_declared_arguments() {
        search()
            .validate_arguments(&args(json!({"q": "standup notes", "n": 3})))
            .expect("valid args");
        search()
            .validate_arguments(&args(json!({"q": "standup notes", "n": "5"})))
            .expect("numeric string is an integer");
    }

    #[test]
    fn validate_rejects_unknown_missing_and_mistyped() {
        let err = search()
            .validate_arguments(&args(json!({"q": "x", "limit": 3})))
            .expect_err("unknown key");
        match err {
            ToolError::InvalidArguments(msg) => assert!(msg.contains("unexpected key: limit")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = search()
            .validate_arguments(&args(json!({"n": 3})))
            .expect_err("missing q");
        match err {
            ToolError::InvalidArguments(msg) => assert!(msg.contains("missing key: q")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = search()
            .validate_arguments(&args(json!({"q": 42})))
            .expect_err("q must be a string");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
