//! Authenticated access to the Rememberizer knowledge API.
//!
//! Every call resolves to an [`ApiResult`]: transport failures, timeouts and
//! non-200 statuses all come back as `success == false` instead of an error.
//! Errors are reserved for requests that were never sent (bad arguments,
//! unknown tools, malformed endpoints).

use crate::bindings::{DOCUMENTS_ENDPOINT, HttpMethod, Operation, ToolBinding, ToolBindings};
use crate::catalog::{as_integer, require_string};
use crate::error::{Result, ToolError};
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.rememberizer.ai/api/v1/";
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque OAuth access token. Redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult {
    /// Parsed response body, present even when `success` is false.
    pub payload: Value,
    pub success: bool,
}

impl ApiResult {
    fn transport_failure(error: impl fmt::Display) -> Self {
        Self {
            payload: json!({ "error": error.to_string() }),
            success: false,
        }
    }
}

/// Connection settings shared by every user; hands out per-token clients.
#[derive(Clone)]
pub struct RememberizerApi {
    http: reqwest::Client,
    base_url: Url,
}

impl RememberizerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // A trailing slash keeps `Url::join` from dropping the last path segment.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn authorized(&self, token: &BearerToken) -> RememberizerClient {
        RememberizerClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.clone(),
        }
    }
}

/// Client bound to one user's token for the duration of one interaction.
#[derive(Clone)]
pub struct RememberizerClient {
    http: reqwest::Client,
    base_url: Url,
    token: BearerToken,
}

impl RememberizerClient {
    /// Issues one authenticated request. GET sends `params` as a query string,
    /// POST as a form body. Never retries.
    #[tracing::instrument(level = "info", skip_all, fields(%endpoint, %method))]
    pub async fn call(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
        method: HttpMethod,
    ) -> Result<ApiResult> {
        let url = self.base_url.join(endpoint)?;
        let pairs = to_form_pairs(params);
        let request = match method {
            HttpMethod::Get => self.http.get(url).query(&pairs),
            HttpMethod::Post => self.http.post(url).form(&pairs),
        };

        let response = match request.bearer_auth(self.token.as_str()).send().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "rememberizer request failed");
                return Ok(ApiResult::transport_failure(e));
            }
        };
        Ok(format_response(response).await)
    }

    pub async fn search(&self, args: Map<String, Value>) -> Result<ApiResult> {
        self.search_with(&Operation::Search.standard_binding(), args)
            .await
    }

    pub async fn get_account(&self, args: Map<String, Value>) -> Result<ApiResult> {
        self.plain_with(&Operation::GetAccount.standard_binding(), args)
            .await
    }

    pub async fn list_channels(&self, args: Map<String, Value>) -> Result<ApiResult> {
        self.plain_with(&Operation::ListChannels.standard_binding(), args)
            .await
    }

    pub async fn get_discussion_content(&self, args: Map<String, Value>) -> Result<ApiResult> {
        self.discussion_content_with(&Operation::GetDiscussionContent.standard_binding(), args)
            .await
    }

    /// Lists the user's documents. Not exposed as a tool.
    pub async fn list_documents(&self) -> Result<ApiResult> {
        self.call(DOCUMENTS_ENDPOINT, &Map::new(), HttpMethod::Get)
            .await
    }

    /// Dispatches by tool name through the standard binding table.
    pub async fn invoke(&self, tool_name: &str, args: Map<String, Value>) -> Result<ApiResult> {
        let bindings = ToolBindings::standard();
        let binding = bindings.resolve(tool_name)?;
        self.invoke_binding(binding, args).await
    }

    /// Runs the binding's operation against the binding's endpoint and verb.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(tool = %binding.tool_name, operation = binding.operation.as_str())
    )]
    pub async fn invoke_binding(
        &self,
        binding: &ToolBinding,
        args: Map<String, Value>,
    ) -> Result<ApiResult> {
        let result = match binding.operation {
            Operation::Search => self.search_with(binding, args).await?,
            Operation::GetAccount | Operation::ListChannels => {
                self.plain_with(binding, args).await?
            }
            Operation::GetDiscussionContent => {
                self.discussion_content_with(binding, args).await?
            }
        };
        if !result.success {
            tracing::error!(
                tool = %binding.tool_name,
                payload = %result.payload,
                "rememberizer call did not succeed"
            );
        }
        Ok(result)
    }

    async fn search_with(
        &self,
        binding: &ToolBinding,
        args: Map<String, Value>,
    ) -> Result<ApiResult> {
        require_string(&args, "q")?;
        self.call(&binding.endpoint, &args, binding.method).await
    }

    async fn plain_with(
        &self,
        binding: &ToolBinding,
        args: Map<String, Value>,
    ) -> Result<ApiResult> {
        self.call(&binding.endpoint, &args, binding.method).await
    }

    async fn discussion_content_with(
        &self,
        binding: &ToolBinding,
        args: Map<String, Value>,
    ) -> Result<ApiResult> {
        let (endpoint, params) = discussion_request(binding, args)?;
        self.call(&endpoint, &params, binding.method).await
    }
}

/// Moves `discussion_id` out of the params into the endpoint path and pins the
/// integration type to Slack.
fn discussion_request(
    binding: &ToolBinding,
    mut args: Map<String, Value>,
) -> Result<(String, Map<String, Value>)> {
    let discussion_id = take_discussion_id(&mut args)?;
    args.insert(
        "integration_type".to_string(),
        Value::String("slack".to_string()),
    );
    let endpoint = binding.endpoint_with(&discussion_id.to_string())?;
    Ok((endpoint, args))
}

fn take_discussion_id(args: &mut Map<String, Value>) -> Result<i64> {
    let Some(raw) = args.remove("discussion_id") else {
        return Err(ToolError::InvalidArguments(
            "missing key: discussion_id".to_string(),
        ));
    };
    as_integer(&raw).ok_or_else(|| {
        ToolError::InvalidArguments(format!("key discussion_id must be integer, got {raw}"))
    })
}

/// Success is exactly HTTP 200. Bodies that are not JSON are kept as a JSON string.
async fn format_response(response: reqwest::Response) -> ApiResult {
    let status = response.status();
    let body = match response.text().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, %status, "rememberizer response body unreadable");
            return ApiResult::transport_failure(e);
        }
    };
    let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));
    tracing::debug!(%status, "rememberizer response received");
    ApiResult {
        payload,
        success: status == StatusCode::OK,
    }
}

fn to_form_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    fn client_for(server: &mockito::ServerGuard) -> RememberizerClient {
        RememberizerApi::new(&server.url(), Duration::from_secs(5))
            .expect("api")
            .authorized(&BearerToken::new("test_access_token"))
    }

    #[test]
    fn bearer_token_debug_is_redacted() {
        let token = BearerToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_path() {
        let api = RememberizerApi::new("https://api.rememberizer.ai/api/v1", DEFAULT_API_TIMEOUT)
            .expect("api");
        let joined = api.base_url().join("account/").expect("join");
        assert_eq!(joined.as_str(), "https://api.rememberizer.ai/api/v1/account/");
    }

    #[test]
    fn form_pairs_stringify_scalars_and_skip_null() {
        let mut pairs = to_form_pairs(&args(json!({"q": "standup", "n": 3, "x": null})));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("n".to_string(), "3".to_string()),
                ("q".to_string(), "standup".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn search_sends_query_and_bearer_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/documents/search/")
            .match_header("authorization", "Bearer test_access_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "test query".into()),
                Matcher::UrlEncoded("n".into(), "3".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": "test"}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .search(args(json!({"q": "test query", "n": 3})))
            .await
            .expect("search");

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.payload, json!({"data": "test"}));
    }

    #[tokio::test]
    async fn search_without_query_is_rejected_before_sending() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server)
            .search(args(json!({"n": 3})))
            .await
            .expect_err("q is required");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_sends_params_as_form_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/things/")
            .match_header("authorization", "Bearer test_access_token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::UrlEncoded("key".into(), "value".into()))
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .call("things/", &args(json!({"key": "value"})), HttpMethod::Post)
            .await
            .expect("post");

        mock.assert_async().await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn discussion_content_moves_id_into_path_and_forces_slack() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/discussions/123/contents/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".into(), "2024-05-01".into()),
                Matcher::UrlEncoded("integration_type".into(), "slack".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"discussion_content": "hi", "thread_contents": {}}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .get_discussion_content(args(json!({
                "discussion_id": 123,
                "from": "2024-05-01",
                "integration_type": "discord"
            })))
            .await
            .expect("discussion content");

        mock.assert_async().await;
        assert!(result.success);
        assert_eq!(result.payload["discussion_content"], "hi");
    }

    #[test]
    fn discussion_request_strips_id_regardless_of_other_args() {
        let binding = Operation::GetDiscussionContent.standard_binding();
        let (endpoint, params) = discussion_request(
            &binding,
            args(json!({"discussion_id": "42", "to": "2024-05-08", "integration_type": "discord"})),
        )
        .expect("request");
        assert_eq!(endpoint, "discussions/42/contents/");
        assert_eq!(
            Value::Object(params),
            json!({"to": "2024-05-08", "integration_type": "slack"})
        );
    }

    #[tokio::test]
    async fn discussion_content_requires_integer_id() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server);

        let err = client
            .get_discussion_content(Map::new())
            .await
            .expect_err("missing id");
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = client
            .get_discussion_content(args(json!({"discussion_id": "general"})))
            .await
            .expect_err("non numeric id");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn non_200_keeps_parsed_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/account/")
            .with_status(401)
            .with_body(r#"{"detail": "Invalid token"}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .get_account(Map::new())
            .await
            .expect("account");

        assert!(!result.success);
        assert_eq!(result.payload, json!({"detail": "Invalid token"}));
    }

    #[tokio::test]
    async fn non_json_body_becomes_string_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/integrations/")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let result = client_for(&server)
            .list_channels(Map::new())
            .await
            .expect("list channels");

        assert!(!result.success);
        assert_eq!(result.payload, Value::String("Bad Gateway".to_string()));
    }

    #[tokio::test]
    async fn invoke_routes_each_tool_to_its_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let cases = [
            ("search", "/documents/search/", json!({"q": "x"})),
            ("account", "/account/", json!({})),
            ("list_channels", "/integrations/", json!({})),
            ("get_discussion_content", "/discussions/7/contents/", json!({"discussion_id": 7})),
        ];
        let client = client_for(&server);
        for (tool, path, tool_args) in cases {
            let mock = server
                .mock("GET", path)
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(format!(r#"{{"tool": "{tool}"}}"#))
                .create_async()
                .await;
            let result = client.invoke(tool, args(tool_args)).await.expect("invoke");
            mock.assert_async().await;
            assert!(result.success);
            assert_eq!(result.payload["tool"], tool);
        }
    }

    #[tokio::test]
    async fn invoke_binding_uses_bound_endpoint_and_verb() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/search/")
            .match_body(Matcher::UrlEncoded("q".into(), "x".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let binding = ToolBinding::new("search", Operation::Search, HttpMethod::Post, "v2/search/");
        let result = client_for(&server)
            .invoke_binding(&binding, args(json!({"q": "x"})))
            .await
            .expect("invoke binding");

        mock.assert_async().await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn invoke_unknown_tool_fails_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server)
            .invoke("drop_tables", Map::new())
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, ToolError::UnknownTool(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_failure_is_an_unsuccessful_result() {
        let client = RememberizerApi::new("http://127.0.0.1:9/", Duration::from_secs(2))
            .expect("api")
            .authorized(&BearerToken::new("t"));
        let result = client.get_account(Map::new()).await.expect("no error");
        assert!(!result.success);
        assert!(result.payload.get("error").is_some());
    }

    #[tokio::test]
    async fn stalled_server_times_out_into_unsuccessful_result() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let stall = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = RememberizerApi::new(&format!("http://{addr}/"), Duration::from_millis(300))
            .expect("api")
            .authorized(&BearerToken::new("t"));
        let result = client.get_account(Map::new()).await.expect("no error");

        assert!(!result.success);
        let error = result.payload.get("error").and_then(Value::as_str).expect("error text");
        assert!(!error.is_empty());
        stall.abort();
    }
}
