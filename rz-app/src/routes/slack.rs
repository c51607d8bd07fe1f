use crate::pages;
use crate::routes::{error_redirect, login_redirect};
use crate::server::AppState;
use axum::Extension;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use rz_tools::RememberizerClient;
use serde_json::{Map, Value};
use std::sync::Arc;

const SLACK: &str = "slack";

pub fn router() -> axum::Router {
    axum::Router::new().route("/slack-info", get(slack_info))
}

enum SlackInfoError {
    Unauthorized,
    Failed(String),
}

#[tracing::instrument(level = "info", skip_all)]
async fn slack_info(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(token) = state.sessions.bearer_for(&headers) else {
        tracing::debug!("access token not in session");
        return login_redirect();
    };
    let client = state.orchestrator.api().authorized(&token);
    match load_slack_info(&client).await {
        Ok((integration, channels)) => {
            tracing::info!(
                has_integration = integration.is_some(),
                channel_count = channels.len(),
                "slack info loaded"
            );
            Html(pages::slack_info(integration.as_ref(), &channels)).into_response()
        }
        Err(SlackInfoError::Unauthorized) => login_redirect(),
        Err(SlackInfoError::Failed(message)) => {
            tracing::error!(error = %message, "error in slack-info route");
            error_redirect(&message)
        }
    }
}

async fn load_slack_info(
    client: &RememberizerClient,
) -> Result<(Option<Value>, Vec<Value>), SlackInfoError> {
    let integrations = client
        .list_channels(Map::new())
        .await
        .map_err(|e| SlackInfoError::Failed(e.to_string()))?;
    if !integrations.success {
        return Err(SlackInfoError::Unauthorized);
    }
    let Some(data) = integrations.payload.get("data").and_then(Value::as_array) else {
        return Err(SlackInfoError::Failed(
            "integrations response has no data".to_string(),
        ));
    };
    let Some(integration) = data.iter().find(|i| is_slack(i)).cloned() else {
        return Ok((None, Vec::new()));
    };

    let documents = client
        .list_documents()
        .await
        .map_err(|e| SlackInfoError::Failed(e.to_string()))?;
    if !documents.success {
        return Err(SlackInfoError::Failed(format!(
            "Failed to fetch documents: {}",
            documents.payload
        )));
    }
    if let Some(error) = documents.payload.get("error").filter(|e| !e.is_null()) {
        return Err(SlackInfoError::Failed(format!(
            "Error in documents response: {error}"
        )));
    }
    let channels = documents
        .payload
        .get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().filter(|r| is_slack(r)).cloned().collect())
        .unwrap_or_default();
    Ok((Some(integration), channels))
}

fn is_slack(v: &Value) -> bool {
    v.get("integration_type").and_then(Value::as_str) == Some(SLACK)
}
