use crate::pages;
use crate::routes::{error_redirect, login_redirect};
use crate::server::AppState;
use axum::Extension;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde_json::Map;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/dashboard", get(dashboard))
}

#[tracing::instrument(level = "info", skip_all)]
async fn dashboard(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(token) = state.sessions.bearer_for(&headers) else {
        return login_redirect();
    };
    let client = state.orchestrator.api().authorized(&token);
    match client.get_account(Map::new()).await {
        Ok(result) if result.success => Html(pages::dashboard(&result.payload)).into_response(),
        Ok(_) => {
            tracing::info!("account lookup rejected; sending user to login");
            login_redirect()
        }
        Err(e) => {
            tracing::error!(error = %e, "account lookup failed");
            error_redirect(&e.to_string())
        }
    }
}
