use crate::pages;
use crate::server::AppState;
use crate::session::{expired_session_cookie, set_cookie};
use axum::Extension;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

const UNKNOWN_ERROR: &str = "An unknown error occurred.";

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/", get(index))
        .route("/error", get(error_page))
        .route("/logout", get(logout))
}

async fn index() -> Html<String> {
    Html(pages::index())
}

#[derive(Debug, Deserialize)]
struct ErrorQuery {
    message: Option<String>,
}

async fn error_page(Query(q): Query<ErrorQuery>) -> Html<String> {
    let message = q
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
    Html(pages::error(&message))
}

#[tracing::instrument(level = "info", skip_all)]
async fn logout(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(session) = state
        .sessions
        .lookup(&headers)
        .and_then(|id| state.sessions.remove(&id))
    {
        let now = Utc::now();
        tracing::info!(
            session_age_secs = (now - session.created_at).num_seconds(),
            idle_secs = (now - session.last_active).num_seconds(),
            had_refresh_token = session.refresh_token.is_some(),
            "session cleared"
        );
    }
    let mut resp = Redirect::to("/").into_response();
    set_cookie(resp.headers_mut(), expired_session_cookie());
    resp
}
