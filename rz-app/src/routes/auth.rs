use crate::oauth::new_state;
use crate::routes::{error_redirect, with_session_cookie};
use crate::server::AppState;
use axum::Extension;
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/auth/rememberizer", get(start_login))
        .route("/auth/rememberizer/callback", get(login_callback))
}

#[tracing::instrument(level = "info", skip_all)]
async fn start_login(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (session_id, created) = state.sessions.lookup_or_create(&headers);
    let oauth_state = new_state();
    state
        .sessions
        .update(&session_id, |s| s.oauth_state = Some(oauth_state.clone()));
    let url = state.oauth.authorization_url(&oauth_state);
    tracing::debug!(
        redirect_uri = %state.oauth.redirect_uri(),
        "redirecting to rememberizer authorize"
    );
    with_session_cookie(Redirect::to(url.as_str()).into_response(), &session_id, created)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[tracing::instrument(level = "info", skip_all)]
async fn login_callback(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let Some(session_id) = state.sessions.lookup(&headers) else {
        tracing::warn!("login callback without a live session");
        return error_redirect("Login session expired; please log in again.");
    };
    let mut expected_state = None;
    state
        .sessions
        .update(&session_id, |s| expected_state = s.oauth_state.take());

    match complete_login(&state, &session_id, expected_state, q).await {
        Ok(()) => Redirect::to("/dashboard").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "error during token exchange");
            error_redirect(&e.to_string())
        }
    }
}

async fn complete_login(
    state: &AppState,
    session_id: &str,
    expected_state: Option<String>,
    q: CallbackQuery,
) -> anyhow::Result<()> {
    if let Some(error) = q.error {
        return Err(anyhow::anyhow!("authorization denied: {error}"));
    }
    match (expected_state.as_deref(), q.state.as_deref()) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => return Err(anyhow::anyhow!("OAuth state mismatch; please log in again")),
    }
    let code = q
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("authorization code missing from callback"))?;

    let tokens = state.oauth.exchange_code(&code).await?;
    state.sessions.update(session_id, |s| {
        s.access_token = Some(tokens.access_token);
        s.refresh_token = tokens.refresh_token;
    });
    tracing::info!("rememberizer login completed");
    Ok(())
}
