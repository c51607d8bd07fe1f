use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "ready": true,
        "checked_at": Utc::now(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "sessions": state.sessions.len(),
        "function_calling_model": state.orchestrator.model(),
        "answer_model": state.config.general.answer_model,
    }))
}
