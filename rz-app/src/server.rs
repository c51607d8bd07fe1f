//! Talk-to-Slack web server.
//!
//! Wires config, the LLM client, the Rememberizer orchestrator and the
//! browser session store into one axum router.

use crate::config::AppConfig;
use crate::oauth::OAuthClient;
use crate::routes;
use crate::session::SessionStore;
use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::Response;
use rz_llm::{ChatService, LlmClient};
use rz_tools::{Orchestrator, RememberizerApi, standard_tools};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    /// Shared by the tool-selection and answer-composition calls; each call
    /// names its model through `ChatOptions`.
    pub llm: Arc<dyn ChatService>,
    pub sessions: SessionStore,
    pub oauth: OAuthClient,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, llm: Arc<dyn ChatService>) -> Result<Self> {
        let api = RememberizerApi::new(&config.rememberizer.api_base_url, config.api_timeout())
            .map_err(|e| anyhow::anyhow!("rememberizer.api_base_url: {e}"))?;
        let orchestrator = Orchestrator::new(api, &config.general.function_calling_model);
        let oauth = OAuthClient::from_config(&config)?;
        let sessions = SessionStore::new(config.session_idle_timeout());
        Ok(Self {
            config,
            orchestrator,
            llm,
            sessions,
            oauth,
            started_at: Instant::now(),
        })
    }
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path).await?;
    let addr = cfg.bind_addr()?;
    preflight_validate_tool_names()?;
    let serve_ready = match cfg.validate_for_serve() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "config incomplete for serve");
            false
        }
    };
    tracing::info!(
        %addr,
        function_calling_model = %cfg.general.function_calling_model,
        answer_model = %cfg.general.answer_model,
        api_base_url = %cfg.rememberizer.api_base_url,
        redirect_uri = %cfg.oauth_redirect_uri(),
        serve_ready,
        "config ok"
    );
    if !serve_ready {
        return Err(anyhow::anyhow!("config is not ready to serve; see log for details"));
    }
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path).await?;
    cfg.validate_for_serve()?;
    preflight_validate_tool_names()?;
    let addr = cfg.bind_addr()?;
    let listener = preflight_bind_listener(addr).await?;

    let api_key = cfg
        .openai_api_key()
        .ok_or_else(|| anyhow::anyhow!("keys.openai_api_key is required"))?;
    let mut llm = LlmClient::with_timeout(
        &api_key,
        &cfg.general.function_calling_model,
        cfg.llm_timeout(),
    )?;
    if let Some(base_url) = cfg.keys.openai_base_url.as_deref() {
        llm = llm.with_base_url(base_url);
    }
    tracing::info!(
        llm_base_url = %llm.base_url(),
        function_calling_model = %cfg.general.function_calling_model,
        answer_model = %cfg.general.answer_model,
        "llm client ready"
    );

    let state = Arc::new(AppState::new(cfg, Arc::new(llm))?);
    let app = app(state.clone());

    let shutdown = CancellationToken::new();
    tracing::info!(%addr, redirect_uri = %state.oauth.redirect_uri(), "talk-to-slack serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!(
        uptime_secs = state.started_at.elapsed().as_secs(),
        "http server shutdown completed"
    );
    Ok(())
}

/// Full router with the HTTP middleware stack.
pub fn app(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let max_in_flight = state.config.server.http_max_in_flight;
    let timeout = Duration::from_secs(state.config.server.http_timeout_seconds);

    routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

pub(crate) async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn preflight_validate_tool_names() -> Result<()> {
    let tools = standard_tools();
    tracing::info!(
        tool_count = tools.len(),
        "preflight tool name validation starting"
    );
    for tool in &tools {
        rz_llm::validate_tool_name(&tool.name).map_err(|e| {
            anyhow::anyhow!(
                "preflight tool name validation failed for '{}': {e}",
                tool.name
            )
        })?;
    }
    tracing::info!(
        tool_count = tools.len(),
        "preflight tool name validation passed"
    );
    Ok(())
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

pub(crate) async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}
