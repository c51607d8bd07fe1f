//! One-shot OAuth callback listener for notebook-style logins.
//!
//! Serves `GET /callback?code=...`, hands the first code to the waiting
//! command and shuts down.

use crate::pages::escape_html;
use crate::server::preflight_bind_listener;
use anyhow::Result;
use axum::Extension;
use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Holds the sender until the first code arrives.
struct CodeSlot(Mutex<Option<oneshot::Sender<String>>>);

impl CodeSlot {
    fn new(tx: oneshot::Sender<String>) -> Self {
        Self(Mutex::new(Some(tx)))
    }

    fn deliver(&self, code: &str) -> bool {
        let sender = match self.0.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(code.to_string()).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

fn router(slot: Arc<CodeSlot>) -> axum::Router {
    axum::Router::new()
        .route("/callback", get(callback))
        .layer(Extension(slot))
}

async fn callback(
    Extension(slot): Extension<Arc<CodeSlot>>,
    Query(q): Query<CallbackQuery>,
) -> Html<String> {
    match q.code.filter(|c| !c.is_empty()) {
        Some(code) => {
            if slot.deliver(&code) {
                tracing::info!("authorization code received");
            } else {
                tracing::warn!("authorization code already captured; ignoring repeat");
            }
            Html(format!(
                "Authorization code received: <code>{}</code>. Copy this code to your notebook.",
                escape_html(&code)
            ))
        }
        None => Html("Authorization code not found in the request".to_string()),
    }
}

/// Binds `127.0.0.1:{port}` and waits for one authorization code.
pub async fn capture_code(port: u16, wait: Duration) -> Result<String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = preflight_bind_listener(addr).await?;
    tracing::info!(
        callback_url = %format!("http://{addr}/callback"),
        timeout_secs = wait.as_secs(),
        "waiting for authorization code"
    );
    capture_code_on(listener, wait).await
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn capture_code_on(listener: TcpListener, wait: Duration) -> Result<String> {
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(CodeSlot::new(tx));
    let shutdown = CancellationToken::new();

    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, router(slot))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let outcome = tokio::time::timeout(wait, rx).await;
    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => tracing::debug!("callback listener stopped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "callback listener failed"),
        Err(e) => tracing::warn!(error = %e, "callback listener task join failed"),
    }

    match outcome {
        Ok(Ok(code)) => Ok(code),
        Ok(Err(_)) => Err(anyhow::anyhow!(
            "callback listener stopped before a code arrived"
        )),
        Err(_) => Err(anyhow::anyhow!(
            "no authorization code received within {}s",
            wait.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        (listener, addr)
    }

    #[tokio::test]
    async fn first_code_is_captured() {
        let (listener, addr) = local_listener().await;
        let waiter = tokio::spawn(capture_code_on(listener, Duration::from_secs(10)));

        let http = reqwest::Client::new();
        let missing = http
            .get(format!("http://{addr}/callback"))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(missing, "Authorization code not found in the request");

        let page = http
            .get(format!("http://{addr}/callback?code=abc123"))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(
            page,
            "Authorization code received: <code>abc123</code>. Copy this code to your notebook."
        );

        let code = waiter.await.expect("join").expect("code");
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let (listener, _) = local_listener().await;
        let err = capture_code_on(listener, Duration::from_millis(50))
            .await
            .expect_err("timeout");
        assert!(err.to_string().contains("no authorization code received"));
    }

    #[test]
    fn slot_delivers_only_once() {
        let (tx, mut rx) = oneshot::channel();
        let slot = CodeSlot::new(tx);
        assert!(slot.deliver("first"));
        assert!(!slot.deliver("second"));
        assert_eq!(rx.try_recv().expect("code"), "first");
    }
}
