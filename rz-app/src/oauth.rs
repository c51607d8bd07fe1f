//! Rememberizer OAuth2 authorization-code flow.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    authorize_url: Url,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let rz = &cfg.rememberizer;
        let authorize_url = Url::parse(&rz.authorize_url)
            .with_context(|| format!("rememberizer.authorize_url {:?}", rz.authorize_url))?;
        let token_url = Url::parse(&rz.token_url)
            .with_context(|| format!("rememberizer.token_url {:?}", rz.token_url))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.rememberizer.timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build oauth HTTP client; using default");
                reqwest::Client::new()
            });
        Ok(Self {
            http,
            authorize_url,
            token_url,
            client_id: cfg.rememberizer.client_id.clone(),
            client_secret: cfg.rememberizer.client_secret.clone(),
            scope: cfg.rememberizer.scope.clone(),
            redirect_uri: cfg.oauth_redirect_uri(),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Where the browser is sent to grant access.
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        url
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .context("token request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("read token response")?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token exchange rejected");
            return Err(anyhow::anyhow!("token exchange failed ({status}): {text}"));
        }
        let tokens: TokenSet =
            serde_json::from_str(&text).context("token response did not include an access_token")?;
        tracing::info!(
            has_refresh_token = tokens.refresh_token.is_some(),
            "token exchange succeeded"
        );
        Ok(tokens)
    }
}

/// 32 hex characters from a random v4 UUID.
pub fn new_state() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(token_url: &str) -> OAuthClient {
        let mut cfg = AppConfig::default();
        cfg.rememberizer.client_id = "cid".to_string();
        cfg.rememberizer.client_secret = "csecret".to_string();
        cfg.rememberizer.token_url = token_url.to_string();
        cfg.server.public_base_url = Some("https://talk.example.com".to_string());
        OAuthClient::from_config(&cfg).expect("oauth client")
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let client = client_for("https://api.rememberizer.ai/api/v1/auth/oauth2/token/");
        let url = client.authorization_url("abc123");
        assert_eq!(url.path(), "/api/v1/auth/oauth2/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "cid".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), "offline_access".into())));
        assert!(pairs.contains(&("state".into(), "abc123".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "https://talk.example.com/auth/rememberizer/callback".into()
        )));
    }

    #[test]
    fn states_are_random_hex() {
        let a = new_state();
        let b = new_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn exchange_posts_form_and_reads_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token/")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("grant_type=authorization_code".to_string()),
                Matcher::Regex("code=the-code".to_string()),
                Matcher::Regex("client_secret=csecret".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","token_type":"Bearer"}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/token/", server.url()));
        let tokens = client.exchange_code("the-code").await.expect("exchange");
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exchange_surfaces_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token/")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = client_for(&format!("{}/token/", server.url()));
        let err = client.exchange_code("stale").await.expect_err("rejected");
        assert!(err.to_string().contains("invalid_grant"));
    }
}
