//! Configuration loader.
//!
//! Sources, lowest precedence first: built-in defaults, `talk-to-slack.toml`,
//! `.env`, process environment.

use rz_tools::{DEFAULT_API_BASE_URL, DEFAULT_FUNCTION_CALLING_MODEL};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "talk-to-slack.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rememberizer: RememberizerConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Model used for the tool-selection call.
    #[serde(default = "default_function_calling_model")]
    pub function_calling_model: String,
    /// Model used for the answer-composition call.
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,
    #[serde(default = "default_llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            function_calling_model: default_function_calling_model(),
            answer_model: default_answer_model(),
            answer_temperature: default_answer_temperature(),
            llm_timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

fn default_function_calling_model() -> String {
    DEFAULT_FUNCTION_CALLING_MODEL.to_string()
}

fn default_answer_model() -> String {
    "gpt-4".to_string()
}

fn default_answer_temperature() -> f32 {
    0.7
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally visible origin, used to build the OAuth redirect URI.
    /// Defaults to `http://{bind_addr}`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
    /// Browser sessions untouched for this long are dropped.
    #[serde(default = "default_session_idle_timeout_seconds")]
    pub session_idle_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: None,
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
            session_idle_timeout_seconds: default_session_idle_timeout_seconds(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    120
}

fn default_http_max_in_flight() -> usize {
    64
}

fn default_session_idle_timeout_seconds() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RememberizerConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_api_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RememberizerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: default_scope(),
            timeout_seconds: default_api_timeout_seconds(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_authorize_url() -> String {
    "https://api.rememberizer.ai/api/v1/auth/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://api.rememberizer.ai/api/v1/auth/oauth2/token/".to_string()
}

fn default_scope() -> String {
    "offline_access".to_string()
}

fn default_api_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible endpoint override.
    pub openai_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_callback_port")]
    pub port: u16,
    #[serde(default = "default_callback_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port: default_callback_port(),
            timeout_seconds: default_callback_timeout_seconds(),
        }
    }
}

fn default_callback_port() -> u16 {
    5000
}

fn default_callback_timeout_seconds() -> u64 {
    300
}

impl AppConfig {
    /// An explicit path must exist; the default path may be absent.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, ".env file could not be loaded");
            }
        }

        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("REMEMBERIZER_CLIENT_ID") {
            self.rememberizer.client_id = v;
        }
        if let Some(v) = get("REMEMBERIZER_CLIENT_SECRET") {
            self.rememberizer.client_secret = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.keys.openai_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.keys.openai_base_url = Some(v);
        }
        if let Some(v) = get("GPT_FUNCTION_CALLING_MODEL") {
            self.general.function_calling_model = v;
        }
        if let Some(v) = get("TALK_TO_SLACK_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("TALK_TO_SLACK_PUBLIC_URL") {
            self.server.public_base_url = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.function_calling_model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.function_calling_model is required"));
        }
        if self.general.answer_model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.answer_model is required"));
        }
        if self.general.llm_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("general.llm_timeout_seconds must be > 0"));
        }
        if self.rememberizer.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("rememberizer.timeout_seconds must be > 0"));
        }
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        if self.server.session_idle_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "server.session_idle_timeout_seconds must be > 0"
            ));
        }
        if self.callback.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("callback.timeout_seconds must be > 0"));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Extra checks that only matter when serving the web app.
    pub fn validate_for_serve(&self) -> anyhow::Result<()> {
        if self.rememberizer.client_id.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "rememberizer.client_id is required (or REMEMBERIZER_CLIENT_ID)"
            ));
        }
        if self.rememberizer.client_secret.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "rememberizer.client_secret is required (or REMEMBERIZER_CLIENT_SECRET)"
            ));
        }
        if self.openai_api_key().is_none() {
            return Err(anyhow::anyhow!(
                "keys.openai_api_key is required (or OPENAI_API_KEY)"
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn public_base_url(&self) -> String {
        let base = match self.server.public_base_url.as_deref() {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => format!("http://{}", self.server.bind_addr.trim()),
        };
        base.trim_end_matches('/').to_string()
    }

    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/auth/rememberizer/callback", self.public_base_url())
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.keys.openai_api_key.clone().filter(|s| !s.trim().is_empty())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.general.llm_timeout_seconds)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.rememberizer.timeout_seconds)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.session_idle_timeout_seconds)
    }
}

pub fn default_config_path() -> PathBuf {
    Path::new(".").join(DEFAULT_CONFIG_FILE)
}
