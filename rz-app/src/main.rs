//! talk-to-slack binary.
//!
//! Serves the Rememberizer-backed Slack Q&A web app, checks configuration, or
//! captures a single OAuth authorization code for notebook use.

mod answer;
mod callback_listener;
mod config;
mod oauth;
mod pages;
mod routes;
mod server;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(
    name = "talk-to-slack",
    version,
    about = "Ask questions about your Slack workspace through Rememberizer"
)]
struct Cli {
    /// Path to the TOML config file (default: ./talk-to-slack.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the web server (default).
    Serve,
    /// Validate config and report whether it is ready to serve.
    Doctor,
    /// Listen for one OAuth callback and print the authorization code.
    CaptureCode {
        /// Port to listen on; overrides `callback.port`.
        #[arg(long)]
        port: Option<u16>,
        /// Seconds to wait for the code; overrides `callback.timeout_seconds`.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();

    let command = if let Some(command) = cli.command {
        command
    } else {
        Command::Serve
    };

    match command {
        Command::Serve => server::serve(cli.config).await,
        Command::Doctor => server::doctor(cli.config).await,
        Command::CaptureCode { port, timeout_secs } => {
            let cfg = config::AppConfig::load(cli.config).await?;
            let port = port.unwrap_or(cfg.callback.port);
            let wait = Duration::from_secs(timeout_secs.unwrap_or(cfg.callback.timeout_seconds));
            let code = callback_listener::capture_code(port, wait).await?;
            println!("{code}");
            Ok(())
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new(
            "info,talk_to_slack=debug,rz_app=debug,rz_tools=debug,rz_llm=debug,tower_http=info",
        ),
    };
    let log_format = std::env::var("TALK_TO_SLACK_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported TALK_TO_SLACK_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
