//! Reference host for the live-chat engine.
//!
//! Wires a [`ChatEngine`] to the terminal: agent lines are printed to
//! stdout, everything else the engine reports is logged.  Lines typed on
//! stdin are sent to the agent; lines starting with `/` are commands
//! (`/help` lists them).
//!
//! Usage:
//!   LC_CONFIG=chat.toml lc-hello-host --skill billing
//!
//! Env vars:
//!   LC_CONFIG       path to the engine config (default: "chat.toml")
//!   LC_LOG_FORMAT   "json" for structured log output
//!   RUST_LOG        log filter (default: "info")

mod delegate;
mod repl;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use lc_engine::{ChatEngineBuilder, ConfigSeverity, Delegates, EngineConfig};

use crate::delegate::TerminalDelegate;

/// Terminal host for the live-chat engine.
#[derive(Debug, Parser)]
#[command(name = "lc-hello-host", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Override `connection.server_url`.
    #[arg(long)]
    server_url: Option<String>,

    /// Skill to route chats to.
    #[arg(long)]
    skill: Option<String>,

    /// Account for `--skill` (the configured default when omitted).
    #[arg(long)]
    account: Option<String>,

    /// Keep chat lines so an interrupted chat can be resumed.
    #[arg(long)]
    cache_messages: bool,

    /// Verify the visitor's identity with keys from this URL.
    #[arg(long)]
    sso_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chat from the terminal (default when no subcommand is given).
    Chat,
    /// Parse the config file and report any issues.
    CheckConfig,
    /// Print the resolved configuration (with defaults) as TOML.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut config, config_path) = load_config()?;
    if let Some(url) = &cli.server_url {
        config.connection.server_url = url.clone();
    }

    match &cli.command {
        None | Some(Command::Chat) => {
            init_tracing();
            run_chat(config, &cli).await
        }
        Some(Command::CheckConfig) => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("{config_path}: ok");
                return Ok(());
            }
            let mut failed = false;
            for issue in &issues {
                println!("{config_path}: {issue}");
                failed |= issue.severity == ConfigSeverity::Error;
            }
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::ShowConfig) => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

/// Read `LC_CONFIG` (or `chat.toml`), falling back to defaults when the
/// file does not exist.
fn load_config() -> anyhow::Result<(EngineConfig, String)> {
    let config_path = std::env::var("LC_CONFIG").unwrap_or_else(|_| "chat.toml".into());
    let config = if Path::new(&config_path).exists() {
        EngineConfig::load(Path::new(&config_path))
            .with_context(|| format!("loading {config_path}"))?
    } else {
        EngineConfig::default()
    };
    Ok((config, config_path))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LC_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // Logs go to stderr so agent lines on stdout stay readable.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run_chat(config: EngineConfig, cli: &Cli) -> anyhow::Result<()> {
    let delegate = Arc::new(TerminalDelegate::new(
        cli.cache_messages,
        cli.sso_url.clone(),
    ));

    let engine = ChatEngineBuilder::new()
        .config(config)
        .delegates(Delegates::from_single(delegate))
        .build()
        .context("starting chat engine")?;

    if let Some(skill) = &cli.skill {
        match &cli.account {
            Some(account) => engine.set_skill_in_account(skill, account),
            None => engine.set_skill(skill),
        }
    }

    tracing::info!(
        destination = %engine.pending_destination(),
        server_url = %engine.config().connection.server_url,
        "lc-hello-host ready, type /help for commands"
    );

    let result = tokio::select! {
        r = repl::run(&engine) => r,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    if engine.chat_in_progress() {
        let _ = engine.end_chat(false).await;
    }
    engine.shutdown().await;
    result
}
