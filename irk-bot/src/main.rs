//! irk-bot: reference bot binary for the irk runtime.
//!
//! Loads a TOML config, applies CLI overrides, wires the built-in
//! plugins, and runs the connection until Ctrl+C.

mod plugins;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use irk_core::{BotConfig, Connection};

#[derive(Parser)]
#[command(name = "irk-bot", about = "An extensible IRC bot")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "irk.toml")]
    config: PathBuf,

    /// IRC server host (overrides the config file).
    #[arg(long)]
    server: Option<String>,

    /// Server port (overrides the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Bot nick (overrides the config file).
    #[arg(long)]
    nick: Option<String>,

    /// Comma-separated channels to join (overrides the config file).
    #[arg(long)]
    channels: Option<String>,

    /// Use TLS.
    #[arg(long)]
    tls: bool,
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(BotConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("can't read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("bad config file {}", path.display()))
}

/// CLI overrides beat the config file.
fn apply_overrides(config: &mut BotConfig, args: &Args) {
    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(nick) = &args.nick {
        config.nick = nick.clone();
        config.user_name = nick.clone();
    }
    if let Some(channels) = &args.channels {
        config.channels = channels
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if args.tls {
        config.use_tls = true;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "irk_bot=info,irk_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args);

    tracing::info!(
        server = %config.server,
        port = config.port,
        nick = %config.nick,
        channels = ?config.channels,
        "Starting irk-bot"
    );

    let plugins = plugins::default_plugins()?;
    let connection = Connection::new(config, plugins)?;
    connection.init();
    connection.connect().await?;

    tracing::info!("Bot running. Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    connection.dispose().await;
    Ok(())
}
