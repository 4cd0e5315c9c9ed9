//! Avatar relay HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use avatar_relay::diagnostics::ToolInventory;
use avatar_relay::lipsync::{PhonemeRecognizer, RhubarbRecognizer};
use avatar_relay::media::MediaTools;
use avatar_relay::{AppState, Relay, RelayConfig, RelayServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Relay chat messages to an LLM and answer with speech and lip-sync cues.
#[derive(Parser)]
#[command(name = "avatar-relay", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "AVATAR_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the effective configuration as TOML, API keys masked, and exit.
    #[arg(long)]
    print_config: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => {
            let path = RelayConfig::default_config_path();
            if path.is_file() {
                info!(path = %path.display(), "loading config");
                RelayConfig::from_file(&path)?
            } else {
                RelayConfig::default()
            }
        }
    };
    config.apply_env_overrides();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avatar_relay=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        print!("{}", config.redacted().to_toml()?);
        return Ok(());
    }

    if config.llm.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set, chat replies will be canned");
    }

    tokio::fs::create_dir_all(&config.storage.work_dir).await?;

    let media = Arc::new(MediaTools::discover(&config.media));
    let rhubarb = RhubarbRecognizer::discover(&config.lipsync);
    let tools = ToolInventory::from_discovery(&media, rhubarb.as_ref());
    tools.log_summary();

    let recognizer = rhubarb.map(|r| Arc::new(r) as Arc<dyn PhonemeRecognizer>);
    let relay = Relay::from_config(&config, media, recognizer);
    info!(providers = ?relay.speech().provider_names(), "speech chain ready");

    let state = AppState::new(relay, config.voice_catalog(), tools);
    let server = RelayServer::start(&config.server, state).await?;

    tokio::signal::ctrl_c().await?;
    info!(addr = %server.addr(), "shutting down");
    server.shutdown();
    Ok(())
}
