//! dueld - tabletop shooting-duel server daemon

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dueld::{Config, Server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dueld", version, about = "Tabletop shooting-duel server")]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the reference-data catalog
    #[arg(long)]
    catalog_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dueld=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if cli.catalog_url.is_some() {
        config.catalog_url = cli.catalog_url;
    }
    info!(
        "match timeout {:?}, pacing {:?}, bot delay {:?}",
        config.match_timeout(),
        config.phase_pacing(),
        config.bot_delay()
    );

    // Create and run server
    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
