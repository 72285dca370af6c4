//! Headless party client.

use std::time::Duration;

use clap::Parser;
use client::{ClientConfig, parse_color};
use protocol::GameType;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:24680")]
    server: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Color as r,g,b
    #[arg(short = 'c', long, value_parser = parse_color)]
    color: Option<protocol::Color>,

    /// Game type to vote for (tag, hide-and-seek, murder-mystery, climbing, race)
    #[arg(long)]
    vote: Option<GameType>,

    /// Walk around randomly during rounds
    #[arg(long)]
    wander: bool,

    /// Seconds to wait for the server
    #[arg(long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Party Client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig {
        url: args.server,
        name: args.name,
        color: args.color,
        vote: args.vote,
        wander: args.wander,
        connect_timeout: Duration::from_secs(args.timeout),
        ..ClientConfig::default()
    };

    client::run(config).await?;
    Ok(())
}
