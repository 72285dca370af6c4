//! Party session server.

use server::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Party Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Voting window: {}s", config.session.voting_window_secs);
    info!("  Default game: {}", config.session.default_game);
    if let Some(host) = &config.server.host_name {
        info!("  Host player: {}", host);
    }

    server::run(config).await
}
