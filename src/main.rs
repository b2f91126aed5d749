use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use portal_identity::cli::{self, Cli};
use portal_identity::config::IdentityConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the configured level (read quietly, before logging exists).
    let level = IdentityConfig::load(&cli.config)
        .map(|c| c.log.level)
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = IdentityConfig::load_or_default(&cli.config);

    if let Err(e) = cli::run(cli.command, &config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
