use clap::Parser;
use tracing_subscriber::EnvFilter;
use treelike::{adapter::BroadcastHub, config::TreelikeConfig, state::LocalState};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("treelike=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TreelikeConfig::load_from_file(&cli.config).await?;
    if let Some(store) = cli.store {
        config.local.storage_file = store;
    }
    tracing::info!(
        "Using local state {} at {}",
        config.local.name,
        config.local.storage_file.display()
    );

    let hub = BroadcastHub::new();
    let state = LocalState::open(&config.local, &hub);
    state.wait_loaded().await;

    match &cli.command {
        Commands::Put(args) => commands::put::run(&state, args).await,
        Commands::Get(args) => commands::get::run(&state, args).await,
        Commands::Ls(args) => commands::ls::run(&state, args).await,
        Commands::Watch(args) => commands::watch::run(&state, args).await,
    }
}
