use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod cli;
mod command;
mod compact;
mod config;
mod domain;
mod error;
mod filter;
mod footer;
mod preconditions;
mod reconcile;
mod render;
mod session;
mod tree;
mod version;

use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Compact { input } = &cli.command {
        return command::run_compact(input.as_deref());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Status { change } => command::run_status(&config, &change).await,
        Commands::Preview { change, edit } => command::run_preview(&config, &change, &edit).await,
        Commands::Apply { change, edit } => command::run_apply(&config, &change, &edit).await,
        Commands::Local {
            repo,
            branch,
            message,
            edit,
        } => command::run_local(&config, repo, branch, message, &edit).await,
        Commands::Compact { input } => command::run_compact(input.as_deref()),
    }
}
