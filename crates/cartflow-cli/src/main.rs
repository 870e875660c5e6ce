mod cli;
mod collaborators;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Validate { config, credentials } => {
            commands::validate(config, credentials.as_deref(), cli.format)
        }
        Commands::Plan { config } => commands::plan(config, cli.format),
        Commands::DryRun { config, credentials, auto_input } => {
            commands::dry_run(config, credentials.as_deref(), auto_input, cli.format).await
        }
    }
}
