use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "cartflow")]
#[command(version, about = "Cartflow - grocery-delivery RPA session engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a site config and run static checks
    Validate {
        /// Path to the site config JSON
        config: PathBuf,

        /// Credentials JSON to check placeholders against
        #[arg(long)]
        credentials: Option<PathBuf>,
    },

    /// Print the step plan of a site config
    Plan {
        /// Path to the site config JSON
        config: PathBuf,
    },

    /// Run a site config against the scripted driver
    DryRun {
        /// Path to the site config JSON
        config: PathBuf,

        /// Credentials JSON (defaults to sample credentials)
        #[arg(long)]
        credentials: Option<PathBuf>,

        /// Input fed automatically when the run suspends
        #[arg(long, default_value = "123456")]
        auto_input: String,
    },
}
