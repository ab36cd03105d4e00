//! ncup CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ncup_cli::cmd;
use ncup_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Reports go to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            tracks,
            state_dir,
            config,
        } => cmd::update::update(&tracks, state_dir, config.as_deref()).await,
        Commands::Diff { old, new } => cmd::diff::diff(&old, &new),
        Commands::Check { files } => cmd::check::check(&files),
    }
}
