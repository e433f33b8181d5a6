mod cli;
mod server;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil::config::VigilConfig;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Incident memory and advisory healing MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve,
    /// Show statistics for the on-disk vector index
    Stats,
    /// Check the vector index, its text sidecar, and the policy file
    Doctor,
    /// Run events from a JSON file through policies and the advisory pipeline
    Evaluate {
        /// A single event object or an array of events, processed in order
        path: PathBuf,
    },
    /// List the healing policies in effect
    Policies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VigilConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_stdio(config).await?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Evaluate { path } => cli::evaluate::evaluate(&config, &path).await?,
        Command::Policies => cli::policies::policies(&config)?,
    }

    Ok(())
}
