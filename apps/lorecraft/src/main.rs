//! # lorecraft
//!
//! The main binary: a clap CLI over the lorecraft core plus the MCP tool
//! server (`lorecraft serve`) exposing the graph to AI clients over stdio.
//!
//! ## Usage
//!
//! ```bash
//! lorecraft init --name my-world
//! lorecraft ingest --full
//! lorecraft query entity "Westport"
//! lorecraft serve
//! ```

mod cli;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logging goes to stderr only: stdout carries command output, and in
    // serve mode it is reserved for the MCP stdio transport.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "lorecraft=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
