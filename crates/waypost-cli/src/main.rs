//! Binary entry point for the Waypost CLI.

use clap::Parser;
use waypost_cli::{execute, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging before any command runs
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let exit_code = execute(cli).await;
    std::process::exit(exit_code);
}
