// src/main.rs

use anyhow::Result;
use clap::Parser;
use fleet_updater::commands::{run_update, RunOptions};
use tracing::error;

#[derive(Parser)]
#[command(name = "fleet-updater")]
#[command(author, version, about = "Update OS packages and report status into a shared GitHub issue", long_about = None)]
struct Cli {
    /// Number of the issue carrying the status table
    ///
    /// Validated before any network call; non-numeric input exits non-zero.
    issue_number: u64,

    /// Act as this hostname instead of the machine's own
    #[arg(long)]
    hostname: Option<String>,

    /// Pre-approve stopping (and restarting) running applications that block
    /// an update, instead of skipping them
    #[arg(long)]
    confirm_before_stop: bool,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = RunOptions {
        issue_number: cli.issue_number,
        hostname: cli.hostname,
        confirm_before_stop: cli.confirm_before_stop,
    };

    if let Err(e) = run_update(&options) {
        error!("Update run failed: {e}");
        return Err(e.into());
    }
    Ok(())
}
