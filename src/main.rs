//! Main entry point for the rtt-harvester CLI

use clap::Parser;
use rtt_harvester::cli::{Cli, CliError, Commands};
use rtt_harvester::shutdown::{self, ShutdownCoordinator};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rtt_harvester=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Install global shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing current writes...");
                shutdown.request_shutdown();
            }
        }
    });

    let result: Result<(), CliError> = match &cli.command {
        Commands::Harvest(args) => args.execute(&cli, shutdown.clone()).await.map(|_| ()),
        Commands::Anchors(cmd) => cmd.execute(&cli, shutdown.clone()).await.map(|_| ()),
        Commands::Status(cmd) => cmd.execute(&cli).map(|_| ()),
    };

    if let Err(e) = result {
        if e.is_shutdown() {
            warn!("Interrupted - progress is saved, rerun to resume");
            std::process::exit(130);
        }
        let e = anyhow::anyhow!(e);
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
