//! bassist - broadcast assistant controller

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use bassist_cli::{app, cli::Cli, config::CliConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration, flags win over the file
    let config = CliConfig::resolve(&cli)?;

    setup_logging(config.verbose);

    let outcome = app::run(&cli.command, &config)
        .await
        .with_context(|| format!("Talking to the bridge at {}", config.endpoint));

    match outcome {
        Ok(Some(rc)) if rc != 0 => {
            error!("Command failed with code {}", rc);
            std::process::exit(1);
        }
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
