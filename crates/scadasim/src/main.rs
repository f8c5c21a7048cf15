//! scadasim - fill a SCADA log table with synthetic measurements
//!
//! Usage:
//!   scadasim simulate -t ANA -i 5 -s 01-01-2024 -e 31-01-2024 \
//!     --connection-string "Provider=SQLite;Data Source=scada.db"
//!
//!   # Connection string and generation settings from a file
//!   scadasim simulate -t ANA -s 2024-01-01 -e 2024-01-07 --config scadasim.yaml

use clap::Parser;
use scadasim::{Cli, Commands, ConsoleProgress};
use scadasim_core::{ErrorKind, SimError};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Simulate(args) => {
            let mut progress = ConsoleProgress::stdout();
            scadasim::simulate(args, &mut progress).await.map(|_| ())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            exit_code(&err)
        }
    }
}

/// Bad input exits with 2, a failed run with 1
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<SimError>().map(SimError::kind) {
        Some(ErrorKind::Configuration | ErrorKind::Validation) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
