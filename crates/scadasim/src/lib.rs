//! scadasim command-line application
//!
//! Argument parsing, the settings file and console progress for the
//! `scadasim` binary.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod console;

pub use cli::{Cli, Commands, SimulateArgs};
pub use config::Settings;
pub use console::ConsoleProgress;

use scadasim_core::progress::{ProgressListener, RunSummary};
use scadasim_core::simulator::Simulator;
use scadasim_core::SimError;
use tracing::info;

/// Run `scadasim simulate`
pub async fn simulate(
    args: &SimulateArgs,
    listener: &mut dyn ProgressListener,
) -> anyhow::Result<RunSummary> {
    let settings = Settings::load(args.config.as_deref())
        .map_err(|e| SimError::configuration(format!("{:#}", e)))?;
    let (descriptor, params) = settings.resolve(args)?;

    info!(
        table = %params.table,
        start = %params.start_date,
        end = %params.end_date,
        interval_minutes = params.interval_minutes,
        batch_size = params.batch_size,
        "simulation requested"
    );

    let summary = Simulator::new(descriptor, params).run(listener).await?;
    Ok(summary)
}
