//! CLI argument parsing for scadasim

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// scadasim - synthetic SCADA measurements for data-logger tables
///
/// Empties an existing log table and refills a date window with one row per
/// interval, every measure following its own noisy sine wave.
#[derive(Parser, Debug)]
#[command(name = "scadasim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean a table and fill it with generated rows
    Simulate(SimulateArgs),
}

/// Arguments of `scadasim simulate`
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Target table
    #[arg(short, long)]
    pub table: String,

    /// Minutes between rows
    #[arg(short, long, default_value_t = 1)]
    pub interval: u32,

    /// First day (dd-MM-yyyy or yyyy-MM-dd)
    #[arg(short, long)]
    pub start: String,

    /// Last day, filled through 23:59:59 (dd-MM-yyyy or yyyy-MM-dd)
    #[arg(short, long)]
    pub end: String,

    /// Settings file (defaults to ./scadasim.yaml when present)
    #[arg(short, long, env = "SCADASIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Connection descriptor, e.g. "Provider=SQLite;Data Source=scada.db"
    #[arg(long, env = "SCADASIM_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Rows per committed batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Lowest generated value
    #[arg(long, allow_negative_numbers = true)]
    pub value_min: Option<f64>,

    /// Highest generated value
    #[arg(long, allow_negative_numbers = true)]
    pub value_max: Option<f64>,

    /// Peak-to-peak noise added to each sample
    #[arg(long)]
    pub noise: Option<f64>,

    /// Fixed RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}
