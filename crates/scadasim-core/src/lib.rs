//! # scadasim-core
//!
//! Synthetic measurement generation for data-logger tables.
//!
//! A run discovers the columns of an existing table, empties it, and fills a
//! date window with one row per interval. Every measure column gets a value
//! from its own sine wave plus noise, and its `_<measure>_Q` column gets a
//! quality code.
//!
//! ```rust,ignore
//! use scadasim_core::prelude::*;
//!
//! let params = RunParameters::new("ANA", parse_date("01-01-2024")?, parse_date("07-01-2024")?)
//!     .with_interval(5);
//! let summary = Simulator::new("Provider=SQLite;Data Source=scada.db", params)
//!     .run(&mut NoopProgress)
//!     .await?;
//! println!("{} rows", summary.rows_inserted);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod driver;
pub mod error;
pub mod generator;
pub mod params;
pub mod progress;
pub mod schema;
pub mod simulator;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::driver::{RunState, TimeSeriesDriver};
    pub use crate::error::{ErrorKind, Result, SimError};
    pub use crate::generator::{
        Bounds, MeasureState, Sample, WaveformGenerator, QUALITY_BAD, QUALITY_GOOD,
    };
    pub use crate::params::{parse_date, to_ticks, RunParameters, TimeGrid};
    pub use crate::progress::{NoopProgress, ProgressListener, RunSummary};
    pub use crate::schema::{ColumnLayout, MeasurePair};
    pub use crate::simulator::Simulator;
}

pub use error::{ErrorKind, Result, SimError};
