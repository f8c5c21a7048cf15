//! Progress reporting
//!
//! The driver reports what it is doing through a [`ProgressListener`]; the
//! CLI prints, tests record.

use chrono::NaiveDateTime;
use scadasim_rdbc::adapter::InsertStats;
use std::time::Duration;

use crate::error::SimError;
use crate::schema::ColumnLayout;

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Table that was filled
    pub table: String,
    /// Rows committed
    pub rows_inserted: u64,
    /// Batches committed
    pub batches: u64,
    /// Timestamp of the first row
    pub first_timestamp: Option<NaiveDateTime>,
    /// Timestamp of the last row
    pub last_timestamp: Option<NaiveDateTime>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Adapter statistics at the end of the run
    pub insert_stats: InsertStats,
}

/// Observer of a simulation run
///
/// Every callback defaults to doing nothing.
pub trait ProgressListener {
    /// Columns were classified
    fn on_columns(&mut self, _layout: &ColumnLayout) {}

    /// A batch was committed
    fn on_flush(&mut self, _rows_so_far: u64, _last_timestamp: NaiveDateTime) {}

    /// The run finished
    fn on_complete(&mut self, _summary: &RunSummary) {}

    /// The run failed
    fn on_failure(&mut self, _error: &SimError) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressListener for NoopProgress {}
