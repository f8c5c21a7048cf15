//! Time-series driver
//!
//! Walks the time grid of a run, asks the generator for one sample per
//! measure per step, and hands full batches to the table adapter.
//!
//! ```text
//! Idle -> Discovering -> Cleaning -> Generating <-> Flushing -> Done
//!                    (any state) -> Failed
//! ```

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::Rng;
use scadasim_rdbc::adapter::TableAdapter;
use scadasim_rdbc::types::Row;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::generator::{MeasureState, WaveformGenerator};
use crate::params::{to_ticks, RunParameters};
use crate::progress::{ProgressListener, RunSummary};
use crate::schema::ColumnLayout;

/// Value written to the log-type column
pub const LOG_TYPE_VALUE: i16 = 1;

/// Value written to the sync flag column
pub const NOT_SYNC_VALUE: i16 = 0;

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Idle,
    /// Reading and classifying the table's columns
    Discovering,
    /// Emptying the table
    Cleaning,
    /// Building rows
    Generating,
    /// Writing a batch
    Flushing,
    /// Finished successfully
    Done,
    /// Aborted
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Cleaning => "cleaning",
            Self::Generating => "generating",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Progress {
    rows_inserted: u64,
    batches: u64,
    first_timestamp: Option<NaiveDateTime>,
    last_timestamp: Option<NaiveDateTime>,
}

/// Drives one simulation run against a table adapter
pub struct TimeSeriesDriver<R: Rng = StdRng> {
    params: RunParameters,
    generator: WaveformGenerator<R>,
    state: RunState,
}

impl TimeSeriesDriver<StdRng> {
    /// Create a driver, seeding the generator from the parameters
    pub fn new(params: RunParameters) -> Result<Self> {
        let generator = match params.seed {
            Some(seed) => WaveformGenerator::seeded(params.bounds, seed),
            None => WaveformGenerator::new(params.bounds),
        };
        Self::with_generator(params, generator)
    }
}

impl<R: Rng> TimeSeriesDriver<R> {
    /// Create a driver around an existing generator
    pub fn with_generator(params: RunParameters, generator: WaveformGenerator<R>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            generator,
            state: RunState::Idle,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run parameters
    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "driver state change");
        self.state = next;
    }

    /// Discover, clean and fill the table
    ///
    /// Failures are reported to the listener before being returned.
    pub async fn run(
        &mut self,
        adapter: &dyn TableAdapter,
        listener: &mut dyn ProgressListener,
    ) -> Result<RunSummary> {
        match self.execute(adapter, listener).await {
            Ok(summary) => {
                self.transition(RunState::Done);
                info!(
                    table = %summary.table,
                    rows = summary.rows_inserted,
                    batches = summary.batches,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "simulation complete"
                );
                listener.on_complete(&summary);
                Ok(summary)
            }
            Err(err) => {
                self.transition(RunState::Failed);
                listener.on_failure(&err);
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        adapter: &dyn TableAdapter,
        listener: &mut dyn ProgressListener,
    ) -> Result<RunSummary> {
        let started = Instant::now();

        self.transition(RunState::Discovering);
        let metadata = adapter.discover_columns(&self.params.table).await?;
        let layout = ColumnLayout::classify(&metadata)?;
        info!(
            table = %layout.table,
            measures = layout.measures.len(),
            "discovered table columns"
        );
        listener.on_columns(&layout);

        self.transition(RunState::Cleaning);
        adapter.clean_table(&layout.table).await?;
        info!(table = %layout.table, "table cleaned");

        self.transition(RunState::Generating);
        let mut states: Vec<MeasureState> = layout
            .measures
            .iter()
            .map(|_| self.generator.initialize())
            .collect();

        let grid = self.params.time_grid();
        let capacity = grid.expected_len().min(self.params.batch_size as u64) as usize;
        info!(
            start = %self.params.window_start(),
            end = %self.params.window_end(),
            interval_minutes = self.params.interval_minutes,
            rows = grid.expected_len(),
            "generating rows"
        );

        let mut batch = Vec::with_capacity(capacity);
        let mut progress = Progress::default();

        for timestamp in grid {
            let row = self.build_row(&layout, &mut states, timestamp)?;
            batch.push(row);
            progress.first_timestamp.get_or_insert(timestamp);
            progress.last_timestamp = Some(timestamp);

            if batch.len() >= self.params.batch_size {
                self.flush(adapter, &layout, &mut batch, &mut progress, listener)
                    .await?;
            }
        }

        if !batch.is_empty() {
            self.flush(adapter, &layout, &mut batch, &mut progress, listener)
                .await?;
        }

        Ok(RunSummary {
            table: layout.table,
            rows_inserted: progress.rows_inserted,
            batches: progress.batches,
            first_timestamp: progress.first_timestamp,
            last_timestamp: progress.last_timestamp,
            elapsed: started.elapsed(),
            insert_stats: adapter.stats(),
        })
    }

    fn build_row(
        &mut self,
        layout: &ColumnLayout,
        states: &mut [MeasureState],
        timestamp: NaiveDateTime,
    ) -> Result<Row> {
        let ticks = to_ticks(timestamp).ok_or_else(|| {
            SimError::validation(format!("timestamp {} cannot be stored as ticks", timestamp))
        })?;

        let mut row = Row::with_capacity(3 + layout.measures.len() * 2);
        row.push(layout.timestamp.as_str(), ticks);
        row.push(layout.log_type.as_str(), LOG_TYPE_VALUE);
        row.push(layout.not_sync.as_str(), NOT_SYNC_VALUE);

        for (pair, state) in layout.measures.iter().zip(states.iter_mut()) {
            let sample = self
                .generator
                .advance(state, self.params.interval_minutes);
            row.push(pair.measure.as_str(), sample.value);
            row.push(pair.quality.as_str(), sample.quality);
        }

        Ok(row)
    }

    async fn flush(
        &mut self,
        adapter: &dyn TableAdapter,
        layout: &ColumnLayout,
        batch: &mut Vec<Row>,
        progress: &mut Progress,
        listener: &mut dyn ProgressListener,
    ) -> Result<()> {
        self.transition(RunState::Flushing);

        let written = adapter.insert_batch(&layout.table, batch).await?;
        progress.rows_inserted += written;
        progress.batches += 1;
        batch.clear();

        debug!(
            rows = written,
            total = progress.rows_inserted,
            batch = progress.batches,
            "batch committed"
        );
        if let Some(last) = progress.last_timestamp {
            listener.on_flush(progress.rows_inserted, last);
        }

        self.transition(RunState::Generating);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Idle.to_string(), "idle");
        assert_eq!(RunState::Flushing.to_string(), "flushing");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }
}
