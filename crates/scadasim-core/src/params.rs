//! Run parameters, date parsing and the time grid

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use scadasim_rdbc::security::validate_table_name;

use crate::error::{Result, SimError};
use crate::generator::Bounds;

/// Ticks per second (one tick is 100 ns)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Seconds between 0001-01-01T00:00:00 and the Unix epoch
const EPOCH_OFFSET_SECONDS: i64 = 62_135_596_800;

/// Default sampling interval in minutes
pub const DEFAULT_INTERVAL_MINUTES: u32 = 1;

/// Default number of rows per committed batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Years a tick timestamp can represent
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1..=9999;

const DATE_FORMATS: [&str; 2] = ["%d-%m-%Y", "%Y-%m-%d"];

/// Parse a calendar date in `dd-MM-yyyy` or `yyyy-MM-dd` form
///
/// Years outside 1..=9999 are rejected.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    let date = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        .ok_or_else(|| {
            SimError::validation(format!(
                "invalid date '{}', expected dd-MM-yyyy or yyyy-MM-dd",
                input
            ))
        })?;
    check_year("date", date)?;
    Ok(date)
}

fn check_year(field: &str, date: NaiveDate) -> Result<()> {
    if YEAR_RANGE.contains(&date.year()) {
        return Ok(());
    }
    Err(SimError::validation(format!(
        "{} {} is out of range, the year must be between {} and {}",
        field,
        date,
        YEAR_RANGE.start(),
        YEAR_RANGE.end()
    )))
}

/// Convert a timestamp to ticks since 0001-01-01T00:00:00
///
/// The timestamp is read as UTC. Returns `None` when the result does not
/// fit in an `i64`.
pub fn to_ticks(timestamp: NaiveDateTime) -> Option<i64> {
    let utc = timestamp.and_utc();
    utc.timestamp()
        .checked_add(EPOCH_OFFSET_SECONDS)?
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(utc.timestamp_subsec_nanos() / 100))
}

/// Convert ticks back to a timestamp
pub fn from_ticks(ticks: i64) -> Option<NaiveDateTime> {
    let seconds = ticks.div_euclid(TICKS_PER_SECOND) - EPOCH_OFFSET_SECONDS;
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos).map(|dt| dt.naive_utc())
}

/// Parameters of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    /// Target table
    pub table: String,
    /// Minutes between consecutive rows
    pub interval_minutes: u32,
    /// First day, starting at midnight
    pub start_date: NaiveDate,
    /// Last day, through 23:59:59
    pub end_date: NaiveDate,
    /// Rows per committed batch
    pub batch_size: usize,
    /// Value bounds and noise
    pub bounds: Bounds,
    /// Fixed RNG seed
    pub seed: Option<u64>,
}

impl RunParameters {
    /// Create parameters with default interval, batch size and bounds
    pub fn new(table: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            table: table.into(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            start_date,
            end_date,
            batch_size: DEFAULT_BATCH_SIZE,
            bounds: Bounds::default(),
            seed: None,
        }
    }

    /// Set the sampling interval
    pub fn with_interval(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the value bounds
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Set a fixed RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the parameters a run needs to proceed
    ///
    /// A start date after the end date is allowed here and yields an
    /// empty run; see [`RunParameters::validate_window`].
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(SimError::validation("table name is required"));
        }
        validate_table_name(&self.table).map_err(|e| SimError::validation(e.detail()))?;
        check_year("start date", self.start_date)?;
        check_year("end date", self.end_date)?;
        if self.interval_minutes == 0 {
            return Err(SimError::validation("interval must be a positive number of minutes"));
        }
        if self.batch_size == 0 {
            return Err(SimError::validation("batch size must be positive"));
        }

        let Bounds {
            min,
            max,
            noise_amplitude,
        } = self.bounds;
        if !min.is_finite() || !max.is_finite() {
            return Err(SimError::validation("value bounds must be finite"));
        }
        if min >= max {
            return Err(SimError::validation(format!(
                "value min ({}) must be below value max ({})",
                min, max
            )));
        }
        if !noise_amplitude.is_finite() || noise_amplitude < 0.0 {
            return Err(SimError::validation(format!(
                "noise amplitude must be a non-negative number, got {}",
                noise_amplitude
            )));
        }

        Ok(())
    }

    /// Reject a window whose start date is after its end date
    pub fn validate_window(&self) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(SimError::validation(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }

    /// First grid point
    pub fn window_start(&self) -> NaiveDateTime {
        self.start_date.and_time(NaiveTime::MIN)
    }

    /// Last instant of the window, 23:59:59 on the end date
    pub fn window_end(&self) -> NaiveDateTime {
        self.end_date.and_time(NaiveTime::MIN + Duration::seconds(SECONDS_PER_DAY - 1))
    }

    /// Timestamps of every row the run writes
    pub fn time_grid(&self) -> TimeGrid {
        TimeGrid::new(self.window_start(), self.window_end(), self.interval_minutes)
    }
}

/// Iterator over a closed, evenly spaced timestamp range
#[derive(Debug, Clone)]
pub struct TimeGrid {
    next: Option<NaiveDateTime>,
    end: NaiveDateTime,
    step: Duration,
}

impl TimeGrid {
    /// Create a grid from `start` through `end` inclusive
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, interval_minutes: u32) -> Self {
        Self {
            next: Some(start),
            end,
            step: Duration::minutes(i64::from(interval_minutes.max(1))),
        }
    }

    /// Number of timestamps left in the grid
    pub fn expected_len(&self) -> u64 {
        match self.next {
            Some(next) if next <= self.end => {
                let span = (self.end - next).num_seconds();
                (span / self.step.num_seconds()) as u64 + 1
            }
            _ => 0,
        }
    }
}

impl Iterator for TimeGrid {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|ts| *ts <= self.end)?;
        self.next = current.checked_add_signed(self.step);
        Some(current)
    }
}
