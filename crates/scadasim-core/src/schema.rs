//! Column classification for data-logger tables
//!
//! A data-logger table carries a fixed set of system columns plus any
//! number of measures, each paired with a `_<measure>_Q` quality column.

use scadasim_rdbc::types::TableMetadata;
use tracing::debug;

use crate::error::{Result, SimError};

/// Auto-increment key, never written
pub const ID_COLUMN: &str = "ID";

/// Timestamp column holding .NET-style ticks
pub const TIMESTAMP_COLUMN: &str = "UTCTimestamp_Ticks";

/// Log-type discriminator column
pub const LOG_TYPE_COLUMN: &str = "LogType";

/// Sync-pending flag column
pub const NOT_SYNC_COLUMN: &str = "NotSync";

const SYSTEM_COLUMNS: [&str; 4] = [ID_COLUMN, TIMESTAMP_COLUMN, LOG_TYPE_COLUMN, NOT_SYNC_COLUMN];

/// Name of the quality column paired with a measure
pub fn quality_column_name(measure: &str) -> String {
    format!("_{}_Q", measure)
}

/// Whether a column name is one of the system columns
pub fn is_system_column(name: &str) -> bool {
    SYSTEM_COLUMNS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// A measure and its quality column, spelled as in the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurePair {
    /// Measure column
    pub measure: String,
    /// Quality column
    pub quality: String,
}

/// Classified columns of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Table name as resolved by discovery
    pub table: String,
    /// Timestamp column
    pub timestamp: String,
    /// Log-type column
    pub log_type: String,
    /// Sync flag column
    pub not_sync: String,
    /// Measures in schema order
    pub measures: Vec<MeasurePair>,
}

impl ColumnLayout {
    /// Classify the columns of a discovered table
    ///
    /// Fails when the table has no columns, lacks a system column, has no
    /// measures, or has a measure without its quality column.
    pub fn classify(table: &TableMetadata) -> Result<Self> {
        if table.columns.is_empty() {
            return Err(SimError::schema(format!("table '{}' has no columns", table.name)));
        }

        let system = |name: &str| -> Result<String> {
            table
                .column(name)
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    SimError::schema(format!(
                        "table '{}' is missing system column '{}'",
                        table.name, name
                    ))
                })
        };
        let timestamp = system(TIMESTAMP_COLUMN)?;
        let log_type = system(LOG_TYPE_COLUMN)?;
        let not_sync = system(NOT_SYNC_COLUMN)?;

        let mut measures = Vec::new();
        for column in &table.columns {
            if is_system_column(&column.name) || column.name.starts_with('_') {
                continue;
            }

            let expected = quality_column_name(&column.name);
            let quality = table.column(&expected).ok_or_else(|| {
                SimError::schema(format!(
                    "table '{}' is missing quality column '{}' for measure '{}'",
                    table.name, expected, column.name
                ))
            })?;

            measures.push(MeasurePair {
                measure: column.name.clone(),
                quality: quality.name.clone(),
            });
        }

        if measures.is_empty() {
            return Err(SimError::schema(format!(
                "table '{}' has no measure columns",
                table.name
            )));
        }

        debug!(table = %table.name, measures = measures.len(), "classified columns");

        Ok(Self {
            table: table.name.clone(),
            timestamp,
            log_type,
            not_sync,
            measures,
        })
    }
}
