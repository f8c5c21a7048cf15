//! Table adapter for scadasim-rdbc
//!
//! The capability interface the simulator drives: discover a table's
//! columns, empty it, and write batches of rows transactionally. One
//! generic implementation covers every backend; the differences live in the
//! [`SqlDialect`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::connection::{Connection, DatabaseType};
use crate::dialect::{dialect_for, SqlDialect};
use crate::error::{Error, Result};
use crate::security::validate_table_name;
use crate::types::{Row, TableMetadata};

/// Insert statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertStats {
    /// Total rows committed
    pub rows_written: u64,
    /// Total rows in batches that were rolled back
    pub rows_failed: u64,
    /// Total batches committed
    pub batches_written: u64,
    /// Total batches rolled back
    pub batches_failed: u64,
    /// Total time spent in committed batches
    pub total_write_time: Duration,
    /// Average rows per second over committed batches
    pub rows_per_second: f64,
}

/// Atomic insert statistics
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicInsertStats {
    pub rows_written: AtomicU64,
    pub rows_failed: AtomicU64,
    pub batches_written: AtomicU64,
    pub batches_failed: AtomicU64,
    pub total_write_time_us: AtomicU64,
}

impl AtomicInsertStats {
    /// Record a committed batch
    pub fn record_batch(&self, rows: u64, duration: Duration) {
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.total_write_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a rolled back batch
    pub fn record_batch_failure(&self, rows: u64) {
        self.rows_failed.fetch_add(rows, Ordering::Relaxed);
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot
    pub fn snapshot(&self) -> InsertStats {
        let rows = self.rows_written.load(Ordering::Relaxed);
        let time_us = self.total_write_time_us.load(Ordering::Relaxed);
        let rps = if time_us > 0 {
            (rows as f64 * 1_000_000.0) / time_us as f64
        } else {
            0.0
        };

        InsertStats {
            rows_written: rows,
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            total_write_time: Duration::from_micros(time_us),
            rows_per_second: rps,
        }
    }
}

/// Backend-agnostic access to one data-logger table
#[async_trait]
pub trait TableAdapter: Send + Sync {
    /// The backend behind this adapter
    fn database_type(&self) -> DatabaseType;

    /// Quote an identifier for this backend
    fn quote_identifier(&self, name: &str) -> String;

    /// List the table's columns in ordinal order
    ///
    /// The returned metadata carries the table spelling that resolved in the
    /// catalog; use it for every later call. Fails with a schema error when
    /// the table does not exist or has no columns.
    async fn discover_columns(&self, table: &str) -> Result<TableMetadata>;

    /// Remove all rows and reset the identity counter where the backend has one
    async fn clean_table(&self, table: &str) -> Result<()>;

    /// Insert rows in one transaction, returns the number of rows written
    ///
    /// Every row must carry the same columns, in the same order, as the
    /// first. On any failure the transaction is rolled back and the error
    /// returned. An empty batch is a no-op.
    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Insert statistics so far
    fn stats(&self) -> InsertStats;

    /// Close the underlying connection
    async fn close(&self) -> Result<()>;
}

/// [`TableAdapter`] over a single connection, parameterized by dialect
pub struct SqlTableAdapter {
    conn: Box<dyn Connection>,
    dialect: Box<dyn SqlDialect>,
    stats: AtomicInsertStats,
}

impl SqlTableAdapter {
    /// Create an adapter with an explicit dialect
    pub fn new(conn: Box<dyn Connection>, dialect: Box<dyn SqlDialect>) -> Self {
        Self {
            conn,
            dialect,
            stats: AtomicInsertStats::default(),
        }
    }

    /// Create an adapter using the connection's native dialect
    pub fn for_connection(conn: Box<dyn Connection>) -> Self {
        let dialect = dialect_for(conn.database_type());
        Self::new(conn, dialect)
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    fn validate_batch(rows: &[Row]) -> Result<&Row> {
        let first = rows
            .first()
            .ok_or_else(|| Error::internal("validate_batch called with an empty batch"))?;
        if first.is_empty() {
            return Err(Error::schema("batch rows have no columns"));
        }

        for (idx, row) in rows.iter().enumerate().skip(1) {
            if !row.same_columns(first) {
                return Err(Error::schema(format!(
                    "row {} has columns [{}] but the batch expects [{}]",
                    idx,
                    row.columns().join(", "),
                    first.columns().join(", ")
                )));
            }
        }
        Ok(first)
    }
}

#[async_trait]
impl TableAdapter for SqlTableAdapter {
    fn database_type(&self) -> DatabaseType {
        self.conn.database_type()
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    async fn discover_columns(&self, table: &str) -> Result<TableMetadata> {
        validate_table_name(table)?;

        for candidate in self.dialect.table_candidates(table) {
            let query = self.dialect.list_columns_query(&candidate);
            let rows = self.conn.query(&query.sql, &query.params).await?;

            let columns: Vec<_> = rows
                .iter()
                .enumerate()
                .filter_map(|(pos, row)| self.dialect.parse_column(row, pos))
                .collect();

            if columns.is_empty() {
                debug!(table = %candidate, dialect = self.dialect.name(), "no columns found");
                continue;
            }

            debug!(table = %candidate, columns = columns.len(), "columns discovered");
            let mut metadata = TableMetadata::new(candidate);
            metadata.columns = columns;
            return Ok(metadata);
        }

        Err(Error::table_not_found(table))
    }

    async fn clean_table(&self, table: &str) -> Result<()> {
        validate_table_name(table)?;

        for step in self.dialect.cleanup_steps(table) {
            match self.conn.execute(&step.sql, &step.params).await {
                Ok(affected) => debug!(sql = %step.sql, affected, "cleanup step done"),
                Err(e) if step.best_effort => {
                    debug!(sql = %step.sql, error = %e, "best-effort cleanup step failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let first = Self::validate_batch(rows)?;
        let columns: Vec<&str> = first.columns().iter().map(String::as_str).collect();
        let sql = self.dialect.insert_sql(table, &columns);
        let count = rows.len() as u64;
        let start = Instant::now();

        let tx = self.conn.begin().await?;
        for row in rows {
            if let Err(e) = tx.execute(&sql, row.values()).await {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed insert also failed");
                }
                self.stats.record_batch_failure(count);
                return Err(e);
            }
        }

        if let Err(e) = tx.commit().await {
            self.stats.record_batch_failure(count);
            return Err(e);
        }

        let elapsed = start.elapsed();
        self.stats.record_batch(count, elapsed);
        debug!(
            table,
            rows = count,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch committed"
        );
        Ok(count)
    }

    fn stats(&self) -> InsertStats {
        self.stats.snapshot()
    }

    async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}
