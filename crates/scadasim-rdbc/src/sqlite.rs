//! SQLite backend implementation for scadasim-rdbc
//!
//! rusqlite is synchronous, so every call is moved onto tokio's blocking
//! pool. The connection sits behind a std mutex shared with the open
//! transaction, if any.

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction,
};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Descriptor keys naming the database file
const DATA_SOURCE_KEYS: [&str; 3] = ["Data Source", "DataSource", "Filename"];

const MEMORY_PATH: &str = ":memory:";

/// Borrowed parameter wrapper for rusqlite binding
struct SqliteParam<'a>(&'a Value);

impl rusqlite::ToSql for SqliteParam<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sv;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sv::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sv::Integer(i64::from(*b))),
            Value::Int16(n) => ToSqlOutput::Owned(Sv::Integer(i64::from(*n))),
            Value::Int32(n) => ToSqlOutput::Owned(Sv::Integer(i64::from(*n))),
            Value::Int64(n) => ToSqlOutput::Owned(Sv::Integer(*n)),
            Value::Float32(n) => ToSqlOutput::Owned(Sv::Real(f64::from(*n))),
            Value::Float64(n) => ToSqlOutput::Owned(Sv::Real(*n)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int64(n),
        ValueRef::Real(n) => Value::Float64(n),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => return Err(Error::type_conversion("BLOB columns are not supported")),
    })
}

fn query_error(e: rusqlite::Error, sql: &str) -> Error {
    Error::Query {
        message: e.to_string(),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

fn lock(
    conn: &Mutex<rusqlite::Connection>,
) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
    conn.lock().map_err(|_| Error::internal("SQLite connection mutex poisoned"))
}

fn execute_blocking(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let mut stmt = conn.prepare_cached(sql).map_err(|e| query_error(e, sql))?;
    let affected = stmt
        .execute(rusqlite::params_from_iter(params.iter().map(SqliteParam)))
        .map_err(|e| query_error(e, sql))?;
    Ok(affected as u64)
}

fn query_blocking(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(e, sql))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(params.iter().map(SqliteParam)))
        .map_err(|e| query_error(e, sql))?;

    let mut out = Vec::new();
    while let Some(sq_row) = rows.next().map_err(|e| query_error(e, sql))? {
        let mut row = Row::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value = sq_row.get_ref(idx).map_err(|e| query_error(e, sql))?;
            row.push(name.as_str(), value_from_ref(value)?);
        }
        out.push(row);
    }
    Ok(out)
}

/// Run `f` against the connection on the blocking pool
async fn run_blocking<T, F>(conn: &Arc<Mutex<rusqlite::Connection>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let guard = lock(&conn)?;
        f(&*guard)
    })
    .await
    .map_err(|e| Error::internal(format!("SQLite worker task failed: {}", e)))?
}

/// SQLite connection implementation
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open the database named by the descriptor's `Data Source`
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let path = config.get_any(&DATA_SOURCE_KEYS).ok_or_else(|| {
            Error::config("SQLite connection string requires 'Data Source=<path>'")
        })?;
        Self::open_path(path)
    }

    /// Open a database file, or a private in-memory database for `:memory:`
    pub fn open_path(path: &str) -> Result<Self> {
        let conn = if path == MEMORY_PATH {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(Path::new(path))
        }
        .map_err(|e| {
            let message = format!("failed to open SQLite database '{}'", path);
            Error::connection_with_source(message, e)
        })?;

        conn.busy_timeout(Duration::from_millis(1_000))
            .map_err(|e| Error::connection_with_source("failed to configure SQLite", e))?;

        debug!(path, "SQLite database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let (sql, params) = (sql.to_string(), params.to_vec());
        run_blocking(&self.conn, move |conn| query_blocking(conn, &sql, &params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        let (sql, params) = (sql.to_string(), params.to_vec());
        run_blocking(&self.conn, move |conn| execute_blocking(conn, &sql, &params)).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        run_blocking(&self.conn, |conn| {
            conn.execute_batch("BEGIN")
                .map_err(|e| Error::transaction_with_source("BEGIN failed", e))
        })
        .await?;

        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            finished: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}

/// SQLite transaction
pub struct SqliteTransaction {
    conn: Arc<Mutex<rusqlite::Connection>>,
    finished: AtomicBool,
}

impl SqliteTransaction {
    async fn finish(&self, sql: &'static str) -> Result<()> {
        run_blocking(&self.conn, move |conn| {
            conn.execute_batch(sql)
                .map_err(|e| Error::transaction_with_source(format!("{} failed", sql), e))
        })
        .await?;
        // Left unset on failure so drop still rolls back.
        self.finished.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let (sql, params) = (sql.to_string(), params.to_vec());
        run_blocking(&self.conn, move |conn| execute_blocking(conn, &sql, &params)).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished.load(Ordering::Relaxed) {
            return;
        }
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        if !conn.is_autocommit() {
            match conn.execute_batch("ROLLBACK") {
                Ok(()) => debug!("SQLite transaction rolled back on drop"),
                Err(e) => warn!(error = %e, "rollback of abandoned SQLite transaction failed"),
            }
        }
    }
}

/// SQLite connection factory
#[derive(Debug, Clone, Default)]
pub struct SqliteConnectionFactory;

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let config = config.clone();
        let conn = tokio::task::spawn_blocking(move || SqliteConnection::open(&config))
            .await
            .map_err(|e| Error::internal(format!("SQLite worker task failed: {}", e)))??;
        Ok(Box::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn memory() -> SqliteConnection {
        SqliteConnection::open_path(MEMORY_PATH).unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let conn = memory();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v REAL, q SMALLINT, s TEXT)", &[])
            .await
            .unwrap();

        let affected = conn
            .execute(
                "INSERT INTO t (v, q, s) VALUES (?1, ?2, ?3)",
                &[Value::Float64(1.5), Value::Int16(192), Value::from("x")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = conn.query("SELECT v, q, s FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("v"), Some(&Value::Float64(1.5)));
        assert_eq!(rows[0].get_by_name("q"), Some(&Value::Int64(192)));
        assert_eq!(rows[0].get_by_name("s"), Some(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let conn = memory();
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).await.unwrap();

        let tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO t VALUES (?1)", &[Value::Int32(1)]).await.unwrap();
        tx.commit().await.unwrap();

        let tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO t VALUES (?1)", &[Value::Int32(2)]).await.unwrap();
        tx.rollback().await.unwrap();

        let rows = conn.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Int64(1)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let conn = memory();
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).await.unwrap();

        {
            let tx = conn.begin().await.unwrap();
            tx.execute("INSERT INTO t VALUES (?1)", &[Value::Int32(7)]).await.unwrap();
        }

        let rows = conn.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Int64(0)));

        // A new transaction can start after the implicit rollback
        let tx = conn.begin().await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let conn = memory();
        conn.close().await.unwrap();

        let err = conn.execute("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connection);
    }

    #[test]
    fn test_open_requires_data_source() {
        let config = ConnectionConfig::parse("Provider=SQLite;Cache=Shared").unwrap();
        let err = SqliteConnection::open(&config).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn test_failed_statement_keeps_sql() {
        let conn = memory();
        let err = conn.execute("INSERT INTO missing VALUES (1)", &[]).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Query);
        assert_eq!(err.sql(), Some("INSERT INTO missing VALUES (1)"));
    }
}
