//! SQL Server backend implementation for scadasim-rdbc
//!
//! Provides Microsoft SQL Server-specific implementations:
//! - ADO.NET connection strings handed to tiberius as-is
//! - Typed TDS parameter binding
//! - Transactions with deferred rollback on drop

use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tiberius::{Client, ColumnData, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::warn;

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction,
};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

type TdsClient = Client<Compat<TcpStream>>;

/// Owned parameter wrapper for native tiberius parameter binding.
///
/// Parameters are sent as typed protocol-level parameters and never
/// interpolated into SQL text.
struct SqlParam(Value);

impl tiberius::ToSql for SqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match &self.0 {
            Value::Null => ColumnData::String(None),
            Value::Bool(b) => ColumnData::Bit(Some(*b)),
            Value::Int16(n) => ColumnData::I16(Some(*n)),
            Value::Int32(n) => ColumnData::I32(Some(*n)),
            Value::Int64(n) => ColumnData::I64(Some(*n)),
            Value::Float32(n) => ColumnData::F32(Some(*n)),
            Value::Float64(n) => ColumnData::F64(Some(*n)),
            Value::String(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
        }
    }
}

/// Build a slice of tiberius parameter references from owned SqlParams.
///
/// Caller must keep `tib_params` alive for the duration of the call since
/// the references borrow from them.
#[inline]
fn param_refs(tib_params: &[SqlParam]) -> Vec<&dyn tiberius::ToSql> {
    tib_params
        .iter()
        .map(|p| p as &dyn tiberius::ToSql)
        .collect()
}

/// Convert tiberius column value to Value
fn tiberius_to_value(row: &tiberius::Row, idx: usize) -> Value {
    // try typed columns in order: bool, numeric, then string
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return Value::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
        return Value::Int16(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return Value::Int32(v);
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return Value::Int64(v);
    }
    if let Ok(Some(v)) = row.try_get::<f32, _>(idx) {
        return Value::Float32(v);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return Value::Float64(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return Value::String(v.to_string());
    }

    Value::Null
}

/// Convert tiberius Row to Row
fn tiberius_row_to_row(tib_row: &tiberius::Row) -> Row {
    let mut row = Row::with_capacity(tib_row.len());
    for (idx, column) in tib_row.columns().iter().enumerate() {
        row.push(column.name(), tiberius_to_value(tib_row, idx));
    }
    row
}

fn execution_error(context: &str, e: tiberius::error::Error, sql: &str) -> Error {
    Error::Query {
        message: format!("{}: {}", context, e),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

/// State shared by a connection and its transactions
struct TdsShared {
    client: Mutex<TdsClient>,
    /// Set when a transaction was dropped while still open
    pending_rollback: AtomicBool,
}

impl TdsShared {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let tib_params: Vec<SqlParam> = params.iter().cloned().map(SqlParam).collect();
        let refs = param_refs(&tib_params);
        let mut client = self.client.lock().await;

        let result = client
            .execute(sql, &refs)
            .await
            .map_err(|e| execution_error("Execute failed", e, sql))?;

        Ok(result.total())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let tib_params: Vec<SqlParam> = params.iter().cloned().map(SqlParam).collect();
        let refs = param_refs(&tib_params);
        let mut client = self.client.lock().await;

        let stream = client
            .query(sql, &refs)
            .await
            .map_err(|e| execution_error("Query failed", e, sql))?;

        let tib_rows = stream
            .into_first_result()
            .await
            .map_err(|e| execution_error("Failed to fetch rows", e, sql))?;

        Ok(tib_rows.iter().map(tiberius_row_to_row).collect())
    }

    /// Run a transaction control statement as a plain batch; wrapping it in
    /// sp_executesql would trip the transaction count check.
    async fn control(&self, sql: &str) -> Result<()> {
        let mut client = self.client.lock().await;
        let stream = client
            .simple_query(sql)
            .await
            .map_err(|e| Error::transaction_with_source(format!("{} failed", sql), e))?;
        stream
            .into_results()
            .await
            .map_err(|e| Error::transaction_with_source(format!("{} failed", sql), e))?;
        Ok(())
    }

    async fn finish_abandoned(&self) -> Result<()> {
        if self.pending_rollback.swap(false, Ordering::AcqRel) {
            warn!("rolling back abandoned SQL Server transaction");
            self.control("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
        }
        Ok(())
    }
}

/// SQL Server connection
pub struct SqlServerConnection {
    shared: Arc<TdsShared>,
    closed: AtomicBool,
}

impl SqlServerConnection {
    /// Open a connection from an ADO.NET connection string
    /// (`Server=host,port;Database=…;User Id=…;Password=…`)
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tib_config = Config::from_ado_string(&config.connection_string())
            .map_err(|e| Error::config(format!("Invalid SQL Server connection string: {}", e)))?;

        let tcp = TcpStream::connect(tib_config.get_addr())
            .await
            .map_err(|e| Error::connection_with_source("Failed to connect to SQL Server", e))?;

        tcp.set_nodelay(true).ok();

        let client = Client::connect(tib_config, tcp.compat_write())
            .await
            .map_err(|e| Error::connection_with_source("Failed to authenticate", e))?;

        Ok(Self {
            shared: Arc::new(TdsShared {
                client: Mutex::new(client),
                pending_rollback: AtomicBool::new(false),
            }),
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
impl Connection for SqlServerConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        self.shared.finish_abandoned().await?;
        self.shared.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        self.shared.finish_abandoned().await?;
        self.shared.execute(sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        self.shared.finish_abandoned().await?;
        self.shared.control("BEGIN TRANSACTION").await?;

        Ok(Box::new(SqlServerTransaction {
            shared: Arc::clone(&self.shared),
            finished: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        // Connection closes when dropped
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }
}

/// SQL Server transaction
pub struct SqlServerTransaction {
    shared: Arc<TdsShared>,
    finished: AtomicBool,
}

#[async_trait]
impl Transaction for SqlServerTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.shared.execute(sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        self.shared.control("COMMIT TRANSACTION").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        self.shared.control("ROLLBACK TRANSACTION").await
    }
}

impl Drop for SqlServerTransaction {
    fn drop(&mut self) {
        // The owning connection issues the rollback before its next statement.
        if !self.finished.load(Ordering::SeqCst) {
            self.shared.pending_rollback.store(true, Ordering::Release);
        }
    }
}

/// SQL Server connection factory
#[derive(Debug, Clone, Default)]
pub struct SqlServerConnectionFactory;

#[async_trait]
impl ConnectionFactory for SqlServerConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let conn = SqlServerConnection::connect(config).await?;
        Ok(Box::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }
}
