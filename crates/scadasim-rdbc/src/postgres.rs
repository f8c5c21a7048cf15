//! PostgreSQL backend implementation for scadasim-rdbc
//!
//! Provides PostgreSQL-specific implementations:
//! - Npgsql-style descriptor keys mapped onto a tokio-postgres config
//! - Connection with a per-connection prepared statement cache
//! - Parameter coercion to the prepared statement's declared types
//! - Transactions with deferred rollback on drop

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, error, warn};

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction,
};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

type PgParam = Box<dyn ToSql + Sync + Send>;

/// Convert a Value to a parameter of the type the server declared for it
///
/// tokio-postgres refuses to bind e.g. an `f64` to a `REAL` parameter, so
/// numeric values are narrowed or widened to match. `NUMERIC` parameters
/// are bound as [`Decimal`]. Unknown target types fall back to the value's
/// own type and let the server decide.
fn value_to_sql(value: &Value, target: &Type) -> Result<PgParam> {
    let mismatch = || {
        Error::type_conversion(format!(
            "cannot bind {} value to parameter of type {}",
            value.sql_type(),
            target
        ))
    };

    if value.is_null() {
        return Ok(match *target {
            Type::BOOL => Box::new(Option::<bool>::None),
            Type::INT2 => Box::new(Option::<i16>::None),
            Type::INT4 => Box::new(Option::<i32>::None),
            Type::INT8 => Box::new(Option::<i64>::None),
            Type::FLOAT4 => Box::new(Option::<f32>::None),
            Type::FLOAT8 => Box::new(Option::<f64>::None),
            Type::NUMERIC => Box::new(Option::<Decimal>::None),
            _ => Box::new(Option::<String>::None),
        });
    }

    Ok(match *target {
        Type::BOOL => Box::new(value.as_bool().ok_or_else(mismatch)?),
        Type::INT2 => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            Box::new(i16::try_from(n).map_err(|_| mismatch())?)
        }
        Type::INT4 => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            Box::new(i32::try_from(n).map_err(|_| mismatch())?)
        }
        Type::INT8 => Box::new(value.as_i64().ok_or_else(mismatch)?),
        Type::FLOAT4 => Box::new(value.as_f64().ok_or_else(mismatch)? as f32),
        Type::FLOAT8 => Box::new(value.as_f64().ok_or_else(mismatch)?),
        Type::NUMERIC => {
            let decimal = match value {
                Value::Float32(n) => Decimal::from_f32(*n),
                Value::Float64(n) => Decimal::from_f64(*n),
                Value::String(s) => s.trim().parse().ok(),
                other => other.as_i64().map(Decimal::from),
            };
            Box::new(decimal.ok_or_else(mismatch)?)
        }
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Box::new(match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Float32(n) => n.to_string(),
            Value::Float64(n) => n.to_string(),
            Value::Null => return Err(mismatch()),
        }),
        _ => native_param(value),
    })
}

/// Bind a value with its own type
fn native_param(value: &Value) -> PgParam {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::String(s) => Box::new(s.clone()),
    }
}

fn coerce_params(params: &[Value], types: &[Type]) -> Result<Vec<PgParam>> {
    if params.len() != types.len() {
        return Err(Error::query(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .map(|(value, ty)| value_to_sql(value, ty))
        .collect()
}

/// Convert a tokio-postgres row to a Row
fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let mut row = Row::with_capacity(pg_row.len());
    for (idx, column) in pg_row.columns().iter().enumerate() {
        row.push(column.name(), pg_value_to_value(pg_row, idx, column.type_()));
    }
    row
}

/// Convert a PostgreSQL value to a Value
fn pg_value_to_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> Value {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        idx: usize,
    ) -> Option<T> {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    match *pg_type {
        Type::BOOL => get::<bool>(row, idx).into(),
        Type::INT2 => get::<i16>(row, idx).into(),
        Type::INT4 => get::<i32>(row, idx).into(),
        Type::INT8 => get::<i64>(row, idx).into(),
        Type::FLOAT4 => get::<f32>(row, idx).into(),
        Type::FLOAT8 => get::<f64>(row, idx).into(),
        Type::NUMERIC => get::<Decimal>(row, idx).and_then(|d| d.to_f64()).into(),
        // Try to get as string for everything else
        _ => get::<String>(row, idx).into(),
    }
}

fn query_error(e: tokio_postgres::Error, sql: &str) -> Error {
    Error::Query {
        message: e.to_string(),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

/// State shared by a connection and its transactions
struct PgShared {
    client: tokio_postgres::Client,
    statements: Mutex<HashMap<String, tokio_postgres::Statement>>,
    /// Set when a transaction was dropped while still open
    pending_rollback: AtomicBool,
}

impl PgShared {
    async fn prepare(&self, sql: &str) -> Result<tokio_postgres::Statement> {
        let mut cache = self.statements.lock().await;
        if let Some(stmt) = cache.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| query_error(e, sql))?;
        cache.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let stmt = self.prepare(sql).await?;
        let boxed = coerce_params(params, stmt.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let pg_rows = self
            .client
            .query(&stmt, &refs)
            .await
            .map_err(|e| query_error(e, sql))?;

        Ok(pg_rows.iter().map(pg_row_to_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = self.prepare(sql).await?;
        let boxed = coerce_params(params, stmt.params())?;
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .map_err(|e| query_error(e, sql))
    }

    async fn control(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| Error::transaction_with_source(format!("{} failed", sql), e))
    }

    async fn finish_abandoned(&self) -> Result<()> {
        if self.pending_rollback.swap(false, Ordering::AcqRel) {
            warn!("rolling back abandoned PostgreSQL transaction");
            self.control("ROLLBACK").await?;
        }
        Ok(())
    }
}

/// PostgreSQL connection implementation
pub struct PgConnection {
    shared: Arc<PgShared>,
    closed: AtomicBool,
}

impl PgConnection {
    /// Create a new connection from a tokio-postgres client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            shared: Arc::new(PgShared {
                client,
                statements: Mutex::new(HashMap::new()),
                pending_rollback: AtomicBool::new(false),
            }),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) || self.shared.client.is_closed() {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for PgConnection {
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
        self.shared.control("BEGIN").await?;

        Ok(Box::new(PgTransaction {
            shared: Arc::clone(&self.shared),
            finished: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

/// PostgreSQL transaction
pub struct PgTransaction {
    shared: Arc<PgShared>,
    finished: AtomicBool,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.shared.execute(sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::Relaxed);
        self.shared.control("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::Relaxed);
        self.shared.control("ROLLBACK").await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // Can't await here; the owning connection rolls back before its next use.
        if !self.finished.load(Ordering::Relaxed) {
            self.shared.pending_rollback.store(true, Ordering::Release);
        }
    }
}

/// Map Npgsql-style descriptor keys onto a tokio-postgres config
pub fn pg_config(config: &ConnectionConfig) -> Result<tokio_postgres::Config> {
    let mut pg = tokio_postgres::Config::new();

    for (key, value) in &config.properties {
        match key.to_ascii_lowercase().as_str() {
            "host" | "server" => {
                pg.host(value.as_str());
            }
            "port" => {
                let port = value.parse::<u16>().map_err(|_| {
                    Error::config(format!("invalid PostgreSQL port '{}'", value))
                })?;
                pg.port(port);
            }
            "database" => {
                pg.dbname(value.as_str());
            }
            "username" | "user id" | "userid" | "user" => {
                pg.user(value.as_str());
            }
            "password" => {
                pg.password(value.as_str());
            }
            "application name" => {
                pg.application_name(value.as_str());
            }
            "timeout" => {
                let secs = value.parse::<u64>().map_err(|_| {
                    Error::config(format!("invalid PostgreSQL timeout '{}'", value))
                })?;
                pg.connect_timeout(Duration::from_secs(secs));
            }
            other => debug!(key = other, "ignoring unsupported PostgreSQL connection key"),
        }
    }

    if pg.get_hosts().is_empty() {
        pg.host("localhost");
    }

    Ok(pg)
}

/// PostgreSQL connection factory
#[derive(Debug, Clone, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let pg = pg_config(config)?;
        let (client, connection) = pg
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| Error::connection_with_source("failed to connect to PostgreSQL", e))?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PgConnection::new(client)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(descriptor: &str) -> ConnectionConfig {
        ConnectionConfig::parse(descriptor).unwrap()
    }

    #[test]
    fn test_pg_config_npgsql_keys() {
        let pg = pg_config(&config(
            "Provider=PostgreSQL;Host=db.local;Port=5433;Database=scada;\
             Username=logger;Password=secret;Application Name=scadasim",
        ))
        .unwrap();

        assert_eq!(pg.get_ports(), &[5433]);
        assert_eq!(pg.get_dbname(), Some("scada"));
        assert_eq!(pg.get_user(), Some("logger"));
        assert_eq!(pg.get_password(), Some(&b"secret"[..]));
        assert_eq!(pg.get_application_name(), Some("scadasim"));
        assert_eq!(pg.get_hosts().len(), 1);
    }

    #[test]
    fn test_pg_config_aliases_and_defaults() {
        let pg = pg_config(&config("Provider=PostgreSQL;Server=db;User Id=u")).unwrap();
        assert_eq!(pg.get_user(), Some("u"));
        assert_eq!(pg.get_hosts().len(), 1);

        let pg = pg_config(&config("Provider=PostgreSQL;Database=x")).unwrap();
        assert_eq!(pg.get_hosts().len(), 1);
    }

    #[test]
    fn test_pg_config_invalid_port() {
        let err = pg_config(&config("Provider=PostgreSQL;Port=abc")).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Configuration);
    }

    #[test]
    fn test_value_coercion_accepts_declared_types() {
        assert!(value_to_sql(&Value::Float64(42.5), &Type::FLOAT4).is_ok());
        assert!(value_to_sql(&Value::Int16(192), &Type::INT4).is_ok());
        assert!(value_to_sql(&Value::Int32(1), &Type::INT2).is_ok());
        assert!(value_to_sql(&Value::Int64(638_000_000_000_000_000), &Type::INT8).is_ok());
        assert!(value_to_sql(&Value::Int16(0), &Type::BOOL).is_ok());
        assert!(value_to_sql(&Value::from("ANA"), &Type::TEXT).is_ok());
        assert!(value_to_sql(&Value::Null, &Type::FLOAT8).is_ok());
    }

    #[test]
    fn test_numeric_parameters_bind_as_decimal() {
        for value in [
            Value::Float64(57.25),
            Value::Float32(40.5),
            Value::Int16(192),
            Value::Int64(i64::MAX),
            Value::from("12.125"),
            Value::Null,
        ] {
            assert!(value_to_sql(&value, &Type::NUMERIC).is_ok(), "{:?}", value);
        }

        // a float parameter would accept NaN, a decimal cannot hold it
        assert!(value_to_sql(&Value::Float64(f64::NAN), &Type::FLOAT8).is_ok());
        let err = value_to_sql(&Value::Float64(f64::NAN), &Type::NUMERIC).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::TypeConversion);
        assert!(value_to_sql(&Value::from("abc"), &Type::NUMERIC).is_err());
    }

    #[test]
    fn test_value_coercion_rejects_overflow() {
        let err = value_to_sql(&Value::Int64(i64::MAX), &Type::INT2).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::TypeConversion);

        assert!(value_to_sql(&Value::from("abc"), &Type::INT4).is_err());
    }

    #[test]
    fn test_param_count_mismatch() {
        let err = coerce_params(&[Value::Int32(1)], &[]).err().unwrap();
        assert_eq!(err.category(), crate::ErrorCategory::Query);
    }
}
