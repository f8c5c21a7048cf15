//! Connection traits for scadasim-rdbc
//!
//! Core abstractions for database connectivity:
//! - Connection: statement execution on a single, run-long connection
//! - Transaction: one ACID unit of work (one insert batch)
//! - ConnectionConfig: a parsed `Provider=...;key=value` descriptor
//! - ConnectionFactory: opens a backend connection from a descriptor

use async_trait::async_trait;
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Begin a transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// The backend this connection talks to
    fn database_type(&self) -> DatabaseType;
}

/// A database transaction
///
/// Dropping a transaction that was neither committed nor rolled back issues
/// a best-effort rollback.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement inside the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Database type identifier, selected by the `Provider=` token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// SQLite
    SQLite,
    /// SQL Server
    SqlServer,
    /// PostgreSQL
    PostgreSQL,
}

impl DatabaseType {
    /// All supported providers
    pub const ALL: [DatabaseType; 3] = [Self::SQLite, Self::SqlServer, Self::PostgreSQL];

    /// Provider tag as written in a connection descriptor
    pub const fn provider_name(self) -> &'static str {
        match self {
            Self::SQLite => "SQLite",
            Self::SqlServer => "SqlServer",
            Self::PostgreSQL => "PostgreSQL",
        }
    }

    /// Resolve a provider tag (ASCII case-insensitive)
    pub fn from_provider(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.provider_name().eq_ignore_ascii_case(name))
    }

    /// Whether support for this backend was compiled in
    pub const fn is_enabled(self) -> bool {
        match self {
            Self::SQLite => cfg!(feature = "sqlite"),
            Self::SqlServer => cfg!(feature = "sqlserver"),
            Self::PostgreSQL => cfg!(feature = "postgres"),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SQLite => write!(f, "SQLite"),
            Self::SqlServer => write!(f, "SQL Server"),
            Self::PostgreSQL => write!(f, "PostgreSQL"),
        }
    }
}

const PROVIDER_KEY: &str = "Provider";
const SECRET_KEYS: [&str; 2] = ["password", "pwd"];

/// Parsed connection descriptor
///
/// The descriptor is a `;`-separated list of `key=value` pairs holding a
/// `Provider=<SQLite|SqlServer|PostgreSQL>` token plus backend-native
/// parameters. The provider token is stripped; the remaining pairs are kept
/// in their original order for the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Selected backend
    pub provider: DatabaseType,
    /// Backend-native parameters, provider token removed
    pub properties: Vec<(String, String)>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never leak passwords to logs.
        let redacted: Vec<(&str, &str)> = self
            .properties
            .iter()
            .map(|(k, v)| {
                if SECRET_KEYS.iter().any(|s| k.eq_ignore_ascii_case(s)) {
                    (k.as_str(), "***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();

        f.debug_struct("ConnectionConfig")
            .field("provider", &self.provider)
            .field("properties", &redacted)
            .finish()
    }
}

impl ConnectionConfig {
    /// Parse a full descriptor, e.g. `Provider=SQLite;Data Source=scada.db`
    ///
    /// Fails with a configuration error when the provider token is missing,
    /// names an unknown provider, or names a provider that was not compiled
    /// in. No connection is attempted here.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut provider = None;
        let mut properties = Vec::new();

        for part in descriptor.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::config(format!("malformed connection string segment '{}'", part))
            })?;
            let (key, value) = (key.trim(), value.trim());

            if key.eq_ignore_ascii_case(PROVIDER_KEY) {
                let db_type = DatabaseType::from_provider(value).ok_or_else(|| {
                    Error::config(format!(
                        "provider '{}' is not supported (expected SQLite, SqlServer or PostgreSQL)",
                        value
                    ))
                })?;
                provider = Some(db_type);
            } else {
                properties.push((key.to_string(), value.to_string()));
            }
        }

        let provider = provider.ok_or_else(|| {
            Error::config("connection string must contain Provider=SQLite|SqlServer|PostgreSQL")
        })?;

        if !provider.is_enabled() {
            return Err(Error::config(format!(
                "provider '{}' was not compiled into this build",
                provider.provider_name()
            )));
        }

        Ok(Self {
            provider,
            properties,
        })
    }

    /// Look up a parameter (ASCII case-insensitive key)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Look up the first parameter present among several key aliases
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// The descriptor with the provider token stripped
    pub fn connection_string(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Get the database type
    fn database_type(&self) -> DatabaseType;
}
