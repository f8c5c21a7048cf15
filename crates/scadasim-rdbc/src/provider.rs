//! Provider resolution for scadasim-rdbc
//!
//! Turns a `Provider=...;key=value` descriptor into an open
//! [`TableAdapter`]. The provider is resolved once; nothing downstream
//! branches on the backend again.

use tracing::info;

use crate::adapter::{SqlTableAdapter, TableAdapter};
use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType};
use crate::error::{Error, Result};

/// Get the connection factory for a backend
pub fn factory_for(db_type: DatabaseType) -> Result<Box<dyn ConnectionFactory>> {
    match db_type {
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => Ok(Box::new(crate::sqlite::SqliteConnectionFactory)),
        #[cfg(feature = "postgres")]
        DatabaseType::PostgreSQL => Ok(Box::new(crate::postgres::PgConnectionFactory)),
        #[cfg(feature = "sqlserver")]
        DatabaseType::SqlServer => Ok(Box::new(crate::sqlserver::SqlServerConnectionFactory)),
        #[allow(unreachable_patterns)]
        other => Err(Error::config(format!(
            "provider '{}' was not compiled into this build",
            other.provider_name()
        ))),
    }
}

/// Open a connection for a parsed descriptor
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    let factory = factory_for(config.provider)?;
    let conn = factory.connect(config).await?;
    info!(provider = %config.provider, "database connection established");
    Ok(conn)
}

/// Parse a descriptor and open a table adapter for it
///
/// Descriptor problems are reported as configuration errors before any
/// connection is attempted.
pub async fn open_adapter(descriptor: &str) -> Result<Box<dyn TableAdapter>> {
    let config = ConnectionConfig::parse(descriptor)?;
    open_adapter_with_config(&config).await
}

/// Open a table adapter for an already parsed descriptor
pub async fn open_adapter_with_config(config: &ConnectionConfig) -> Result<Box<dyn TableAdapter>> {
    let conn = connect(config).await?;
    Ok(Box::new(SqlTableAdapter::for_connection(conn)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_factory_for_enabled_backends() {
        for db_type in DatabaseType::ALL {
            if db_type.is_enabled() {
                let factory = factory_for(db_type).unwrap();
                assert_eq!(factory.database_type(), db_type);
            } else {
                assert!(factory_for(db_type).is_err());
            }
        }
    }

    #[tokio::test]
    async fn test_unsupported_provider_fails_before_connecting() {
        let err = open_adapter("Provider=Oracle;Data Source=//db:1521/XE")
            .await
            .err()
            .unwrap();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_sqlite_adapter() {
        let adapter = open_adapter("Provider=sqlite;Data Source=:memory:")
            .await
            .unwrap();
        assert_eq!(adapter.database_type(), DatabaseType::SQLite);
        assert_eq!(adapter.quote_identifier("ANA"), "\"ANA\"");
    }
}
