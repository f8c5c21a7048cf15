//! # scadasim-rdbc
//!
//! Relational table access for the scadasim data-logger simulator.
//!
//! This crate provides one interface for reading the shape of a data-logger
//! table, emptying it, and filling it with batches of rows, across three
//! backends with different SQL dialects.
//!
//! ## Features
//!
//! - **Multi-Database Support**: SQLite, SQL Server and PostgreSQL behind one API
//! - **Provider Descriptors**: `Provider=<name>;key=value;...` connection strings
//! - **SQL Dialect Abstraction**: quoting, placeholders, catalog queries, cleanup idioms
//! - **Schema Discovery**: ordered column lists straight from the live catalog
//! - **Transactional Batches**: one transaction per batch, rolled back on any failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scadasim_rdbc::prelude::*;
//!
//! let adapter = open_adapter("Provider=SQLite;Data Source=scada.db").await?;
//!
//! let table = adapter.discover_columns("ANA").await?;
//! adapter.clean_table(&table.name).await?;
//!
//! let mut row = Row::with_capacity(3);
//! row.push("UTCTimestamp_Ticks", 638_000_000_000_000_000_i64);
//! row.push("LogType", 1_i16);
//! row.push("NotSync", 0_i16);
//! adapter.insert_batch(&table.name, &[row]).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` - SQLite support via rusqlite (bundled)
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `sqlserver` - SQL Server support via tiberius

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod provider;
pub mod security;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlserver")]
pub mod sqlserver;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::types::{ColumnMetadata, Row, TableMetadata, Value};

    // Connection traits and config
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, DatabaseType, Transaction,
    };

    // Dialect types
    pub use crate::dialect::{
        dialect_for, CleanupStep, ColumnQuery, PostgresDialect, SqlDialect, SqlServerDialect,
        SqliteDialect,
    };

    // Adapter types
    pub use crate::adapter::{AtomicInsertStats, InsertStats, SqlTableAdapter, TableAdapter};

    // Provider resolution
    pub use crate::provider::{connect, factory_for, open_adapter, open_adapter_with_config};
}

// Re-export commonly used items at crate root
pub use error::{Error, ErrorCategory, Result};
pub use types::Value;
