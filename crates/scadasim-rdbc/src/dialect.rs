//! SQL dialect abstraction for scadasim-rdbc
//!
//! Everything that differs between the supported backends when reading,
//! cleaning and filling a data-logger table:
//!
//! - Identifier quoting (`"…"` vs `[…]`)
//! - Parameter placeholders (`?N`, `$N`, `@PN`)
//! - Catalog queries for column discovery, and the table spellings to try
//! - Cleanup idioms (delete + identity reset, or truncate)
//! - Parameterized INSERT generation

use crate::connection::DatabaseType;
use crate::security::escape_string_literal;
use crate::types::{ColumnMetadata, Row, Value};

/// A catalog query that lists a table's columns in ordinal order
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnQuery {
    /// SQL text
    pub sql: String,
    /// Bound parameters (the table name where the backend allows binding)
    pub params: Vec<Value>,
}

/// One statement of a table cleanup sequence
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupStep {
    /// SQL text
    pub sql: String,
    /// Bound parameters
    pub params: Vec<Value>,
    /// Failure of this step is logged and ignored
    pub best_effort: bool,
}

impl CleanupStep {
    /// A step whose failure aborts the cleanup
    pub fn required(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            best_effort: false,
        }
    }

    /// A step whose failure is tolerated
    pub fn best_effort(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            best_effort: true,
        }
    }
}

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the placeholder for a 1-based parameter index (e.g. `?1`, `$1`, `@P1`)
    fn placeholder(&self, index: usize) -> String;

    /// Table spellings to try, in order, when discovering columns
    fn table_candidates(&self, table: &str) -> Vec<String> {
        vec![table.to_string()]
    }

    /// Catalog query listing the columns of `table`
    fn list_columns_query(&self, table: &str) -> ColumnQuery;

    /// Read one row of [`list_columns_query`](Self::list_columns_query)
    /// output; `position` is the 0-based row index
    fn parse_column(&self, row: &Row, position: usize) -> Option<ColumnMetadata> {
        let name = row.get_by_name("column_name")?.as_str()?.to_string();
        let type_name = row
            .get_by_name("data_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let nullable = row
            .get_by_name("nullable")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut column = ColumnMetadata::new(name, type_name).with_ordinal(position as u32 + 1);
        column.nullable = nullable;
        Some(column)
    }

    /// Statements that empty `table` and reset its identity counter
    fn cleanup_steps(&self, table: &str) -> Vec<CleanupStep>;

    /// Parameterized INSERT of `columns` into `table`
    fn insert_sql(&self, table: &str, columns: &[&str]) -> String {
        let column_list = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            column_list,
            placeholders
        )
    }
}

// ===========================================================================
// SQLite
// ===========================================================================

/// SQLite dialect
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    // PRAGMA arguments cannot be bound; the quoted identifier is used instead.
    fn list_columns_query(&self, table: &str) -> ColumnQuery {
        ColumnQuery {
            sql: format!("PRAGMA table_info({})", self.quote_identifier(table)),
            params: Vec::new(),
        }
    }

    fn parse_column(&self, row: &Row, position: usize) -> Option<ColumnMetadata> {
        let name = row.get_by_name("name")?.as_str()?.to_string();
        let type_name = row
            .get_by_name("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let not_null = row
            .get_by_name("notnull")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let ordinal = row
            .get_by_name("cid")
            .and_then(Value::as_i64)
            .map_or(position as u32 + 1, |cid| cid as u32 + 1);

        let mut column = ColumnMetadata::new(name, type_name).with_ordinal(ordinal);
        column.nullable = !not_null;
        Some(column)
    }

    fn cleanup_steps(&self, table: &str) -> Vec<CleanupStep> {
        vec![
            CleanupStep::required(format!("DELETE FROM {}", self.quote_identifier(table))),
            // sqlite_sequence only exists once an AUTOINCREMENT table was created
            CleanupStep::best_effort(
                "DELETE FROM sqlite_sequence WHERE name = ?1 COLLATE NOCASE",
                vec![Value::from(table)],
            ),
        ]
    }
}

// ===========================================================================
// PostgreSQL
// ===========================================================================

/// PostgreSQL dialect
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    /// Unquoted identifiers fold to lower case, so the folded spelling is
    /// tried first and the original spelling second.
    fn table_candidates(&self, table: &str) -> Vec<String> {
        let lower = table.to_lowercase();
        if lower == table {
            vec![lower]
        } else {
            vec![lower, table.to_string()]
        }
    }

    fn list_columns_query(&self, table: &str) -> ColumnQuery {
        ColumnQuery {
            sql: "SELECT column_name::text AS column_name, \
                         data_type::text AS data_type, \
                         (is_nullable = 'YES') AS nullable \
                  FROM information_schema.columns \
                  WHERE table_name = $1 AND table_schema = current_schema() \
                  ORDER BY ordinal_position"
                .to_string(),
            params: vec![Value::from(table)],
        }
    }

    fn cleanup_steps(&self, table: &str) -> Vec<CleanupStep> {
        vec![CleanupStep::required(format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            self.quote_identifier(table)
        ))]
    }
}

// ===========================================================================
// SQL Server
// ===========================================================================

/// SQL Server dialect
#[derive(Debug, Clone, Default)]
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn list_columns_query(&self, table: &str) -> ColumnQuery {
        ColumnQuery {
            sql: "SELECT COLUMN_NAME AS column_name, \
                         DATA_TYPE AS data_type, \
                         CAST(CASE IS_NULLABLE WHEN 'YES' THEN 1 ELSE 0 END AS BIT) AS nullable \
                  FROM INFORMATION_SCHEMA.COLUMNS \
                  WHERE TABLE_NAME = @P1 \
                  ORDER BY ORDINAL_POSITION"
                .to_string(),
            params: vec![Value::from(table)],
        }
    }

    fn cleanup_steps(&self, table: &str) -> Vec<CleanupStep> {
        vec![
            CleanupStep::required(format!("DELETE FROM {}", self.quote_identifier(table))),
            // Fails on tables without an identity column.
            CleanupStep::best_effort(
                format!(
                    "DBCC CHECKIDENT('{}', RESEED, 0)",
                    escape_string_literal(&self.quote_identifier(table))
                ),
                Vec::new(),
            ),
        ]
    }
}

/// Get the dialect for a database type
pub fn dialect_for(db_type: DatabaseType) -> Box<dyn SqlDialect> {
    match db_type {
        DatabaseType::SQLite => Box::new(SqliteDialect),
        DatabaseType::PostgreSQL => Box::new(PostgresDialect),
        DatabaseType::SqlServer => Box::new(SqlServerDialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_dialect() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.quote_identifier("ANA"), "\"ANA\"");
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(dialect.placeholder(3), "?3");
    }

    #[test]
    fn test_postgres_dialect() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.placeholder(1), "$1");
    }

    #[test]
    fn test_sqlserver_dialect() {
        let dialect = SqlServerDialect;
        assert_eq!(dialect.quote_identifier("users"), "[users]");
        assert_eq!(dialect.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(dialect.placeholder(1), "@P1");
    }

    #[test]
    fn test_insert_sql() {
        let sql = SqliteDialect.insert_sql("ANA", &["UTCTimestamp_Ticks", "A", "_A_Q"]);
        assert_eq!(
            sql,
            "INSERT INTO \"ANA\" (\"UTCTimestamp_Ticks\", \"A\", \"_A_Q\") VALUES (?1, ?2, ?3)"
        );

        let sql = SqlServerDialect.insert_sql("ANA", &["A", "_A_Q"]);
        assert_eq!(sql, "INSERT INTO [ANA] ([A], [_A_Q]) VALUES (@P1, @P2)");

        let sql = PostgresDialect.insert_sql("ana", &["A"]);
        assert_eq!(sql, "INSERT INTO \"ana\" (\"A\") VALUES ($1)");
    }

    #[test]
    fn test_table_candidates() {
        assert_eq!(
            PostgresDialect.table_candidates("Ana"),
            vec!["ana".to_string(), "Ana".to_string()]
        );
        assert_eq!(PostgresDialect.table_candidates("ana"), vec!["ana".to_string()]);

        // Case fallback is PostgreSQL-only
        assert_eq!(SqliteDialect.table_candidates("Ana"), vec!["Ana".to_string()]);
        assert_eq!(SqlServerDialect.table_candidates("Ana"), vec!["Ana".to_string()]);
    }

    #[test]
    fn test_catalog_queries_bind_table_name() {
        let query = PostgresDialect.list_columns_query("x'; DROP TABLE y--");
        assert!(!query.sql.contains("DROP"));
        assert_eq!(query.params, vec![Value::from("x'; DROP TABLE y--")]);
        // a same-named table in another schema must not add its columns
        assert!(query.sql.contains("table_schema = current_schema()"));

        let query = SqlServerDialect.list_columns_query("ANA");
        assert!(query.sql.contains("@P1"));
        assert_eq!(query.params.len(), 1);

        let query = SqliteDialect.list_columns_query("a\"b");
        assert_eq!(query.sql, "PRAGMA table_info(\"a\"\"b\")");
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_cleanup_steps() {
        let steps = SqliteDialect.cleanup_steps("ANA");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].sql, "DELETE FROM \"ANA\"");
        assert!(!steps[0].best_effort);
        assert!(steps[1].best_effort);
        assert_eq!(steps[1].params, vec![Value::from("ANA")]);

        let steps = PostgresDialect.cleanup_steps("ana");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sql, "TRUNCATE TABLE \"ana\" RESTART IDENTITY CASCADE");

        let steps = SqlServerDialect.cleanup_steps("it's");
        assert_eq!(steps[0].sql, "DELETE FROM [it's]");
        assert_eq!(steps[1].sql, "DBCC CHECKIDENT('[it''s]', RESEED, 0)");
        assert!(steps[1].best_effort);
    }

    #[test]
    fn test_parse_sqlite_pragma_row() {
        let mut row = Row::with_capacity(6);
        row.push("cid", 2_i64);
        row.push("name", "Pressure");
        row.push("type", "REAL");
        row.push("notnull", 1_i64);
        row.push("dflt_value", Value::Null);
        row.push("pk", 0_i64);

        let column = SqliteDialect.parse_column(&row, 0).unwrap();
        assert_eq!(column.name, "Pressure");
        assert_eq!(column.type_name, "REAL");
        assert_eq!(column.ordinal, 3);
        assert!(!column.nullable);
    }

    #[test]
    fn test_parse_information_schema_row() {
        let mut row = Row::with_capacity(3);
        row.push("column_name", "_A_Q");
        row.push("data_type", "smallint");
        row.push("nullable", true);

        let column = PostgresDialect.parse_column(&row, 4).unwrap();
        assert_eq!(column.name, "_A_Q");
        assert_eq!(column.ordinal, 5);
        assert!(column.nullable);

        let empty = Row::default();
        assert!(SqlServerDialect.parse_column(&empty, 0).is_none());
    }

    #[test]
    fn test_dialect_for() {
        assert_eq!(dialect_for(DatabaseType::PostgreSQL).name(), "PostgreSQL");
        assert_eq!(dialect_for(DatabaseType::SQLite).name(), "SQLite");
        assert_eq!(dialect_for(DatabaseType::SqlServer).name(), "SQL Server");
    }
}
