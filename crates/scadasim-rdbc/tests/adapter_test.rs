//! Integration tests for scadasim-rdbc table adapter against SQLite

use scadasim_rdbc::prelude::*;
use scadasim_rdbc::sqlite::SqliteConnection;

const ANA_DDL: &str = "CREATE TABLE ANA (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    UTCTimestamp_Ticks BIGINT NOT NULL,
    LogType SMALLINT NOT NULL,
    NotSync SMALLINT NOT NULL,
    A REAL,
    _A_Q SMALLINT
)";

async fn adapter_with(ddl: &str) -> SqlTableAdapter {
    let conn = SqliteConnection::open_path(":memory:").unwrap();
    conn.execute(ddl, &[]).await.unwrap();
    SqlTableAdapter::for_connection(Box::new(conn))
}

fn ana_row(ticks: i64, a: f64, q: i16) -> Row {
    let mut row = Row::with_capacity(5);
    row.push("UTCTimestamp_Ticks", ticks);
    row.push("LogType", 1_i16);
    row.push("NotSync", 0_i16);
    row.push("A", a);
    row.push("_A_Q", q);
    row
}

async fn count(adapter: &SqlTableAdapter, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}", adapter.quote_identifier(table));
    let rows = adapter.connection().query(&sql, &[]).await.unwrap();
    rows[0].get(0).and_then(Value::as_i64).unwrap()
}

#[tokio::test]
async fn test_discover_columns_in_ordinal_order() {
    let adapter = adapter_with(ANA_DDL).await;

    let table = adapter.discover_columns("ANA").await.unwrap();

    assert_eq!(table.name, "ANA");
    assert_eq!(
        table.column_names(),
        vec!["ID", "UTCTimestamp_Ticks", "LogType", "NotSync", "A", "_A_Q"]
    );
    assert_eq!(table.column("a").map(|c| c.type_name.as_str()), Some("REAL"));
    assert_eq!(table.columns[0].ordinal, 1);
}

#[tokio::test]
async fn test_discover_missing_table() {
    let adapter = adapter_with(ANA_DDL).await;

    let err = adapter.discover_columns("DoesNotExist").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Schema);
}

#[tokio::test]
async fn test_discover_rejects_empty_name() {
    let adapter = adapter_with(ANA_DDL).await;

    let err = adapter.discover_columns("").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

#[tokio::test]
async fn test_insert_batch_commits_rows() {
    let adapter = adapter_with(ANA_DDL).await;
    let rows: Vec<Row> = (0..5).map(|i| ana_row(1_000 + i, 50.0 + i as f64, 192)).collect();

    let written = adapter.insert_batch("ANA", &rows).await.unwrap();

    assert_eq!(written, 5);
    assert_eq!(count(&adapter, "ANA").await, 5);

    let stats = adapter.stats();
    assert_eq!(stats.rows_written, 5);
    assert_eq!(stats.batches_written, 1);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let adapter = adapter_with(ANA_DDL).await;

    assert_eq!(adapter.insert_batch("ANA", &[]).await.unwrap(), 0);
    assert_eq!(adapter.stats().batches_written, 0);
}

#[tokio::test]
async fn test_inconsistent_batch_runs_no_statement() {
    let adapter = adapter_with(ANA_DDL).await;

    let mut odd = Row::with_capacity(2);
    odd.push("UTCTimestamp_Ticks", 2_000_i64);
    odd.push("A", 1.0_f64);
    let rows = vec![ana_row(1_000, 50.0, 192), odd];

    let err = adapter.insert_batch("ANA", &rows).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Schema);
    assert_eq!(count(&adapter, "ANA").await, 0);
}

#[tokio::test]
async fn test_failed_row_rolls_back_whole_batch() {
    let adapter = adapter_with(ANA_DDL).await;

    let mut rows: Vec<Row> = (0..3).map(|i| ana_row(1_000 + i, 50.0, 192)).collect();
    // NOT NULL violation on the last row
    let mut bad = Row::with_capacity(5);
    bad.push("UTCTimestamp_Ticks", Value::Null);
    bad.push("LogType", 1_i16);
    bad.push("NotSync", 0_i16);
    bad.push("A", 1.0_f64);
    bad.push("_A_Q", 0_i16);
    rows.push(bad);

    let err = adapter.insert_batch("ANA", &rows).await.unwrap_err();

    assert!(err.category().is_execution());
    assert_eq!(count(&adapter, "ANA").await, 0);
    assert_eq!(adapter.stats().batches_failed, 1);

    // The connection stays usable for the next batch
    let written = adapter
        .insert_batch("ANA", &[ana_row(5_000, 60.0, 0)])
        .await
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(count(&adapter, "ANA").await, 1);
}

#[tokio::test]
async fn test_clean_table_resets_identity() {
    let adapter = adapter_with(ANA_DDL).await;
    adapter
        .insert_batch("ANA", &[ana_row(1, 50.0, 192), ana_row(2, 51.0, 192)])
        .await
        .unwrap();

    adapter.clean_table("ANA").await.unwrap();
    assert_eq!(count(&adapter, "ANA").await, 0);

    adapter.insert_batch("ANA", &[ana_row(3, 52.0, 192)]).await.unwrap();
    let rows = adapter
        .connection()
        .query("SELECT ID FROM ANA", &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Int64(1)));
}

#[tokio::test]
async fn test_clean_table_twice() {
    let adapter = adapter_with(ANA_DDL).await;

    adapter.clean_table("ANA").await.unwrap();
    adapter.clean_table("ANA").await.unwrap();

    assert_eq!(count(&adapter, "ANA").await, 0);
}

#[tokio::test]
async fn test_clean_without_sqlite_sequence() {
    // No AUTOINCREMENT anywhere, so sqlite_sequence never exists
    let adapter = adapter_with("CREATE TABLE plain (UTCTimestamp_Ticks BIGINT, A REAL)").await;

    adapter.clean_table("plain").await.unwrap();
}

#[tokio::test]
async fn test_quoted_identifier_round_trip() {
    let adapter = adapter_with(
        "CREATE TABLE \"odd\"\"table\" (\"we\"\"ird\" INTEGER, \"_we\"\"ird_Q\" SMALLINT)",
    )
    .await;

    let table = adapter.discover_columns("odd\"table").await.unwrap();
    assert_eq!(table.column_names(), vec!["we\"ird", "_we\"ird_Q"]);

    let mut row = Row::with_capacity(2);
    row.push("we\"ird", 7_i32);
    row.push("_we\"ird_Q", 192_i16);
    adapter.insert_batch(&table.name, &[row]).await.unwrap();

    adapter.clean_table(&table.name).await.unwrap();
    assert_eq!(count(&adapter, "odd\"table").await, 0);
}

#[tokio::test]
async fn test_file_database_via_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scada.db");
    let descriptor = format!("Provider=SQLite;Data Source={}", path.display());

    let adapter = open_adapter(&descriptor).await.unwrap();
    assert_eq!(adapter.database_type(), DatabaseType::SQLite);

    let err = adapter.discover_columns("ANA").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Schema);

    adapter.close().await.unwrap();
    assert!(path.exists());
}
