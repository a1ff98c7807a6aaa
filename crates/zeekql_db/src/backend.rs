//! DuckDB engine backend.
//!
//! In-memory, single-connection, synchronous.
//! - Views are registered with `execute_batch`
//! - Result rows are pulled in fixed-size batches and pushed to a [`BatchSink`]

use std::ops::ControlFlow;
use std::rc::Rc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, debug_span, info};

/// Errors from engine backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Query error: {0}")]
    Query(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extension not available: {0}")]
    ExtensionUnavailable(String),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Value read back from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    List(Vec<DbValue>),
}

/// Row data from a fully materialized query result.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Rc<[String]>,
    values: Vec<DbValue>,
}

impl DbRow {
    fn new(columns: Rc<[String]>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        self.values
            .get(index)
            .ok_or_else(|| {
                BackendError::TypeConversion(format!("Column index {} out of bounds", index))
            })
            .and_then(|v| T::from_db_value(v))
    }

    /// Get a value by column name.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, BackendError> {
        let index =
            self.columns.iter().position(|c| c == name).ok_or_else(|| {
                BackendError::TypeConversion(format!("Column '{}' not found", name))
            })?;
        self.get(index)
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }
}

/// Trait for converting from DbValue.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Null => Err(BackendError::TypeConversion(
                "i64 field is NULL - use Option<i64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected integer".to_string())),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            DbValue::Null => Err(BackendError::TypeConversion(
                "f64 field is NULL - use Option<f64> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected real".to_string())),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(BackendError::TypeConversion(
                "String field is NULL - use Option<String> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected text".to_string())),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v != 0),
            DbValue::Null => Err(BackendError::TypeConversion(
                "bool field is NULL - use Option<bool> for nullable columns".to_string(),
            )),
            _ => Err(BackendError::TypeConversion("Expected boolean".to_string())),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Null => Ok(None),
            _ => T::from_db_value(value).map(Some),
        }
    }
}

/// Column name and engine type name, as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

/// Receiver for a batched query result.
///
/// `columns` is called exactly once, before the first batch, even when the
/// result is empty. Returning `ControlFlow::Break` from `batch` stops the
/// fetch loop early without an error.
pub trait BatchSink {
    fn columns(&mut self, names: &[String]) -> Result<(), BackendError>;

    fn batch(&mut self, rows: &[Vec<DbValue>]) -> Result<ControlFlow<()>, BackendError>;
}

/// Engine connection.
#[derive(Clone)]
pub struct DbConnection {
    conn: Rc<duckdb::Connection>,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"DuckDB")
            .finish()
    }
}

impl DbConnection {
    /// Open an in-memory DuckDB database.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Rc::new(duckdb::Connection::open_in_memory()?);
        debug!("Opened in-memory DuckDB database");
        Ok(Self { conn })
    }

    /// Load a DuckDB extension, installing it first if it is not available locally.
    pub fn load_extension(&self, name: &str) -> Result<(), BackendError> {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BackendError::InvalidInput(format!(
                "Invalid extension name: {}",
                name
            )));
        }

        if self.conn.execute_batch(&format!("LOAD {};", name)).is_ok() {
            info!(extension = name, "Loaded DuckDB extension");
            return Ok(());
        }

        self.conn
            .execute_batch(&format!("INSTALL {name}; LOAD {name};"))
            .map_err(|e| BackendError::ExtensionUnavailable(format!("{}: {}", name, e)))?;
        info!(extension = name, "Installed and loaded DuckDB extension");
        Ok(())
    }

    /// Execute a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        let sql_hash = hash_sql(sql);
        let span = debug_span!(
            "db.exec_batch",
            op = sql_op_name(sql),
            sql_hash = %sql_hash,
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();
        self.conn.execute_batch(sql)?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Query and return all rows.
    pub fn query_all(&self, sql: &str) -> Result<Vec<DbRow>, BackendError> {
        let mut rows = Vec::new();
        let mut collector = RowCollector {
            columns: Rc::from(Vec::<String>::new()),
            rows: &mut rows,
        };
        self.query_batches(sql, DEFAULT_COLLECT_BATCH, &mut collector)?;
        Ok(rows)
    }

    /// Query and return a single scalar value.
    pub fn query_scalar<T: FromDbValue>(&self, sql: &str) -> Result<T, BackendError> {
        let rows = self.query_all(sql)?;
        let row = rows
            .first()
            .ok_or_else(|| BackendError::Query("Expected one row, got none".to_string()))?;
        row.get(0)
    }

    /// Describe the result columns of a query without running it.
    pub fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, BackendError> {
        let rows = self.query_all(&format!("DESCRIBE {}", sql))?;
        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.get_by_name("column_name")?,
                    type_name: row.get_by_name("column_type")?,
                })
            })
            .collect()
    }

    /// Run a query and deliver its result to `sink` in batches of at most
    /// `batch_size` rows. Returns the number of rows delivered.
    pub fn query_batches<S: BatchSink + ?Sized>(
        &self,
        sql: &str,
        batch_size: usize,
        sink: &mut S,
    ) -> Result<u64, BackendError> {
        if batch_size == 0 {
            return Err(BackendError::InvalidInput(
                "batch size must be at least 1".to_string(),
            ));
        }

        let sql_hash = hash_sql(sql);
        let span = debug_span!(
            "db.query",
            op = sql_op_name(sql),
            sql_hash = %sql_hash,
            rows = tracing::field::Empty,
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut stmt = self.conn.prepare(sql)?;
        let mut rows_iter = stmt.query(duckdb::params![])?;

        let (column_count, columns) = match rows_iter.as_ref() {
            Some(stmt_ref) => {
                let count = stmt_ref.column_count();
                let cols: Vec<String> = (0..count)
                    .map(|i| {
                        stmt_ref
                            .column_name(i)
                            .map(|s| s.to_string())
                            .unwrap_or_else(|_| format!("col{}", i))
                    })
                    .collect();
                (count, cols)
            }
            None => (0, Vec::new()),
        };
        sink.columns(&columns)?;

        let mut total = 0u64;
        let mut batch: Vec<Vec<DbValue>> = Vec::with_capacity(batch_size);
        while let Some(row) = rows_iter.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: duckdb::types::Value = row.get(i)?;
                values.push(db_value_from_duckdb(value));
            }
            batch.push(values);

            if batch.len() == batch_size {
                total += batch.len() as u64;
                if sink.batch(&batch)?.is_break() {
                    batch.clear();
                    break;
                }
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total += batch.len() as u64;
            let _ = sink.batch(&batch)?;
        }

        span.record("rows", total);
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(total)
    }
}

const DEFAULT_COLLECT_BATCH: usize = 1024;

struct RowCollector<'a> {
    columns: Rc<[String]>,
    rows: &'a mut Vec<DbRow>,
}

impl BatchSink for RowCollector<'_> {
    fn columns(&mut self, names: &[String]) -> Result<(), BackendError> {
        self.columns = Rc::from(names.to_vec());
        Ok(())
    }

    fn batch(&mut self, rows: &[Vec<DbValue>]) -> Result<ControlFlow<()>, BackendError> {
        for values in rows {
            self.rows
                .push(DbRow::new(Rc::clone(&self.columns), values.clone()));
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn db_value_from_duckdb(value: duckdb::types::Value) -> DbValue {
    use duckdb::types::{TimeUnit, Value};

    fn to_micros(unit: TimeUnit, v: i64) -> i64 {
        match unit {
            TimeUnit::Second => v * 1_000_000,
            TimeUnit::Millisecond => v * 1_000,
            TimeUnit::Microsecond => v,
            TimeUnit::Nanosecond => v / 1_000,
        }
    }

    match value {
        Value::Null => DbValue::Null,
        Value::Boolean(v) => DbValue::Boolean(v),
        Value::TinyInt(v) => DbValue::Integer(v as i64),
        Value::SmallInt(v) => DbValue::Integer(v as i64),
        Value::Int(v) => DbValue::Integer(v as i64),
        Value::BigInt(v) => DbValue::Integer(v),
        Value::HugeInt(v) => i64::try_from(v)
            .map(DbValue::Integer)
            .unwrap_or_else(|_| DbValue::Text(v.to_string())),
        Value::UTinyInt(v) => DbValue::Integer(v as i64),
        Value::USmallInt(v) => DbValue::Integer(v as i64),
        Value::UInt(v) => DbValue::Integer(v as i64),
        Value::UBigInt(v) => i64::try_from(v)
            .map(DbValue::Integer)
            .unwrap_or_else(|_| DbValue::Text(v.to_string())),
        Value::Float(v) => DbValue::Real(v as f64),
        Value::Double(v) => DbValue::Real(v),
        Value::Decimal(v) => DbValue::Text(v.to_string()),
        Value::Text(v) => DbValue::Text(v),
        Value::Enum(v) => DbValue::Text(v),
        Value::Blob(v) => DbValue::Blob(v),
        Value::Timestamp(unit, v) => {
            let micros = to_micros(unit, v);
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(dt) => DbValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
                None => DbValue::Integer(micros),
            }
        }
        Value::Date32(days) => {
            match chrono::NaiveDate::from_num_days_from_ce_opt(719_163 + days) {
                Some(date) => DbValue::Text(date.format("%Y-%m-%d").to_string()),
                None => DbValue::Integer(days as i64),
            }
        }
        Value::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let secs = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1_000) as u32;
            match chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos) {
                Some(time) => DbValue::Text(time.format("%H:%M:%S%.6f").to_string()),
                None => DbValue::Integer(micros),
            }
        }
        Value::Interval {
            months,
            days,
            nanos,
        } => DbValue::Text(format!("P{}M{}DT{}N", months, days, nanos)),
        Value::List(items) | Value::Array(items) => {
            DbValue::List(items.into_iter().map(db_value_from_duckdb).collect())
        }
        other => {
            tracing::warn!(
                "DuckDB value {:?} mapped to debug string",
                std::mem::discriminant(&other)
            );
            DbValue::Text(format!("{:?}", other))
        }
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

/// Quote an SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit hash for low-cardinality, stable identification.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording {
        columns: Vec<String>,
        batch_sizes: Vec<usize>,
        stop_after: Option<usize>,
    }

    impl BatchSink for Recording {
        fn columns(&mut self, names: &[String]) -> Result<(), BackendError> {
            self.columns = names.to_vec();
            Ok(())
        }

        fn batch(&mut self, rows: &[Vec<DbValue>]) -> Result<ControlFlow<()>, BackendError> {
            self.batch_sizes.push(rows.len());
            match self.stop_after {
                Some(n) if self.batch_sizes.len() >= n => Ok(ControlFlow::Break(())),
                _ => Ok(ControlFlow::Continue(())),
            }
        }
    }

    fn recording() -> Recording {
        Recording {
            columns: Vec::new(),
            batch_sizes: Vec::new(),
            stop_after: None,
        }
    }

    #[test]
    fn query_batches_splits_into_fixed_size_chunks() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut sink = recording();

        let total = conn
            .query_batches("SELECT range AS n FROM range(2500)", 1000, &mut sink)
            .unwrap();

        assert_eq!(total, 2500);
        assert_eq!(sink.columns, vec!["n".to_string()]);
        assert_eq!(sink.batch_sizes, vec![1000, 1000, 500]);
    }

    #[test]
    fn query_batches_reports_columns_for_empty_result() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut sink = recording();

        let total = conn
            .query_batches("SELECT 1 AS a, 'x' AS b WHERE false", 10, &mut sink)
            .unwrap();

        assert_eq!(total, 0);
        assert_eq!(sink.columns, vec!["a".to_string(), "b".to_string()]);
        assert!(sink.batch_sizes.is_empty());
    }

    #[test]
    fn query_batches_stops_when_sink_breaks() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut sink = recording();
        sink.stop_after = Some(1);

        let total = conn
            .query_batches("SELECT range FROM range(50)", 10, &mut sink)
            .unwrap();

        assert_eq!(total, 10);
        assert_eq!(sink.batch_sizes, vec![10]);
    }

    #[test]
    fn query_batches_rejects_zero_batch_size() {
        let conn = DbConnection::open_in_memory().unwrap();
        let err = conn
            .query_batches("SELECT 1", 0, &mut recording())
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn values_convert_from_engine_types() {
        let conn = DbConnection::open_in_memory().unwrap();
        let rows = conn
            .query_all(
                "SELECT NULL AS n, true AS b, 42::BIGINT AS i, 1.5::DOUBLE AS d, \
                 'abc' AS s, [1, 2]::BIGINT[] AS l, DATE '2024-01-02' AS day",
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.values()[0], DbValue::Null);
        assert_eq!(row.values()[1], DbValue::Boolean(true));
        assert_eq!(row.values()[2], DbValue::Integer(42));
        assert_eq!(row.values()[3], DbValue::Real(1.5));
        assert_eq!(row.values()[4], DbValue::Text("abc".to_string()));
        assert_eq!(
            row.values()[5],
            DbValue::List(vec![DbValue::Integer(1), DbValue::Integer(2)])
        );
        assert_eq!(row.values()[6], DbValue::Text("2024-01-02".to_string()));
    }

    #[test]
    fn describe_reports_column_types() {
        let conn = DbConnection::open_in_memory().unwrap();
        let cols = conn
            .describe("SELECT 1::BIGINT AS id, 'x'::VARCHAR AS name")
            .unwrap();

        assert_eq!(
            cols,
            vec![
                ColumnInfo {
                    name: "id".to_string(),
                    type_name: "BIGINT".to_string()
                },
                ColumnInfo {
                    name: "name".to_string(),
                    type_name: "VARCHAR".to_string()
                },
            ]
        );
    }

    #[test]
    fn query_error_surfaces_engine_message() {
        let conn = DbConnection::open_in_memory().unwrap();
        let err = conn.query_all("SELECT * FROM missing_table").unwrap_err();
        assert!(matches!(err, BackendError::DuckDb(_)));
        assert!(err.to_string().contains("missing_table"));
    }

    #[test]
    fn query_scalar_reads_first_value() {
        let conn = DbConnection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id BIGINT); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        let count: i64 = conn.query_scalar("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn load_extension_rejects_suspicious_names() {
        let conn = DbConnection::open_in_memory().unwrap();
        let err = conn.load_extension("inet; DROP TABLE x").unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("id.orig_h"), "\"id.orig_h\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
