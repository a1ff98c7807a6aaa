//! Query execution and tab-separated result output.
//!
//! Values are rendered the way Zeek writes them: NULL as `-`, booleans as
//! `T`/`F`, lists as `[a,b,c]`. Address columns are cast to text by the
//! engine before they reach this module.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use zeekql_db::{quote_ident, BackendError, BatchSink, ColumnInfo, DbConnection, DbValue};

use crate::catalog::types::NULL_MARKER;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0}")]
    Query(#[from] BackendError),

    #[error("Failed to write results: {0}")]
    Io(#[from] io::Error),
}

/// Totals reported after a query finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub rows: u64,
    pub elapsed: Duration,
    /// Output was closed by the reader before all rows were written.
    pub truncated: bool,
}

/// Runs a query and writes the result as TSV in fixed-size batches.
#[derive(Debug)]
pub struct ResultStreamer<'a> {
    conn: &'a DbConnection,
    batch_size: usize,
}

impl<'a> ResultStreamer<'a> {
    pub fn new(conn: &'a DbConnection, batch_size: usize) -> Self {
        Self { conn, batch_size }
    }

    /// The SQL actually executed for `query`.
    ///
    /// INET results are wrapped in a cast to text. If the query cannot be
    /// described it is returned as-is so the engine reports the real error
    /// on execution.
    pub fn prepare_query(&self, query: &str) -> String {
        let query = trim_query(query);
        let columns = match self.conn.describe(query) {
            Ok(columns) => columns,
            Err(err) => {
                debug!(error = %err, "DESCRIBE failed; running query unchanged");
                return query.to_string();
            }
        };
        wrap_inet_columns(query, &columns).unwrap_or_else(|| query.to_string())
    }

    /// Execute `query` and write header plus rows to `out`.
    ///
    /// Nothing is written if the engine rejects the query. A closed output
    /// ends the stream early without an error.
    pub fn stream<W: Write>(&self, query: &str, out: W) -> Result<StreamSummary, StreamError> {
        let sql = self.prepare_query(query);
        debug!(sql = %sql, batch_size = self.batch_size, "Executing query");

        let start = Instant::now();
        let mut sink = TsvSink::new(out);
        let rows = self
            .conn
            .query_batches(&sql, self.batch_size, &mut sink)
            .map_err(|err| match err {
                BackendError::Io(err) => StreamError::Io(err),
                other => StreamError::Query(other),
            })?;
        sink.finish()?;

        Ok(StreamSummary {
            rows,
            elapsed: start.elapsed(),
            truncated: sink.closed,
        })
    }
}

fn trim_query(query: &str) -> &str {
    query.trim().trim_end_matches(';').trim_end()
}

/// `SELECT` over `query` casting INET columns to VARCHAR, or `None` when
/// nothing needs casting or the column names are ambiguous.
fn wrap_inet_columns(query: &str, columns: &[ColumnInfo]) -> Option<String> {
    if !columns.iter().any(|c| c.type_name.starts_with("INET")) {
        return None;
    }
    let mut seen = std::collections::HashSet::new();
    if !columns.iter().all(|c| seen.insert(c.name.as_str())) {
        return None;
    }

    let projections = columns
        .iter()
        .map(|c| {
            let column = format!("q.{}", quote_ident(&c.name));
            let alias = quote_ident(&c.name);
            match c.type_name.as_str() {
                "INET" => format!("CAST({} AS VARCHAR) AS {}", column, alias),
                "INET[]" => format!(
                    "list_transform({}, a -> CAST(a AS VARCHAR)) AS {}",
                    column, alias
                ),
                _ => column,
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    // Newline keeps a trailing `--` comment in `query` from swallowing the close.
    Some(format!("SELECT {} FROM ({}\n) AS q", projections, query))
}

/// Writes batches as tab-separated lines, flushing after each batch.
struct TsvSink<W: Write> {
    out: W,
    line: String,
    closed: bool,
}

impl<W: Write> TsvSink<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            line: String::new(),
            closed: false,
        }
    }

    /// Write the buffered line; `Break` once the reader has gone away.
    fn emit(&mut self) -> Result<ControlFlow<()>, BackendError> {
        self.line.push('\n');
        match self.out.write_all(self.line.as_bytes()) {
            Ok(()) => Ok(ControlFlow::Continue(())),
            Err(err) => self.on_error(err),
        }
    }

    fn on_error(&mut self, err: io::Error) -> Result<ControlFlow<()>, BackendError> {
        if err.kind() == io::ErrorKind::BrokenPipe {
            self.closed = true;
            Ok(ControlFlow::Break(()))
        } else {
            Err(err.into())
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        match self.out.flush() {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Ok(())
            }
            other => other,
        }
    }
}

impl<W: Write> BatchSink for TsvSink<W> {
    fn columns(&mut self, names: &[String]) -> Result<(), BackendError> {
        self.line.clear();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.line.push('\t');
            }
            push_escaped(&mut self.line, name);
        }
        self.emit()?;
        Ok(())
    }

    fn batch(&mut self, rows: &[Vec<DbValue>]) -> Result<ControlFlow<()>, BackendError> {
        if self.closed {
            return Ok(ControlFlow::Break(()));
        }
        for row in rows {
            self.line.clear();
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    self.line.push('\t');
                }
                format_value(value, &mut self.line);
            }
            if self.emit()?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        match self.out.flush() {
            Ok(()) => Ok(ControlFlow::Continue(())),
            Err(err) => self.on_error(err),
        }
    }
}

/// Append the text form of `value` to `buf`.
fn format_value(value: &DbValue, buf: &mut String) {
    match value {
        DbValue::Null => buf.push_str(NULL_MARKER),
        DbValue::Boolean(true) => buf.push('T'),
        DbValue::Boolean(false) => buf.push('F'),
        DbValue::Integer(v) => {
            let _ = write!(buf, "{}", v);
        }
        DbValue::Real(v) => {
            let _ = write!(buf, "{}", v);
        }
        DbValue::Text(s) => push_escaped(buf, s),
        DbValue::Blob(bytes) => {
            for &b in bytes {
                if b.is_ascii_graphic() || b == b' ' {
                    buf.push(b as char);
                } else {
                    let _ = write!(buf, "\\x{:02x}", b);
                }
            }
        }
        DbValue::List(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                format_value(item, buf);
            }
            buf.push(']');
        }
    }
}

fn push_escaped(buf: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\t' => buf.push_str("\\x09"),
            '\n' => buf.push_str("\\x0a"),
            '\r' => buf.push_str("\\x0d"),
            c => buf.push(c),
        }
    }
}
