//! DuckDB engine layer for zeekql
//!
//! Narrow interface to the embedded analytical engine: register relations
//! with `execute_batch`, inspect a query with `describe`, and pull results in
//! fixed-size batches with `query_batches`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use zeekql_db::{DbConnection, BatchSink};
//!
//! let conn = DbConnection::open_in_memory()?;
//! conn.load_extension("inet")?;
//! conn.execute_batch("CREATE VIEW conn AS SELECT ...")?;
//! let rows = conn.query_batches("SELECT * FROM conn", 1000, &mut sink)?;
//! ```

pub mod backend;

pub use backend::{
    quote_ident, quote_literal, BackendError, BatchSink, ColumnInfo, DbConnection, DbRow,
    DbValue, FromDbValue,
};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, BackendError>;
