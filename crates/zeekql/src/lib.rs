//! zeekql - SQL over Zeek logs
//!
//! Discovers Zeek TSV logs by regex, groups them by log type and exact
//! schema, registers one typed view per log type with an embedded DuckDB
//! session and streams query results back in Zeek's text conventions.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod output;

pub use catalog::{
    scan, Capabilities, FileDiscoverer, HeaderReader, ScanReport, SchemaRegistry,
    ViewSynthesizer, Warning, ZeekType,
};
pub use config::{ConfigError, QueryConfig};
pub use engine::Engine;
pub use output::{ResultStreamer, StreamError, StreamSummary};
