//! CLI module for zeekql
//!
//! The single `zeekql` command: match files, build views, run one query.

pub mod error;
pub mod query;
