//! Run configuration.

use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_HEADER_LINES: usize = 8;
pub const DEFAULT_SCAN_LINES: usize = 15;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--batch-size must be at least 1")]
    ZeroBatchSize,

    #[error("--scan-lines ({scan}) must be larger than --header-lines ({header})")]
    ScanWindowTooSmall { scan: usize, header: usize },

    #[error("no query given")]
    MissingQuery,

    #[error("at least one file pattern is required before the query")]
    MissingPattern,
}

/// Everything one invocation needs.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// File regexes; a file matching any of them is included.
    pub patterns: Vec<String>,
    pub query: String,
    /// Directory relative patterns are resolved against.
    pub base_dir: PathBuf,
    pub batch_size: usize,
    pub header_lines: usize,
    pub scan_lines: usize,
}

impl QueryConfig {
    pub fn new(patterns: Vec<String>, query: impl Into<String>) -> Self {
        Self {
            patterns,
            query: query.into(),
            base_dir: PathBuf::from("."),
            batch_size: DEFAULT_BATCH_SIZE,
            header_lines: DEFAULT_HEADER_LINES,
            scan_lines: DEFAULT_SCAN_LINES,
        }
    }

    /// Split trailing-query positional arguments into patterns and query.
    pub fn from_args(mut args: Vec<String>) -> Result<Self, ConfigError> {
        let query = args.pop().ok_or(ConfigError::MissingQuery)?;
        Ok(Self::new(args, query))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.trim().is_empty() {
            return Err(ConfigError::MissingQuery);
        }
        if self.patterns.is_empty() {
            return Err(ConfigError::MissingPattern);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.scan_lines <= self.header_lines {
            return Err(ConfigError::ScanWindowTooSmall {
                scan: self.scan_lines,
                header: self.header_lines,
            });
        }
        Ok(())
    }
}
