//! Error types for the catalog pipeline.
//!
//! Only pattern errors are fatal. Everything else is scoped to one file or
//! one log type and ends up in a [`Warning`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use zeekql_db::BackendError;

/// Problems with a single log file's header.
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: no #{directive} directive in the first {scanned} lines", path.display())]
    MissingDirective {
        path: PathBuf,
        directive: &'static str,
        scanned: usize,
    },

    #[error("{}: #fields lists {fields} names but #types lists {types}", path.display())]
    FieldTypeMismatch {
        path: PathBuf,
        fields: usize,
        types: usize,
    },

    #[error(
        "{}: header is {found} lines but data is read after line {expected}",
        path.display()
    )]
    DataOffsetMismatch {
        path: PathBuf,
        found: usize,
        expected: usize,
    },
}

/// Problems while resolving patterns to files.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(
        "{}: paths containing '*', '?' or '[' are read as globs by the engine",
        path.display()
    )]
    GlobCharacters { path: PathBuf },
}

/// A log type whose view could not be created.
#[derive(Error, Debug)]
#[error("View '{log_type}' could not be created: {source}")]
pub struct ViewError {
    pub log_type: String,
    #[source]
    pub source: BackendError,
}

/// A non-fatal problem recorded during a pipeline phase.
#[derive(Debug)]
pub enum Warning {
    Discovery(DiscoveryError),
    Header(HeaderError),
    View(ViewError),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Discovery(err) => write!(f, "Skipped during discovery: {}", err),
            Warning::Header(err) => write!(f, "Skipped file: {}", err),
            Warning::View(err) => write!(f, "{}", err),
        }
    }
}

impl From<DiscoveryError> for Warning {
    fn from(err: DiscoveryError) -> Self {
        Warning::Discovery(err)
    }
}

impl From<HeaderError> for Warning {
    fn from(err: HeaderError) -> Self {
        Warning::Header(err)
    }
}

impl From<ViewError> for Warning {
    fn from(err: ViewError) -> Self {
        Warning::View(err)
    }
}
