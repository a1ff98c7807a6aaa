//! Zeek log header parsing.
//!
//! Only a bounded prefix of each file is read. Gzip is detected from the
//! magic bytes so compressed logs need no particular extension.

use super::error::HeaderError;
use super::types::ZeekType;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Directives that make up the header block. `#close` is a trailer and data
/// rows may themselves begin with `#`, so only these keywords are counted.
const HEADER_DIRECTIVES: [&str; 8] = [
    "#separator",
    "#set_separator",
    "#empty_field",
    "#unset_field",
    "#path",
    "#open",
    "#fields",
    "#types",
];

/// How a log file is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Value for the engine's `compression` CSV option.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
        }
    }
}

/// A field declared by `#fields` / `#types`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub type_token: String,
}

impl Field {
    pub fn new(name: impl Into<String>, type_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_token: type_token.into(),
        }
    }

    pub fn zeek_type(&self) -> ZeekType {
        ZeekType::parse(&self.type_token)
    }
}

/// Header metadata of one log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    /// Logical log type from `#path` (e.g. `conn`).
    pub log_type: String,
    /// Fields in data-column order.
    pub fields: Vec<Field>,
    pub compression: Compression,
}

/// Reads `#path`, `#fields` and `#types` from the first lines of a log.
#[derive(Debug, Clone, Copy)]
pub struct HeaderReader {
    scan_lines: usize,
    header_lines: usize,
}

impl HeaderReader {
    /// `scan_lines` bounds how much of each file is read; `header_lines` is the
    /// fixed number of lines the engine skips before data.
    pub fn new(scan_lines: usize, header_lines: usize) -> Self {
        Self {
            scan_lines,
            header_lines,
        }
    }

    /// Open `path` (decompressing if needed) and parse its header.
    pub fn read_path(&self, path: &Path) -> Result<LogFile, HeaderError> {
        let io_err = |source| HeaderError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        let mut reader = BufReader::new(file);
        let compression = if reader.fill_buf().map_err(io_err)?.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else {
            Compression::None
        };

        match compression {
            Compression::Gzip => {
                self.read(path, compression, BufReader::new(MultiGzDecoder::new(reader)))
            }
            Compression::None => self.read(path, compression, reader),
        }
    }

    /// Parse a header from an already-decompressed reader.
    pub fn read<R: BufRead>(
        &self,
        path: &Path,
        compression: Compression,
        mut reader: R,
    ) -> Result<LogFile, HeaderError> {
        let mut log_type: Option<String> = None;
        let mut names: Option<Vec<String>> = None;
        let mut tokens: Option<Vec<String>> = None;
        let mut header_block = 0usize;
        let mut in_header = true;
        let mut line = String::new();

        for _ in 0..self.scan_lines {
            line.clear();
            let read = reader.read_line(&mut line).map_err(|source| HeaderError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if read == 0 {
                break;
            }
            let line = line.trim_end_matches(['\n', '\r']);

            // `#separator` is followed by a space, every other directive by a tab.
            let keyword = line.split(['\t', ' ']).next().unwrap_or_default();
            if in_header && HEADER_DIRECTIVES.contains(&keyword) {
                header_block += 1;
            } else {
                in_header = false;
            }

            let mut parts = line.split('\t');
            match parts.next() {
                Some("#path") => log_type = parts.next().map(str::to_string),
                Some("#fields") => names = Some(parts.map(str::to_string).collect()),
                Some("#types") => tokens = Some(parts.map(str::to_string).collect()),
                _ => {}
            }
        }

        let missing = |directive| HeaderError::MissingDirective {
            path: path.to_path_buf(),
            directive,
            scanned: self.scan_lines,
        };
        let log_type = log_type.filter(|t| !t.is_empty()).ok_or_else(|| missing("path"))?;
        let names = names.filter(|n| !n.is_empty()).ok_or_else(|| missing("fields"))?;
        let tokens = tokens.filter(|t| !t.is_empty()).ok_or_else(|| missing("types"))?;

        if names.len() != tokens.len() {
            return Err(HeaderError::FieldTypeMismatch {
                path: path.to_path_buf(),
                fields: names.len(),
                types: tokens.len(),
            });
        }

        if header_block != self.header_lines {
            return Err(HeaderError::DataOffsetMismatch {
                path: path.to_path_buf(),
                found: header_block,
                expected: self.header_lines,
            });
        }

        let fields = names
            .into_iter()
            .zip(tokens)
            .map(|(name, token)| Field::new(name, token))
            .collect();

        Ok(LogFile {
            path: path.to_path_buf(),
            log_type,
            fields,
            compression,
        })
    }
}
