//! Log catalog: discovery, header parsing, schema grouping and views.

pub mod discovery;
pub mod error;
pub mod header;
pub mod registry;
pub mod types;
pub mod views;

pub use discovery::{Discovery, FileDiscoverer};
pub use error::{DiscoveryError, HeaderError, ViewError, Warning};
pub use header::{Compression, Field, HeaderReader, LogFile};
pub use registry::{LogTypeView, Registration, SchemaFingerprint, SchemaGroup, SchemaRegistry};
pub use types::{Capabilities, SqlType, ZeekType};
pub use views::{ViewDefinition, ViewReport, ViewSynthesizer};

use std::path::PathBuf;
use tracing::{debug, warn};

/// Registry built from a set of files, plus the files that were skipped.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub registry: SchemaRegistry,
    pub warnings: Vec<Warning>,
}

/// Read each file's header and register it. Unreadable or malformed files
/// are skipped with a warning.
pub fn scan(files: &[PathBuf], reader: &HeaderReader) -> ScanReport {
    let mut report = ScanReport::default();

    for path in files {
        match reader.read_path(path) {
            Ok(log) => {
                let log_type = log.log_type.clone();
                let outcome = report.registry.register(log);
                debug!(path = %path.display(), log_type = %log_type, ?outcome, "Registered file");
            }
            Err(err) => {
                warn!("{}", err);
                report.warnings.push(err.into());
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_skips_bad_files_and_keeps_good_ones() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("conn.log");
        std::fs::write(
            &good,
            "#separator \\x09\n#set_separator\t,\n#empty_field\t(empty)\n#unset_field\t-\n\
             #path\tconn\n#open\t2024-01-01-00-00-00\n#fields\tts\n#types\ttime\n1.0\n",
        )
        .unwrap();
        let bad = tmp.path().join("notes.txt");
        std::fs::write(&bad, "just some text\n").unwrap();

        let report = scan(&[good, bad], &HeaderReader::new(15, 8));

        assert_eq!(report.registry.file_count(), 1);
        assert_eq!(report.registry.names().collect::<Vec<_>>(), vec!["conn"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].to_string().contains("notes.txt"));
    }
}
