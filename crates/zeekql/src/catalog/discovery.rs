//! Regex-based file discovery.
//!
//! Relative patterns are matched against paths relative to the search root.
//! A pattern starting with `/` walks its longest existing directory prefix
//! instead and is matched against absolute paths.
//!
//! The engine expands `*`, `?` and `[` in file paths as globs, so files whose
//! path contains them are reported and left out.

use super::error::{DiscoveryError, Warning};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const GLOB_CHARACTERS: [char; 3] = ['*', '?', '['];

/// Files matched by a discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Matching files, sorted and deduplicated.
    pub files: Vec<PathBuf>,
    /// Number of regular files examined.
    pub candidates: usize,
    pub warnings: Vec<Warning>,
}

/// Resolves regex patterns into concrete file paths.
#[derive(Debug)]
pub struct FileDiscoverer {
    patterns: Vec<Regex>,
    roots: BTreeSet<PathBuf>,
    base: PathBuf,
}

impl FileDiscoverer {
    /// Compile `patterns`; relative candidates are taken under `base`.
    pub fn new<S: AsRef<str>>(
        patterns: &[S],
        base: impl Into<PathBuf>,
    ) -> Result<Self, DiscoveryError> {
        let base = base.into();
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut roots = BTreeSet::new();

        for raw in patterns {
            let raw = raw.as_ref();
            let regex = Regex::new(raw).map_err(|source| DiscoveryError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?;
            compiled.push(regex);
            roots.insert(search_root(raw, &base));
        }

        Ok(Self {
            patterns: compiled,
            roots,
            base,
        })
    }

    /// Directories that will be walked.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// Walk every search root and keep files matching at least one pattern.
    pub fn discover(&self) -> Discovery {
        let mut found = BTreeSet::new();
        // Canonical paths, so one file reached under two spellings is kept once.
        let mut seen = HashSet::new();
        let mut discovery = Discovery::default();

        for root in &self.roots {
            for entry in WalkDir::new(root) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        discovery.warnings.push(DiscoveryError::Walk(err).into());
                        continue;
                    }
                };

                let path = entry.path();
                let is_file = entry.file_type().is_file()
                    || (entry.path_is_symlink() && path.is_file());
                if !is_file {
                    continue;
                }
                discovery.candidates += 1;

                if !self.is_match(path) {
                    continue;
                }
                let keep = if self.base == Path::new(".") {
                    path.strip_prefix(&self.base).unwrap_or(path)
                } else {
                    path
                };
                let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                if !seen.insert(canonical) {
                    debug!(path = %keep.display(), "Already matched under another path");
                    continue;
                }
                if keep.to_string_lossy().contains(GLOB_CHARACTERS) {
                    discovery.warnings.push(
                        DiscoveryError::GlobCharacters {
                            path: keep.to_path_buf(),
                        }
                        .into(),
                    );
                    continue;
                }
                debug!(path = %keep.display(), "Matched file");
                found.insert(keep.to_path_buf());
            }
        }

        discovery.files = found.into_iter().collect();
        discovery
    }

    /// Relative patterns see the path under the base directory; absolute
    /// patterns see the absolute path.
    fn is_match(&self, path: &Path) -> bool {
        let relative = path
            .strip_prefix(&self.base)
            .ok()
            .map(normalize_path_to_forward_slashes);
        let mut absolute: Option<String> = None;

        self.patterns.iter().any(|pattern| {
            if pattern.as_str().starts_with('/') {
                let text = absolute.get_or_insert_with(|| {
                    let full = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
                    normalize_path_to_forward_slashes(&full)
                });
                pattern.is_match(text)
            } else {
                relative.as_deref().is_some_and(|text| pattern.is_match(text))
            }
        })
    }
}

/// Directory to walk for `pattern`.
fn search_root(pattern: &str, base: &Path) -> PathBuf {
    if !pattern.starts_with('/') {
        return base.to_path_buf();
    }

    let parts: Vec<&str> = pattern.split('/').collect();
    for end in (1..=parts.len()).rev() {
        let prefix = parts[..end].join("/");
        let candidate = if prefix.is_empty() { "/".to_string() } else { prefix };
        if Path::new(&candidate).is_dir() {
            return PathBuf::from(candidate);
        }
    }
    PathBuf::from("/")
}

/// Join path components with `/` regardless of platform, dropping `.`.
fn normalize_path_to_forward_slashes(path: &Path) -> String {
    use std::path::Component;

    let joined = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if path.has_root() {
        format!("/{}", joined.trim_start_matches('/'))
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2024-01-01/conn.00:00:00-01:00:00.log.gz");
        touch(tmp.path(), "2024-01-01/dns.00:00:00-01:00:00.log.gz");
        touch(tmp.path(), "2024-01-02/conn.00:00:00-01:00:00.log.gz");
        touch(tmp.path(), "current/conn.log");
        touch(tmp.path(), "notes.txt");
        tmp
    }

    fn relative_names(tmp: &TempDir, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| normalize_path_to_forward_slashes(f.strip_prefix(tmp.path()).unwrap()))
            .collect()
    }

    #[test]
    fn matches_relative_paths_with_search_semantics() {
        let tmp = tree();
        let discoverer = FileDiscoverer::new(&["conn"], tmp.path()).unwrap();
        let found = discoverer.discover();

        assert_eq!(found.candidates, 5);
        assert_eq!(
            relative_names(&tmp, &found.files),
            vec![
                "2024-01-01/conn.00:00:00-01:00:00.log.gz",
                "2024-01-02/conn.00:00:00-01:00:00.log.gz",
                "current/conn.log",
            ]
        );
    }

    #[test]
    fn patterns_are_or_combined_and_deduplicated() {
        let tmp = tree();
        let discoverer =
            FileDiscoverer::new(&[r"^2024-01-01/", r"dns\..*\.gz$", r"\.gz$"], tmp.path())
                .unwrap();
        let found = discoverer.discover();

        assert_eq!(found.files.len(), 3);
        let names = relative_names(&tmp, &found.files);
        assert!(names.contains(&"2024-01-01/dns.00:00:00-01:00:00.log.gz".to_string()));
        assert!(!names.contains(&"current/conn.log".to_string()));
    }

    #[test]
    fn no_match_yields_empty_result() {
        let tmp = tree();
        let found = FileDiscoverer::new(&[r"^http\."], tmp.path()).unwrap().discover();
        assert!(found.files.is_empty());
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let err = FileDiscoverer::new(&["conn("], ".").unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidPattern { .. }));
    }

    #[test]
    fn absolute_pattern_walks_existing_prefix() {
        let tmp = tree();
        let pattern = format!(
            "{}/2024-01-02/.*\\.gz$",
            normalize_path_to_forward_slashes(tmp.path())
        );
        let discoverer = FileDiscoverer::new(&[pattern.as_str()], ".").unwrap();

        let roots: Vec<&Path> = discoverer.roots().collect();
        assert_eq!(roots, vec![tmp.path().join("2024-01-02").as_path()]);

        let found = discoverer.discover();
        assert_eq!(
            found.files,
            vec![tmp.path().join("2024-01-02/conn.00:00:00-01:00:00.log.gz")]
        );
    }

    #[test]
    fn overlapping_relative_and_absolute_patterns_keep_one_copy() {
        // A relative base makes the two patterns produce different spellings.
        let tmp = TempDir::new_in(".").unwrap();
        touch(tmp.path(), "a/x.log");
        let absolute = std::path::absolute(tmp.path()).unwrap();
        let pattern = format!("{}/a/", normalize_path_to_forward_slashes(&absolute));

        let found = FileDiscoverer::new(&[r"^a/x\.log$", pattern.as_str()], tmp.path())
            .unwrap()
            .discover();
        assert_eq!(found.files.len(), 1, "{:?}", found.files);
        assert!(found.warnings.is_empty());
    }

    #[test]
    fn glob_characters_in_paths_are_skipped_with_warning() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "conn[1].log");
        touch(tmp.path(), "conn*.log");
        touch(tmp.path(), "conn?.log");
        touch(tmp.path(), "conn.log");

        let found = FileDiscoverer::new(&["conn"], tmp.path()).unwrap().discover();
        assert_eq!(relative_names(&tmp, &found.files), vec!["conn.log"]);
        assert_eq!(found.warnings.len(), 3);
        assert!(found
            .warnings
            .iter()
            .all(|w| matches!(w, Warning::Discovery(DiscoveryError::GlobCharacters { .. }))));
    }

    #[test]
    fn normalize_strips_current_dir() {
        assert_eq!(
            normalize_path_to_forward_slashes(Path::new("./logs/conn.log")),
            "logs/conn.log"
        );
        assert_eq!(
            normalize_path_to_forward_slashes(Path::new("/var/log/conn.log")),
            "/var/log/conn.log"
        );
    }
}
