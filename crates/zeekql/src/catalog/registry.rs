//! Grouping of log files by logical type and exact schema.

use super::header::{Compression, Field, LogFile};
use std::fmt;
use std::path::{Path, PathBuf};

/// Structural identity of a file's ordered `(name, type)` list.
///
/// Two fingerprints are equal exactly when names, types and order all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaFingerprint {
    fields: Vec<Field>,
}

impl SchemaFingerprint {
    pub fn new(fields: &[Field]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Stable 12-character hex digest, for logs and status lines.
    pub fn short_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(field.type_token.as_bytes());
            hasher.update(b"\x1e");
        }
        let hash = hasher.finalize().to_hex();
        hash[..12].to_string()
    }
}

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hash())
    }
}

/// Files of one logical type that share an identical schema.
#[derive(Debug, Clone)]
pub struct SchemaGroup {
    pub log_type: String,
    pub fingerprint: SchemaFingerprint,
    /// Member files in registration order.
    pub files: Vec<(PathBuf, Compression)>,
}

impl SchemaGroup {
    pub fn fields(&self) -> &[Field] {
        self.fingerprint.fields()
    }

    /// Member paths stored with the given compression.
    pub fn files_with(&self, compression: Compression) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter(move |(_, c)| *c == compression)
            .map(|(path, _)| path.as_path())
    }
}

/// All schema groups of one logical type; becomes one view.
#[derive(Debug, Clone)]
pub struct LogTypeView {
    pub name: String,
    pub groups: Vec<SchemaGroup>,
}

impl LogTypeView {
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }
}

/// Outcome of [`SchemaRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First file with this schema for its log type.
    NewSchema,
    /// Appended to an existing group.
    Existing,
    /// The path was already registered; ignored.
    Duplicate,
}

/// Log files grouped by logical type, then by schema fingerprint.
///
/// Types and groups keep first-seen order.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: Vec<LogTypeView>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, file: LogFile) -> Registration {
        let LogFile {
            path,
            log_type,
            fields,
            compression,
        } = file;

        let index = match self.types.iter().position(|t| t.name == log_type) {
            Some(index) => index,
            None => {
                self.types.push(LogTypeView {
                    name: log_type.clone(),
                    groups: Vec::new(),
                });
                self.types.len() - 1
            }
        };
        let view = &mut self.types[index];

        if view
            .groups
            .iter()
            .any(|g| g.files.iter().any(|(p, _)| *p == path))
        {
            return Registration::Duplicate;
        }

        let fingerprint = SchemaFingerprint::new(&fields);
        match view.groups.iter_mut().find(|g| g.fingerprint == fingerprint) {
            Some(group) => {
                group.files.push((path, compression));
                Registration::Existing
            }
            None => {
                view.groups.push(SchemaGroup {
                    log_type,
                    fingerprint,
                    files: vec![(path, compression)],
                });
                Registration::NewSchema
            }
        }
    }

    pub fn log_types(&self) -> &[LogTypeView] {
        &self.types
    }

    pub fn get(&self, log_type: &str) -> Option<&LogTypeView> {
        self.types.iter().find(|t| t.name == log_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.types.iter().map(LogTypeView::file_count).sum()
    }

    pub fn log_type_count(&self) -> usize {
        self.types.len()
    }

    pub fn schema_count(&self) -> usize {
        self.types.iter().map(|t| t.groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(path: &str, log_type: &str, fields: &[(&str, &str)]) -> LogFile {
        LogFile {
            path: PathBuf::from(path),
            log_type: log_type.to_string(),
            fields: fields.iter().map(|(n, t)| Field::new(*n, *t)).collect(),
            compression: Compression::None,
        }
    }

    #[test]
    fn identical_fields_give_equal_fingerprints() {
        let a = SchemaFingerprint::new(&[Field::new("ts", "time"), Field::new("uid", "string")]);
        let b = SchemaFingerprint::new(&[Field::new("ts", "time"), Field::new("uid", "string")]);
        assert_eq!(a, b);
        assert_eq!(a.short_hash(), b.short_hash());
        assert_eq!(a.short_hash().len(), 12);
    }

    #[test]
    fn any_difference_gives_unequal_fingerprints() {
        let base = SchemaFingerprint::new(&[Field::new("ts", "time"), Field::new("uid", "string")]);
        let renamed =
            SchemaFingerprint::new(&[Field::new("ts", "time"), Field::new("id", "string")]);
        let retyped = SchemaFingerprint::new(&[Field::new("ts", "double"), Field::new("uid", "string")]);
        let reordered =
            SchemaFingerprint::new(&[Field::new("uid", "string"), Field::new("ts", "time")]);
        let extended = SchemaFingerprint::new(&[
            Field::new("ts", "time"),
            Field::new("uid", "string"),
            Field::new("duration", "interval"),
        ]);

        for other in [&renamed, &retyped, &reordered, &extended] {
            assert_ne!(&base, other);
            assert_ne!(base.short_hash(), other.short_hash());
        }
    }

    #[test]
    fn groups_by_type_then_schema_in_first_seen_order() {
        let mut registry = SchemaRegistry::new();
        let short = [("ts", "time"), ("id.orig_h", "addr")];
        let long = [("ts", "time"), ("id.orig_h", "addr"), ("duration", "interval")];

        assert_eq!(registry.register(log("a/conn.log", "conn", &short)), Registration::NewSchema);
        assert_eq!(registry.register(log("a/dns.log", "dns", &short)), Registration::NewSchema);
        assert_eq!(registry.register(log("b/conn.log", "conn", &long)), Registration::NewSchema);
        assert_eq!(registry.register(log("c/conn.log", "conn", &short)), Registration::Existing);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["conn", "dns"]);
        assert_eq!(registry.file_count(), 4);
        assert_eq!(registry.log_type_count(), 2);
        assert_eq!(registry.schema_count(), 3);

        let conn = registry.get("conn").unwrap();
        assert_eq!(conn.groups.len(), 2);
        assert_eq!(conn.groups[0].fields().len(), 2);
        assert_eq!(
            conn.groups[0].files_with(Compression::None).collect::<Vec<_>>(),
            vec![Path::new("a/conn.log"), Path::new("c/conn.log")]
        );
        assert_eq!(conn.groups[1].fields().len(), 3);
    }

    #[test]
    fn same_path_is_registered_once() {
        let mut registry = SchemaRegistry::new();
        let fields = [("ts", "time")];
        registry.register(log("conn.log", "conn", &fields));
        assert_eq!(
            registry.register(log("conn.log", "conn", &fields)),
            Registration::Duplicate
        );
        assert_eq!(registry.file_count(), 1);
    }

    #[test]
    fn empty_registry() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("conn").is_none());
        assert_eq!(registry.schema_count(), 0);
    }
}
