//! SQL view synthesis.
//!
//! Each schema group becomes one typed `SELECT` over the engine's CSV reader
//! (every raw column read as VARCHAR, then projected). The groups of a log
//! type are combined with `UNION ALL BY NAME`, so a column missing from one
//! schema reads as NULL for that schema's rows. Every row also carries a
//! `schema_source` column naming the first file of its schema group.

use super::error::{ViewError, Warning};
use super::header::Compression;
use super::registry::{LogTypeView, SchemaGroup, SchemaRegistry};
use super::types::Capabilities;
use tracing::{debug, warn};
use zeekql_db::{quote_ident, quote_literal, DbConnection};

/// Column tagging each row with the first file of its schema group.
pub const SCHEMA_SOURCE_COLUMN: &str = "schema_source";

/// First field of the trailer line Zeek writes when it closes a log.
const CLOSE_DIRECTIVE: &str = "#close";

/// A `CREATE OR REPLACE VIEW` statement for one log type.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub name: String,
    pub sql: String,
    /// Union of the groups' field names, first-seen order, then
    /// `schema_source` unless a log field already has that name.
    pub columns: Vec<String>,
    pub group_count: usize,
    pub file_count: usize,
}

/// Views registered by [`ViewSynthesizer::register_all`].
#[derive(Debug, Default)]
pub struct ViewReport {
    pub created: Vec<ViewDefinition>,
    pub warnings: Vec<Warning>,
}

impl ViewReport {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.created.iter().map(|v| v.name.as_str())
    }
}

/// Builds view SQL from a [`SchemaRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct ViewSynthesizer {
    caps: Capabilities,
    header_lines: usize,
}

impl ViewSynthesizer {
    pub fn new(caps: Capabilities, header_lines: usize) -> Self {
        Self { caps, header_lines }
    }

    /// Typed `SELECT` for one schema group, with the `schema_source` column
    /// appended when `tag_source` is set.
    pub fn group_select(&self, group: &SchemaGroup, tag_source: bool) -> String {
        let mut projections = group
            .fields()
            .iter()
            .map(|field| {
                let column = quote_ident(&field.name);
                format!("{} AS {}", field.zeek_type().projection(&column, self.caps), column)
            })
            .collect::<Vec<_>>();
        if tag_source {
            if let Some((path, _)) = group.files.first() {
                projections.push(format!(
                    "{} AS {}",
                    quote_literal(&path.to_string_lossy()),
                    quote_ident(SCHEMA_SOURCE_COLUMN)
                ));
            }
        }
        let projections = projections.join(", ");

        let sources = [Compression::None, Compression::Gzip]
            .into_iter()
            .filter_map(|compression| self.read_source(group, compression))
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        format!("SELECT {} FROM ({}) AS raw", projections, sources)
    }

    /// Raw VARCHAR rows of the group's files stored with `compression`.
    fn read_source(&self, group: &SchemaGroup, compression: Compression) -> Option<String> {
        let files: Vec<String> = group
            .files_with(compression)
            .map(|path| quote_literal(&path.to_string_lossy()))
            .collect();
        if files.is_empty() {
            return None;
        }

        let columns = group
            .fields()
            .iter()
            .map(|field| format!("{}: 'VARCHAR'", quote_literal(&field.name)))
            .collect::<Vec<_>>()
            .join(", ");
        let first = quote_ident(&group.fields()[0].name);

        Some(format!(
            "SELECT * FROM read_csv([{files}], delim='\\t', header=false, skip={skip}, \
             auto_detect=false, quote='', escape='', compression='{compression}', \
             columns={{{columns}}}, ignore_errors=true) \
             WHERE {first} IS DISTINCT FROM '{close}'",
            files = files.join(", "),
            skip = self.header_lines,
            compression = compression.as_str(),
            columns = columns,
            first = first,
            close = CLOSE_DIRECTIVE,
        ))
    }

    /// `CREATE OR REPLACE VIEW` for every group of one log type.
    pub fn view_sql(&self, view: &LogTypeView) -> ViewDefinition {
        let mut columns: Vec<String> = Vec::new();
        for field in view.groups.iter().flat_map(|g| g.fields()) {
            if !columns.contains(&field.name) {
                columns.push(field.name.clone());
            }
        }

        let tag_source = !columns.iter().any(|c| c == SCHEMA_SOURCE_COLUMN);

        let selects = view
            .groups
            .iter()
            .filter(|g| !g.fields().is_empty())
            .map(|g| self.group_select(g, tag_source))
            .collect::<Vec<_>>()
            .join(" UNION ALL BY NAME ");

        // BY NAME orders columns first-seen across groups; move the tag last.
        let body = if tag_source {
            columns.push(SCHEMA_SOURCE_COLUMN.to_string());
            let source = quote_ident(SCHEMA_SOURCE_COLUMN);
            format!(
                "SELECT * EXCLUDE ({source}), {source} FROM ({selects}) AS tagged",
                source = source,
                selects = selects
            )
        } else {
            selects
        };

        ViewDefinition {
            name: view.name.clone(),
            sql: format!(
                "CREATE OR REPLACE VIEW {} AS {}",
                quote_ident(&view.name),
                body
            ),
            columns,
            group_count: view.groups.len(),
            file_count: view.file_count(),
        }
    }

    /// Create one view per log type. A failure only excludes that log type.
    pub fn register_all(&self, conn: &DbConnection, registry: &SchemaRegistry) -> ViewReport {
        let mut report = ViewReport::default();

        for view in registry.log_types() {
            let definition = self.view_sql(view);
            debug!(view = %definition.name, sql = %definition.sql, "Creating view");

            match conn.execute_batch(&definition.sql) {
                Ok(()) => {
                    for group in &view.groups {
                        debug!(
                            view = %view.name,
                            schema = %group.fingerprint,
                            files = group.files.len(),
                            "Schema group"
                        );
                    }
                    report.created.push(definition);
                }
                Err(source) => {
                    warn!(view = %definition.name, error = %source, "View creation failed");
                    report.warnings.push(
                        ViewError {
                            log_type: definition.name,
                            source,
                        }
                        .into(),
                    );
                }
            }
        }

        report
    }
}
