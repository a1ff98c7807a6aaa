//! Helpful error types for the CLI
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// The engine rejected or failed the user query.
    pub fn query_failed<'a>(
        details: &str,
        query: &str,
        log_types: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let log_types: Vec<&str> = log_types.into_iter().collect();
        let err = Self::new(format!("Query failed: {}", details))
            .with_context(format!("While running: {}", query.trim()));

        if is_missing_table(details) {
            if log_types.is_empty() {
                err.with_suggestions([
                    "TRY: No log types were registered; check that the patterns match Zeek logs",
                    "TRY: Run with -v to see which files were matched and skipped",
                ])
            } else {
                err.with_suggestion(format!(
                    "TRY: Query one of the registered log types: {}",
                    log_types.join(", ")
                ))
                .with_suggestion("TRY: Quote names with dots or dashes: SELECT \"id.orig_h\" FROM conn")
            }
        } else {
            err.with_suggestions([
                "TRY: Column names with dots must be double-quoted, e.g. \"id.orig_h\"",
                "TRY: Use DESCRIBE <log type> to list a view's columns and types",
            ])
        }
    }

    /// `-C` points somewhere unusable.
    pub fn directory_not_found(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot enter directory: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                format!("TRY: Check that the directory exists: ls -la {}", path.display()),
                "TRY: Verify you have read and execute permissions for it".to_string(),
            ])
    }
}

fn is_missing_table(details: &str) -> bool {
    let lower = details.to_ascii_lowercase();
    lower.contains("table with name") && lower.contains("does not exist")
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
