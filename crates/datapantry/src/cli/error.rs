//! Helpful error types for CLI commands
//!
//! Every error includes what went wrong, optional context, and suggestions for
//! how to fix it.

use datapantry_schema::MigrationError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
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

    // === Common error constructors ===

    pub fn cannot_open_database(path: &Path, reason: &str) -> Self {
        Self::new(format!("Failed to open database: {}", reason))
            .with_context(format!("Database path: {}", path.display()))
            .with_suggestion("TRY: Ensure the directory exists and is writable")
            .with_suggestion("TRY: Point at another file with --database or DATAPANTRY_DATABASE")
    }

    /// Translate a migration error into advice for the shell user.
    pub fn from_migration(err: &MigrationError) -> Self {
        let base = Self::new(err.to_string());
        match err {
            MigrationError::TableNotFound(_) => {
                base.with_suggestion("TRY: List existing tables: datapantry tables")
            }
            MigrationError::ReferencedTableNotFound { table, .. } => base.with_suggestion(
                format!("TRY: Create the referenced table first: datapantry create-table {}", table),
            ),
            MigrationError::MigrationInFlight(_) => {
                base.with_suggestion("TRY: Wait for the running migration to finish")
            }
            MigrationError::RequiredReferenceMissing { column, .. } => base
                .with_context("The original table was left unchanged")
                .with_suggestion(format!(
                    "TRY: Fill '{}' with valid references, or keep it optional",
                    column
                )),
            MigrationError::DistinctValuesExhausted { column, .. } => base
                .with_context("The original table was left unchanged")
                .with_suggestion(format!(
                    "TRY: Drop the unique constraint on '{}' or remove the surplus rows first",
                    column
                )),
            MigrationError::StorageFailure { stage, .. } if stage.past_swap() => base
                .with_context("The table was replaced but its metadata may be stale")
                .with_suggestion("TRY: Inspect the table: datapantry describe <table>"),
            MigrationError::StorageFailure { .. } => {
                base.with_context("The original table was left unchanged")
            }
            MigrationError::InvalidColumnSpec(_) | MigrationError::Store(_) => base,
        }
    }
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

impl From<MigrationError> for HelpfulError {
    fn from(err: MigrationError) -> Self {
        Self::from_migration(&err)
    }
}

/// Print an error as a JSON object on stdout.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({
            "error": format!("{:#}", err),
        }),
    };
    println!("{}", payload);
}
