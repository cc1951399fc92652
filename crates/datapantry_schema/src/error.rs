//! Migration errors.

use crate::rebuild::RebuildState;
use datapantry_db::DbError;
use thiserror::Error;

/// Errors from table lifecycle and migration operations.
///
/// Everything except `Store` and `StorageFailure` is raised before the original
/// table is touched.
/// `StorageFailure` carries the rebuild state the failing step started from.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid column spec: {0}")]
    InvalidColumnSpec(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column '{column}' references missing table '{table}'")]
    ReferencedTableNotFound { column: String, table: String },

    #[error("A migration is already in flight for table: {0}")]
    MigrationInFlight(String),

    #[error("Required reference column '{column}' has {rows} row(s) without a valid reference")]
    RequiredReferenceMissing { column: String, rows: usize },

    #[error("Unique required column '{column}' has no distinct value left for {rows} row(s)")]
    DistinctValuesExhausted { column: String, rows: usize },

    /// A read or lifecycle step failed outside the rebuild state machine.
    #[error("Storage error: {0}")]
    Store(#[from] DbError),

    #[error("Storage failure during {stage:?}: {source}")]
    StorageFailure {
        stage: RebuildState,
        #[source]
        source: DbError,
    },
}

pub type Result<T> = std::result::Result<T, MigrationError>;
