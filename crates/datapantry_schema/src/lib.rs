//! Schema evolution for DataPantry user tables.
//!
//! A migration takes a table's new column list plus the [`DiffOp`]s that lead
//! there from the current one, and rebuilds the table through a shadow copy:
//!
//! - [`coerce`] converts single values between logical datatypes
//! - [`RowTransformer`] rewrites rows, then repairs uniqueness, required
//!   values and references
//! - [`Migrator`] runs the shadow-table rebuild, the table lifecycle and the
//!   per-table locks
//!
//! Storage sits behind the traits in [`store`]; [`datapantry_db::PantryDb`]
//! implements them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use datapantry_db::PantryDb;
//! use datapantry_schema::{Column, DataType, DiffOp, Migrator};
//!
//! let migrator = Migrator::new(PantryDb::open("pantry.sqlite3").await?);
//! migrator.create_table("people").await?;
//!
//! let columns = vec![Column::default_id(), Column::new("name", DataType::String)];
//! let ops = vec![DiffOp::Add { name: "name".into(), datatype: DataType::String, is_required: false }];
//! let outcome = migrator.migrate_table("people", columns, ops, true).await?;
//! ```

pub mod coerce;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod lock;
pub mod model;
pub mod rebuild;
mod sqlite;
pub mod store;
pub mod transform;
pub mod value;

pub use coerce::{coerce, default_for, distinct_default, required_default};
pub use diff::diff_columns;
pub use error::{MigrationError, Result};
pub use lock::{MigrationGuard, MigrationLocks};
pub use model::{validate_columns, Column, Constraint, DataType, DiffOp, ForeignKeyRef, SubtypeTag};
pub use rebuild::{
    MigrationOutcome, MigrationRequest, Migrator, RebuildState, TableDescription, TableImpact,
};
pub use store::{LayoutRefs, RowStore, SchemaStore, StoreResult, SubtypeStore};
pub use transform::{
    ExhaustedColumn, MissingReference, NullReason, NulledReferences, ReferenceSets, ReferenceValues,
    RowTransformer, TransformReport,
};
pub use value::{format_number, Row, Value};
