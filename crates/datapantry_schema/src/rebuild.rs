//! Shadow-table rebuilds and table lifecycle.
//!
//! SQLite cannot alter most column properties in place, so every migration
//! rebuilds the table:
//!
//! ```text
//! Idle -> ShadowCreated -> DataCopied -> Swapped -> MetadataSynced -> Done
//!   \__________\______________\____________\_____________\--> Failed
//! ```
//!
//! 1. create a uniquely named shadow table with the new column definitions
//! 2. when preserving data, transform the current rows and insert them
//! 3. drop the original and rename the shadow into place
//! 4. rewrite subtype metadata and move layout records on a rename
//!
//! Input validation, table lookups and reference checks all happen before
//! step 1. A failure before step 3 drops the shadow (best effort) and leaves
//! the original untouched.

use crate::ddl::{physical_column, physical_type};
use crate::error::{MigrationError, Result};
use crate::lock::MigrationLocks;
use crate::model::{validate_columns, Column, DataType, DiffOp};
use crate::store::SchemaStore;
use crate::transform::{ReferenceSets, ReferenceValues, RowTransformer, TransformReport};
use crate::value::Row;
use datapantry_db::{is_internal_table, DbError, PhysicalColumnDef};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rows returned with a table impact summary.
const IMPACT_SAMPLE_ROWS: usize = 5;

/// Progress of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RebuildState {
    Idle,
    ShadowCreated,
    DataCopied,
    Swapped,
    MetadataSynced,
    Done,
    Failed,
}

impl RebuildState {
    /// The state a successful step moves to.
    pub fn next(self) -> Option<RebuildState> {
        match self {
            RebuildState::Idle => Some(RebuildState::ShadowCreated),
            RebuildState::ShadowCreated => Some(RebuildState::DataCopied),
            RebuildState::DataCopied => Some(RebuildState::Swapped),
            RebuildState::Swapped => Some(RebuildState::MetadataSynced),
            RebuildState::MetadataSynced => Some(RebuildState::Done),
            RebuildState::Done | RebuildState::Failed => None,
        }
    }

    /// Whether the original table may already be gone.
    pub fn past_swap(self) -> bool {
        matches!(
            self,
            RebuildState::Swapped | RebuildState::MetadataSynced | RebuildState::Done
        )
    }
}

/// One `migrate` call.
///
/// Deserializes from a camelCase migration plan; `ops` defaults to empty and
/// `preserveData` to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub table: String,
    /// Rename the table as part of the rebuild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_table_name: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default, alias = "columnChanges")]
    pub ops: Vec<DiffOp>,
    #[serde(default = "preserve_by_default")]
    pub preserve_data: bool,
}

fn preserve_by_default() -> bool {
    true
}

impl MigrationRequest {
    pub fn new(
        table: impl Into<String>,
        columns: Vec<Column>,
        ops: Vec<DiffOp>,
        preserve_data: bool,
    ) -> Self {
        Self {
            table: table.into(),
            new_table_name: None,
            columns,
            ops,
            preserve_data,
        }
    }

    pub fn rename_to(mut self, name: impl Into<String>) -> Self {
        self.new_table_name = Some(name.into());
        self
    }
}

/// Result of a completed migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub success: bool,
    /// Final table name.
    pub table: String,
    pub final_columns: Vec<Column>,
    pub rows_copied: u64,
    pub report: TransformReport,
    pub referential_integrity_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: u64,
}

/// What a destructive change to a table would discard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableImpact {
    pub table: String,
    pub row_count: u64,
    pub sample: Vec<Row>,
}

/// Tracks the state of one rebuild and logs each transition.
struct Rebuild<'a> {
    table: &'a str,
    state: RebuildState,
}

impl<'a> Rebuild<'a> {
    fn new(table: &'a str) -> Self {
        Self {
            table,
            state: RebuildState::Idle,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!(table = self.table, from = ?self.state, to = ?next, "Rebuild step complete");
            self.state = next;
        }
    }

    fn fail(&mut self, source: DbError) -> MigrationError {
        let stage = self.state;
        warn!(table = self.table, stage = ?stage, error = %source, "Rebuild failed");
        self.state = RebuildState::Failed;
        MigrationError::StorageFailure { stage, source }
    }
}

/// Runs migrations and table lifecycle operations against one store.
///
/// Clones share the store and the lock registry, so concurrent tasks holding
/// clones still see each other's in-flight migrations.
pub struct Migrator<S> {
    store: Arc<S>,
    locks: MigrationLocks,
}

impl<S> Clone for Migrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Migrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").field("locks", &self.locks).finish()
    }
}

impl<S: SchemaStore> Migrator<S> {
    pub fn new(store: S) -> Self {
        Self::with_locks(Arc::new(store), MigrationLocks::new())
    }

    pub fn with_locks(store: Arc<S>, locks: MigrationLocks) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &MigrationLocks {
        &self.locks
    }

    /// Migrate `table` to `new_columns` in place.
    pub async fn migrate_table(
        &self,
        table: &str,
        new_columns: Vec<Column>,
        ops: Vec<DiffOp>,
        preserve_data: bool,
    ) -> Result<MigrationOutcome> {
        self.migrate(MigrationRequest::new(table, new_columns, ops, preserve_data))
            .await
    }

    /// Migrate a table, optionally renaming it.
    pub async fn migrate(&self, request: MigrationRequest) -> Result<MigrationOutcome> {
        let MigrationRequest {
            table,
            new_table_name,
            columns,
            ops,
            preserve_data,
        } = request;

        validate_columns(&columns)?;
        let final_name = match new_table_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => check_table_name(name)?.to_string(),
            _ => table.clone(),
        };

        let _guard = self.locks.try_acquire(&[table.as_str(), final_name.as_str()])?;

        self.require_table(&table).await?;
        let store = self.store.as_ref();
        if final_name != table && store.table_exists(&final_name).await? {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "table '{}' already exists",
                final_name
            )));
        }

        let old_columns = store.list_columns(&table).await?;
        let (defs, references) = self
            .plan_columns(&table, &final_name, &columns, preserve_data)
            .await?;

        info!(
            table = %table,
            final_name = %final_name,
            preserve_data,
            ops = ops.len(),
            "Migration started"
        );

        let shadow = shadow_name(&final_name);
        let mut rebuild = Rebuild::new(&table);

        // Idle -> ShadowCreated
        store
            .create_table(&shadow, &defs)
            .await
            .map_err(|e| rebuild.fail(e))?;
        rebuild.advance();

        // ShadowCreated -> DataCopied
        let (rows_copied, report) = if preserve_data {
            match self
                .copy_rows(&table, &shadow, &old_columns, &columns, &ops, &references)
                .await
            {
                Ok(copied) => copied,
                Err(err) => {
                    let err = match err {
                        CopyError::Store(source) => rebuild.fail(source),
                        CopyError::Rejected(err) => {
                            rebuild.state = RebuildState::Failed;
                            err
                        }
                    };
                    self.discard_shadow(&shadow).await;
                    return Err(err);
                }
            }
        } else {
            (0, TransformReport::default())
        };
        rebuild.advance();

        // DataCopied -> Swapped
        store
            .replace_table(&table, &shadow, &final_name)
            .await
            .map_err(|e| rebuild.fail(e))?;
        rebuild.advance();

        // Swapped -> MetadataSynced
        self.sync_metadata(&table, &final_name, &old_columns, &columns)
            .await
            .map_err(|e| rebuild.fail(e))?;
        rebuild.advance();

        rebuild.advance();
        let degraded = report.referential_integrity_degraded();
        info!(
            table = %final_name,
            rows = rows_copied,
            degraded,
            "Migration complete"
        );

        Ok(MigrationOutcome {
            success: true,
            table: final_name,
            final_columns: columns,
            rows_copied,
            report,
            referential_integrity_degraded: degraded,
        })
    }

    /// Physical definitions for the new columns plus what the reference check
    /// needs to know. Fails if a referenced table does not exist.
    async fn plan_columns(
        &self,
        table: &str,
        final_name: &str,
        columns: &[Column],
        preserve_data: bool,
    ) -> Result<(Vec<PhysicalColumnDef>, ReferenceSets)> {
        let store = self.store.as_ref();
        let mut defs = Vec::with_capacity(columns.len());
        let mut references = ReferenceSets::new();

        for column in columns {
            let fk = column
                .foreign_key
                .as_ref()
                .filter(|_| column.datatype == DataType::ForeignKey);
            let Some(fk) = fk else {
                defs.push(physical_column(column, None));
                continue;
            };

            if fk.target_table == table || fk.target_table == final_name {
                // Self reference: resolve against the new column list and point at the final name.
                let target = columns.iter().find(|c| c.name == fk.target_column);
                let target_type = target
                    .filter(|c| c.datatype != DataType::ForeignKey)
                    .map(|c| physical_type(c.datatype, None));
                let mut local = column.clone();
                if let Some(fk) = local.foreign_key.as_mut() {
                    fk.target_table = final_name.to_string();
                }
                defs.push(physical_column(&local, target_type.as_deref()));
                let values = match target {
                    Some(_) => ReferenceValues::SameTable {
                        column: fk.target_column.clone(),
                    },
                    None => ReferenceValues::Unreadable,
                };
                references.insert(column.name.clone(), values);
                continue;
            }

            if !store.table_exists(&fk.target_table).await? {
                return Err(MigrationError::ReferencedTableNotFound {
                    column: column.name.clone(),
                    table: fk.target_table.clone(),
                });
            }
            let target_type = store.column_type(&fk.target_table, &fk.target_column).await?;
            defs.push(physical_column(column, target_type.as_deref()));

            if !preserve_data {
                continue;
            }
            let values = if target_type.is_none() {
                warn!(
                    column = %column.name,
                    table = %fk.target_table,
                    target = %fk.target_column,
                    "Referenced column not found"
                );
                ReferenceValues::Unreadable
            } else {
                match store.distinct_values(&fk.target_table, &fk.target_column).await {
                    Ok(values) => ReferenceValues::from_values(&values),
                    Err(e) => {
                        warn!(
                            column = %column.name,
                            table = %fk.target_table,
                            error = %e,
                            "Referenced values unreadable"
                        );
                        ReferenceValues::Unreadable
                    }
                }
            };
            references.insert(column.name.clone(), values);
        }

        Ok((defs, references))
    }

    async fn copy_rows(
        &self,
        table: &str,
        shadow: &str,
        old_columns: &[Column],
        columns: &[Column],
        ops: &[DiffOp],
        references: &ReferenceSets,
    ) -> std::result::Result<(u64, TransformReport), CopyError> {
        let store = self.store.as_ref();
        let rows = store
            .list_rows(table, old_columns)
            .await
            .map_err(CopyError::Store)?;

        let (rows, report) = RowTransformer::new(columns, ops).transform(rows, references);
        // Nulled references are only reported, but a required reference column
        // is NOT NULL in the shadow DDL, so the insert could never succeed.
        if let Some(missing) = report.missing_required_references.first() {
            return Err(CopyError::Rejected(MigrationError::RequiredReferenceMissing {
                column: missing.column.clone(),
                rows: missing.rows,
            }));
        }
        if let Some(exhausted) = report.exhausted_required.first() {
            return Err(CopyError::Rejected(MigrationError::DistinctValuesExhausted {
                column: exhausted.column.clone(),
                rows: exhausted.rows,
            }));
        }

        let copied = store
            .bulk_insert(shadow, columns, &rows)
            .await
            .map_err(CopyError::Store)?;
        Ok((copied, report))
    }

    async fn sync_metadata(
        &self,
        table: &str,
        final_name: &str,
        old_columns: &[Column],
        columns: &[Column],
    ) -> std::result::Result<(), DbError> {
        let store = self.store.as_ref();

        if final_name != table {
            store.clear_table_subtypes(table).await?;
            store.rename_references(table, final_name).await?;
        } else {
            let kept: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            for old in old_columns.iter().filter(|c| !kept.contains(c.name.as_str())) {
                store.clear_subtype(table, &old.name).await?;
            }
        }

        for column in columns {
            match column.datatype.subtype() {
                Some(tag) => store.set_subtype(final_name, &column.name, tag).await?,
                None => store.clear_subtype(final_name, &column.name).await?,
            }
        }
        Ok(())
    }

    async fn discard_shadow(&self, shadow: &str) {
        if let Err(e) = self.store.drop_table(shadow).await {
            warn!(shadow, error = %e, "Failed to drop shadow table");
        }
    }

    // ========================================================================
    // Table lifecycle
    // ========================================================================

    /// User tables in name order.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.store.list_tables().await?)
    }

    /// Create an empty table holding only the default `id` primary column.
    pub async fn create_table(&self, name: &str) -> Result<Vec<Column>> {
        let name = check_table_name(name.trim())?;
        let _guard = self.locks.try_acquire(&[name])?;

        if self.store.table_exists(name).await? {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "table '{}' already exists",
                name
            )));
        }

        let columns = vec![Column::default_id()];
        let defs: Vec<_> = columns.iter().map(|c| physical_column(c, None)).collect();
        self.store.create_table(name, &defs).await?;

        info!(table = name, "Table created");
        Ok(columns)
    }

    /// Drop a table with its subtype metadata and layout records.
    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let _guard = self.locks.try_acquire(&[name])?;
        self.require_table(name).await?;

        self.store.drop_table(name).await?;
        self.store.clear_table_subtypes(name).await?;
        self.store.delete_references(name).await?;

        info!(table = name, "Table dropped");
        Ok(())
    }

    pub async fn describe_table(&self, name: &str) -> Result<TableDescription> {
        self.require_table(name).await?;
        let columns = self.store.list_columns(name).await?;
        let row_count = self.store.count_rows(name).await?;
        Ok(TableDescription {
            name: name.to_string(),
            columns,
            row_count,
        })
    }

    /// Rows a drop or a discarding migration would lose.
    pub async fn table_impact(&self, name: &str) -> Result<TableImpact> {
        self.require_table(name).await?;
        let columns = self.store.list_columns(name).await?;
        let row_count = self.store.count_rows(name).await?;
        let mut sample = self.store.list_rows(name, &columns).await?;
        sample.truncate(IMPACT_SAMPLE_ROWS);
        Ok(TableImpact {
            table: name.to_string(),
            row_count,
            sample,
        })
    }

    async fn require_table(&self, name: &str) -> Result<()> {
        if is_internal_table(name) || !self.store.table_exists(name).await? {
            return Err(MigrationError::TableNotFound(name.to_string()));
        }
        Ok(())
    }
}

/// Failure inside the data copy step.
enum CopyError {
    Store(DbError),
    Rejected(MigrationError),
}

fn check_table_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(MigrationError::InvalidColumnSpec(
            "table name must not be empty".to_string(),
        ));
    }
    if is_internal_table(name) {
        return Err(MigrationError::InvalidColumnSpec(format!(
            "'{}' is a reserved table name",
            name
        )));
    }
    Ok(name)
}

fn shadow_name(final_name: &str) -> String {
    format!("{}_shadow_{}", final_name, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_in_order_and_stop() {
        let mut state = RebuildState::Idle;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                RebuildState::Idle,
                RebuildState::ShadowCreated,
                RebuildState::DataCopied,
                RebuildState::Swapped,
                RebuildState::MetadataSynced,
                RebuildState::Done,
            ]
        );
        assert_eq!(RebuildState::Failed.next(), None);
        assert!(!RebuildState::DataCopied.past_swap());
        assert!(RebuildState::Swapped.past_swap());
    }

    #[test]
    fn plans_default_to_preserving_data() {
        let request: MigrationRequest = serde_json::from_str(
            r#"{"table":"people","newTableName":"staff",
                "columns":[{"name":"id","datatype":"number","constraint":"primary"}]}"#,
        )
        .unwrap();
        assert!(request.preserve_data);
        assert!(request.ops.is_empty());
        assert_eq!(request.new_table_name.as_deref(), Some("staff"));
        assert_eq!(request.columns, vec![Column::default_id()]);
    }

    #[test]
    fn shadow_names_are_unique() {
        let a = shadow_name("orders");
        let b = shadow_name("orders");
        assert!(a.starts_with("orders_shadow_"));
        assert_ne!(a, b);
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        assert!(check_table_name("").is_err());
        assert!(check_table_name("__datapantry_metadata").is_err());
        assert!(check_table_name("sqlite_master").is_err());
        assert_eq!(check_table_name("orders").unwrap(), "orders");
    }

    #[test]
    fn failing_a_rebuild_reports_the_starting_stage() {
        let mut rebuild = Rebuild::new("t");
        rebuild.advance();
        let err = rebuild.fail(DbError::invalid_input("boom"));
        assert!(matches!(
            err,
            MigrationError::StorageFailure {
                stage: RebuildState::ShadowCreated,
                ..
            }
        ));
        assert_eq!(rebuild.state, RebuildState::Failed);
    }
}
