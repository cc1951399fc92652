//! Storage interfaces the schema rebuilder drives.
//!
//! The rebuilder never talks to SQLite directly. It goes through three
//! collaborators:
//!
//! - [`RowStore`]: physical tables and their rows
//! - [`SubtypeStore`]: semantic subtype metadata keyed by (table, column)
//! - [`LayoutRefs`]: name-keyed layout records that follow a table rename
//!
//! [`PantryDb`](datapantry_db::PantryDb) implements all three (see
//! `sqlite.rs`). Tests wrap it to inject failures.

use crate::model::{Column, SubtypeTag};
use crate::value::{Row, Value};
use async_trait::async_trait;
use datapantry_db::{DbError, PhysicalColumnDef};

pub type StoreResult<T> = std::result::Result<T, DbError>;

#[async_trait]
pub trait RowStore: Send + Sync {
    /// User tables in name order.
    async fn list_tables(&self) -> StoreResult<Vec<String>>;

    async fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Logical columns reconstructed from the physical table and subtype metadata.
    async fn list_columns(&self, table: &str) -> StoreResult<Vec<Column>>;

    /// Every row, decoded using the given logical columns.
    async fn list_rows(&self, table: &str, columns: &[Column]) -> StoreResult<Vec<Row>>;

    async fn count_rows(&self, table: &str) -> StoreResult<u64>;

    /// Declared type of a column, `None` if the table or column is missing.
    async fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<String>>;

    /// Distinct non-null values of a column.
    async fn distinct_values(&self, table: &str, column: &str) -> StoreResult<Vec<Value>>;

    async fn create_table(&self, name: &str, columns: &[PhysicalColumnDef]) -> StoreResult<()>;

    /// Insert rows; each row is encoded according to `columns`.
    async fn bulk_insert(&self, table: &str, columns: &[Column], rows: &[Row]) -> StoreResult<u64>;

    async fn drop_table(&self, name: &str) -> StoreResult<()>;

    async fn rename_table(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Drop `original`, then rename `shadow` to `final_name`.
    ///
    /// The default runs two separate steps; a failure between them leaves
    /// neither table under `final_name`. Stores with transactional DDL should
    /// override it.
    async fn replace_table(&self, original: &str, shadow: &str, final_name: &str) -> StoreResult<()> {
        self.drop_table(original).await?;
        self.rename_table(shadow, final_name).await
    }
}

#[async_trait]
pub trait SubtypeStore: Send + Sync {
    async fn get_subtype(&self, table: &str, column: &str) -> StoreResult<Option<SubtypeTag>>;

    async fn set_subtype(&self, table: &str, column: &str, tag: SubtypeTag) -> StoreResult<()>;

    async fn clear_subtype(&self, table: &str, column: &str) -> StoreResult<()>;

    /// Remove every subtype record for a table.
    async fn clear_table_subtypes(&self, table: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait LayoutRefs: Send + Sync {
    /// Called only when a migration renames a table.
    async fn rename_references(&self, from: &str, to: &str) -> StoreResult<()>;

    async fn delete_references(&self, table: &str) -> StoreResult<()>;
}

/// Everything a [`Migrator`](crate::Migrator) needs from storage.
pub trait SchemaStore: RowStore + SubtypeStore + LayoutRefs {}

impl<T: RowStore + SubtypeStore + LayoutRefs> SchemaStore for T {}
