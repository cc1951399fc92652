//! Semantic subtype metadata.
//!
//! SQLite only stores TEXT/INTEGER/REAL, so DATE, TIME, DATETIME and BOOLEAN
//! columns are recorded here alongside their physical storage.

use crate::error::Result;
use crate::PantryDb;
use sqlx::Row;
use std::collections::HashMap;

pub const METADATA_TABLE: &str = "__datapantry_metadata";

impl PantryDb {
    /// Semantic subtype recorded for one column.
    pub async fn semantic_type(&self, table: &str, column: &str) -> Result<Option<String>> {
        let row = sqlx::query(&format!(
            "SELECT semantic_type FROM {METADATA_TABLE} WHERE table_name = ? AND column_name = ?"
        ))
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("semantic_type")?)),
            None => Ok(None),
        }
    }

    /// All semantic subtypes recorded for a table, keyed by column name.
    pub async fn semantic_types_for(&self, table: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query(&format!(
            "SELECT column_name, semantic_type FROM {METADATA_TABLE} WHERE table_name = ?"
        ))
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((row.try_get("column_name")?, row.try_get("semantic_type")?)))
            .collect()
    }

    /// Record (or replace) a column's semantic subtype.
    pub async fn set_semantic_type(&self, table: &str, column: &str, subtype: &str) -> Result<()> {
        sqlx::query(&format!(
            r#"INSERT INTO {METADATA_TABLE} (table_name, column_name, semantic_type)
               VALUES (?, ?, ?)
               ON CONFLICT(table_name, column_name) DO UPDATE SET semantic_type = excluded.semantic_type"#
        ))
        .bind(table)
        .bind(column)
        .bind(subtype)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a column's subtype record. Absent records are not an error.
    pub async fn clear_semantic_type(&self, table: &str, column: &str) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {METADATA_TABLE} WHERE table_name = ? AND column_name = ?"
        ))
        .bind(table)
        .bind(column)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove every subtype record for a table.
    pub async fn clear_semantic_types_for(&self, table: &str) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {METADATA_TABLE} WHERE table_name = ?"))
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
