//! Bookkeeping table creation.
//!
//! All CREATE TABLE statements for internal tables live here.

use crate::error::Result;
use crate::metadata::METADATA_TABLE;
use crate::positions::POSITIONS_TABLE;
use crate::PantryDb;
use tracing::debug;

impl PantryDb {
    /// Ensure all bookkeeping tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL for better concurrent access; in-memory databases report "memory" and ignore it
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                semantic_type TEXT NOT NULL,
                PRIMARY KEY (table_name, column_name)
            )"#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS {POSITIONS_TABLE} (
                table_name TEXT PRIMARY KEY,
                x INTEGER NOT NULL DEFAULT 0,
                y INTEGER NOT NULL DEFAULT 0
            )"#
        ))
        .execute(&self.pool)
        .await?;

        debug!("Bookkeeping tables verified");
        Ok(())
    }
}
