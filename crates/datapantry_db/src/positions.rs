//! Designer canvas positions, one row per user table.

use crate::error::Result;
use crate::types::TablePosition;
use crate::PantryDb;
use sqlx::Row;

pub const POSITIONS_TABLE: &str = "__datapantry_positions";

impl PantryDb {
    pub async fn upsert_position(&self, table: &str, x: i64, y: i64) -> Result<()> {
        sqlx::query(&format!(
            r#"INSERT INTO {POSITIONS_TABLE} (table_name, x, y) VALUES (?, ?, ?)
               ON CONFLICT(table_name) DO UPDATE SET x = excluded.x, y = excluded.y"#
        ))
        .bind(table)
        .bind(x)
        .bind(y)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn position(&self, table: &str) -> Result<Option<TablePosition>> {
        let row = sqlx::query(&format!(
            "SELECT table_name, x, y FROM {POSITIONS_TABLE} WHERE table_name = ?"
        ))
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_position(&row)).transpose()
    }

    pub async fn list_positions(&self) -> Result<Vec<TablePosition>> {
        let rows = sqlx::query(&format!(
            "SELECT table_name, x, y FROM {POSITIONS_TABLE} ORDER BY table_name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_position).collect()
    }

    /// Move a position record to a new table name.
    ///
    /// Returns false when no record existed under `from`.
    pub async fn rename_position(&self, from: &str, to: &str) -> Result<bool> {
        if from == to {
            return Ok(self.position(from).await?.is_some());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {POSITIONS_TABLE} WHERE table_name = ?"))
            .bind(to)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(&format!(
            "UPDATE {POSITIONS_TABLE} SET table_name = ? WHERE table_name = ?"
        ))
        .bind(to)
        .bind(from)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_position(&self, table: &str) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {POSITIONS_TABLE} WHERE table_name = ?"))
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_position(row: &sqlx::sqlite::SqliteRow) -> Result<TablePosition> {
    Ok(TablePosition {
        table_name: row.try_get("table_name")?,
        x: row.try_get("x")?,
        y: row.try_get("y")?,
    })
}
