//! User table operations: catalog introspection, DDL, row reads and bulk writes.

use crate::error::{DbError, Result};
use crate::sql::{bind_value, quote_ident};
use crate::types::{ColumnInfo, DbRow, DbValue, ForeignKeyInfo, PhysicalColumnDef};
use crate::PantryDb;
use sqlx::Row;
use std::collections::HashSet;
use tracing::{debug, info};

/// SQLite's default host-parameter ceiling for a single statement.
const DEFAULT_MAX_PARAMS: usize = 999;

/// Whether a table name belongs to SQLite or to DataPantry bookkeeping.
pub fn is_internal_table(name: &str) -> bool {
    name.starts_with("sqlite_") || name.starts_with("__datapantry_")
}

impl PantryDb {
    // ========================================================================
    // Catalog
    // ========================================================================

    /// List user tables in name order.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            if !is_internal_table(&name) {
                tables.push(name);
            }
        }
        Ok(tables)
    }

    /// Check whether a table exists (internal tables included).
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// `PRAGMA table_info` for a table, in column order.
    pub async fn table_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    cid: row.try_get("cid")?,
                    name: row.try_get("name")?,
                    declared_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    default_value: row.try_get("dflt_value")?,
                    primary_key: row.try_get::<i64, _>("pk")? != 0,
                })
            })
            .collect()
    }

    /// `PRAGMA foreign_key_list` for a table.
    pub async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        let rows = sqlx::query(
            r#"SELECT "from", "table", "to", on_update, on_delete FROM pragma_foreign_key_list(?)"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ForeignKeyInfo {
                    from: row.try_get("from")?,
                    table: row.try_get("table")?,
                    to: row.try_get("to")?,
                    on_update: row.try_get("on_update")?,
                    on_delete: row.try_get("on_delete")?,
                })
            })
            .collect()
    }

    /// Columns covered by a single-column UNIQUE constraint.
    ///
    /// Primary-key autoindexes are excluded; `table_info` already reports those.
    pub async fn unique_columns(&self, table: &str) -> Result<HashSet<String>> {
        let indexes = sqlx::query(r#"SELECT name, "unique", origin FROM pragma_index_list(?)"#)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut unique = HashSet::new();
        for index in indexes {
            let is_unique = index.try_get::<i64, _>("unique")? != 0;
            let origin: String = index.try_get("origin")?;
            if !is_unique || origin == "pk" {
                continue;
            }
            let index_name: String = index.try_get("name")?;
            let members = sqlx::query("SELECT name FROM pragma_index_info(?)")
                .bind(&index_name)
                .fetch_all(&self.pool)
                .await?;
            if members.len() == 1 {
                if let Some(name) = members[0].try_get::<Option<String>, _>("name")? {
                    unique.insert(name);
                }
            }
        }
        Ok(unique)
    }

    /// Declared type of one column, if the table and column exist.
    pub async fn column_declared_type(&self, table: &str, column: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT type FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(
                row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
            )),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Read every row of a table in rowid order.
    pub async fn select_all(&self, table: &str) -> Result<Vec<DbRow>> {
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        self.query_all(&sql, &[]).await
    }

    /// Distinct non-null values of one column.
    pub async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<DbValue>> {
        let column_ident = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = column_ident,
            table = quote_ident(table)
        );
        let rows = self.query_all(&sql, &[]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(0).cloned())
            .collect())
    }

    /// Number of rows in a table.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("n")?)
    }

    /// Bulk insert rows into a table inside one transaction.
    ///
    /// Column order must match the row value order. Rows are chunked so no
    /// statement binds more than 999 parameters.
    pub async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<DbValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        if columns.is_empty() {
            return Err(DbError::invalid_input(
                "bulk_insert requires at least one column",
            ));
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbError::invalid_input(format!(
                    "Row {} has {} values, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
        }

        let cols_len = columns.len();
        if cols_len > DEFAULT_MAX_PARAMS {
            return Err(DbError::invalid_input(format!(
                "Too many columns ({}) for max params ({})",
                cols_len, DEFAULT_MAX_PARAMS
            )));
        }
        let rows_per_chunk = DEFAULT_MAX_PARAMS / cols_len;

        let quoted_table = quote_ident(table);
        let quoted_cols = columns
            .iter()
            .map(|col| quote_ident(col))
            .collect::<Vec<_>>()
            .join(", ");
        let row_clause = format!("({})", vec!["?"; cols_len].join(", "));

        let mut tx = self.pool.begin().await?;
        let mut total = 0;
        for chunk in rows.chunks(rows_per_chunk) {
            let values_clause = std::iter::repeat(row_clause.as_str())
                .take(chunk.len())
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quoted_table, quoted_cols, values_clause
            );
            let mut query = sqlx::query(&sql);
            for value in chunk.iter().flatten() {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await?;
            total += chunk.len() as u64;
        }
        tx.commit().await?;

        debug!(table, rows = total, "Bulk insert complete");
        Ok(total)
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Create a table from physical column definitions.
    pub async fn create_table(&self, name: &str, columns: &[PhysicalColumnDef]) -> Result<()> {
        let sql = create_table_sql(name, columns)?;
        debug!(table = name, sql = %sql, "Creating table");
        self.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Drop a table.
    pub async fn drop_table(&self, name: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE {}", quote_ident(name)), &[])
            .await?;
        Ok(())
    }

    /// Rename a table.
    pub async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.execute(
            &format!("ALTER TABLE {} RENAME TO {}", quote_ident(from), quote_ident(to)),
            &[],
        )
        .await?;
        Ok(())
    }

    /// Drop `original` and rename `shadow` to `final_name` in one transaction.
    ///
    /// SQLite DDL is transactional, so either both steps land or neither does.
    pub async fn replace_table(&self, original: &str, shadow: &str, final_name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE {}", quote_ident(original)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(shadow),
            quote_ident(final_name)
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(original, shadow, final_name, "Table replaced");
        Ok(())
    }
}

/// Render a CREATE TABLE statement.
pub fn create_table_sql(name: &str, columns: &[PhysicalColumnDef]) -> Result<String> {
    if columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Table {} needs at least one column",
            name
        )));
    }

    let mut defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let mut def = format!("{} {}", quote_ident(&col.name), col.sql_type);
            if col.primary_key {
                def.push_str(" PRIMARY KEY");
            } else if col.unique {
                def.push_str(" UNIQUE");
            }
            if col.not_null {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();

    defs.extend(columns.iter().filter_map(|col| {
        col.references.as_ref().map(|target| {
            format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(&col.name),
                quote_ident(&target.table),
                quote_ident(&target.column)
            )
        })
    }));

    Ok(format!("CREATE TABLE {} ({})", quote_ident(name), defs.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_sql_renders_constraints_and_foreign_keys() {
        let sql = create_table_sql(
            "orders",
            &[
                PhysicalColumnDef::new("id", "REAL").primary_key(),
                PhysicalColumnDef::new("code", "TEXT").unique().not_null(),
                PhysicalColumnDef::new("customer", "REAL").references("customers", "id"),
            ],
        )
        .unwrap();

        assert_eq!(
            sql,
            r#"CREATE TABLE "orders" ("id" REAL PRIMARY KEY, "code" TEXT UNIQUE NOT NULL, "customer" REAL, FOREIGN KEY ("customer") REFERENCES "customers"("id"))"#
        );
    }

    #[test]
    fn create_table_sql_rejects_empty_column_list() {
        assert!(matches!(
            create_table_sql("t", &[]),
            Err(DbError::InvalidInput(_))
        ));
    }

    #[test]
    fn internal_tables_are_recognised() {
        assert!(is_internal_table("sqlite_sequence"));
        assert!(is_internal_table("__datapantry_metadata"));
        assert!(!is_internal_table("customers"));
    }

    #[tokio::test]
    async fn bulk_insert_rows_inserts_expected_rows() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER, name TEXT)")
            .await
            .unwrap();

        let rows = vec![
            vec![DbValue::from(1_i64), DbValue::from("alpha")],
            vec![DbValue::from(2_i64), DbValue::from("beta")],
        ];
        let inserted = db.bulk_insert("t", &["id", "name"], &rows).await.unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(db.count_rows("t").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bulk_insert_chunks_past_parameter_limit() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (a INTEGER, b INTEGER, c INTEGER)")
            .await
            .unwrap();

        let rows: Vec<Vec<DbValue>> = (0..1_000_i64)
            .map(|i| vec![DbValue::from(i), DbValue::from(i * 2), DbValue::Null])
            .collect();
        let inserted = db.bulk_insert("t", &["a", "b", "c"], &rows).await.unwrap();

        assert_eq!(inserted, 1_000);
        assert_eq!(db.count_rows("t").await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn bulk_insert_rejects_mismatched_row_len() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER, name TEXT)")
            .await
            .unwrap();

        let rows = vec![
            vec![DbValue::from(1_i64)],
            vec![DbValue::from(2_i64), DbValue::from("beta")],
        ];
        let err = db.bulk_insert("t", &["id", "name"], &rows).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn bulk_insert_empty_is_noop() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER)").await.unwrap();

        let inserted = db.bulk_insert("t", &["id"], &[]).await.unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn introspection_reports_keys_and_unique_columns() {
        let db = PantryDb::open_memory().await.unwrap();
        db.create_table(
            "customers",
            &[
                PhysicalColumnDef::new("id", "REAL").primary_key(),
                PhysicalColumnDef::new("email", "TEXT").unique().not_null(),
            ],
        )
        .await
        .unwrap();
        db.create_table(
            "orders",
            &[
                PhysicalColumnDef::new("id", "REAL").primary_key(),
                PhysicalColumnDef::new("customer", "REAL").references("customers", "id"),
            ],
        )
        .await
        .unwrap();

        let info = db.table_info("customers").await.unwrap();
        assert_eq!(info.len(), 2);
        assert!(info[0].primary_key);
        assert_eq!(info[1].declared_type, "TEXT");
        assert!(info[1].not_null);

        let unique = db.unique_columns("customers").await.unwrap();
        assert!(unique.contains("email"));
        assert!(!unique.contains("id"));

        let fks = db.foreign_keys("orders").await.unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].from, "customer");
        assert_eq!(fks[0].table, "customers");
        assert_eq!(fks[0].to.as_deref(), Some("id"));

        assert_eq!(
            db.column_declared_type("customers", "email").await.unwrap(),
            Some("TEXT".to_string())
        );
        assert_eq!(db.column_declared_type("customers", "nope").await.unwrap(), None);

        let tables = db.list_tables().await.unwrap();
        assert_eq!(tables, vec!["customers".to_string(), "orders".to_string()]);
    }

    #[tokio::test]
    async fn replace_table_swaps_shadow_into_place() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch(
            "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);
             CREATE TABLE t_shadow (id INTEGER, extra TEXT); INSERT INTO t_shadow VALUES (9, 'x');",
        )
        .await
        .unwrap();

        db.replace_table("t", "t_shadow", "t").await.unwrap();

        assert!(!db.table_exists("t_shadow").await.unwrap());
        let rows = db.select_all("t").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("extra"), Some(&DbValue::Text("x".into())));
    }

    #[tokio::test]
    async fn replace_table_failure_leaves_original_intact() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);")
            .await
            .unwrap();

        let result = db.replace_table("t", "missing_shadow", "t").await;
        assert!(result.is_err());
        assert_eq!(db.count_rows("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_values_skips_nulls() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch(
            "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('a'), ('a'), (NULL), ('b');",
        )
        .await
        .unwrap();

        let mut values = db.distinct_values("t", "v").await.unwrap();
        values.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        assert_eq!(values, vec![DbValue::from("a"), DbValue::from("b")]);
    }
}
