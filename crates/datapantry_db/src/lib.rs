//! SQLite persistence for DataPantry user databases.
//!
//! One [`PantryDb`] wraps one user database file. It owns the physical user
//! tables plus two bookkeeping tables:
//!
//! - `__datapantry_metadata`: semantic subtypes (DATE, TIME, DATETIME, BOOLEAN)
//!   layered over the TEXT/INTEGER storage SQLite actually has
//! - `__datapantry_positions`: designer canvas positions keyed by table name
//!
//! # Usage
//!
//! ```rust,ignore
//! use datapantry_db::{PantryDb, Result};
//!
//! let db = PantryDb::open("~/.datapantry/pantry.sqlite3").await?;
//!
//! for table in db.list_tables().await? {
//!     let columns = db.table_info(&table).await?;
//! }
//! ```

mod error;
mod metadata;
mod positions;
mod schema;
mod sql;
mod tables;
mod types;

pub use error::{DbError, Result};
pub use metadata::METADATA_TABLE;
pub use positions::POSITIONS_TABLE;
pub use sql::quote_ident;
pub use tables::{create_table_sql, is_internal_table};
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Handle to one user database.
#[derive(Clone)]
pub struct PantryDb {
    pool: SqlitePool,
}

impl std::fmt::Debug for PantryDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PantryDb").field("backend", &"SQLite").finish()
    }
}

impl PantryDb {
    /// Open or create a database at the given path.
    ///
    /// Creates the bookkeeping tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, 5).await
    }

    /// Open or create a database with an explicit pool size.
    pub async fn open_with(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = connect_options(path).create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Open an existing database (fails if not exists).
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::NotFound(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options(path))
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Open a private in-memory database (for testing).
    ///
    /// A single connection that never idles out: every new connection to
    /// `sqlite::memory:` would see a different, empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(false))
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Foreign key clauses are kept for introspection only. The schema rebuilder
/// checks references itself.
fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .foreign_keys(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("test.sqlite3");

        let db = PantryDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_open_existing_fails_if_not_exists() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nonexistent.sqlite3");

        let result = PantryDb::open_existing(&db_path).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_database_keeps_state_across_calls() {
        let db = PantryDb::open_memory().await.unwrap();
        db.execute_batch("CREATE TABLE t (id REAL PRIMARY KEY)")
            .await
            .unwrap();

        assert!(db.table_exists("t").await.unwrap());
    }
}
