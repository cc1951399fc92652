//! CLI module for DataPantry
//!
//! Each command opens the configured database, runs one operation through a
//! [`Migrator`] and prints the result as text or JSON.

pub mod config;
pub mod error;
pub mod migrate;
pub mod output;
pub mod position;
pub mod table;

use crate::cli::error::HelpfulError;
use datapantry::PantryConfig;
use datapantry_db::PantryDb;
use datapantry_schema::Migrator;
use std::path::PathBuf;

/// Resolved settings for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub home: PathBuf,
    pub config: PantryConfig,
    pub database: PathBuf,
    pub json: bool,
}

impl Session {
    pub async fn open_db(&self) -> anyhow::Result<PantryDb> {
        PantryDb::open_with(&self.database, self.config.max_connections)
            .await
            .map_err(|e| HelpfulError::cannot_open_database(&self.database, &e.to_string()).into())
    }

    pub async fn migrator(&self) -> anyhow::Result<Migrator<PantryDb>> {
        Ok(Migrator::new(self.open_db().await?))
    }
}
