//! `<home>/config.toml`.
//!
//! Every field is optional in the file:
//!
//! ```toml
//! database_path = "/data/pantry.sqlite3"
//! max_connections = 5
//! preserve_data_default = true
//! log_filter = "datapantry=debug"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DATABASE_FILE: &str = "pantry.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PantryConfig {
    /// Relative paths resolve against the home directory.
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    /// Whether `migrate` keeps rows when the plan does not say.
    pub preserve_data_default: bool,
    pub log_filter: Option<String>,
}

impl Default for PantryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: 5,
            preserve_data_default: true,
            log_filter: None,
        }
    }
}

impl PantryConfig {
    /// Load `<home>/config.toml`, or defaults if the file does not exist.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Database file to open. An explicit override wins over the config.
    pub fn database_path(&self, home: &Path, explicit: Option<&Path>) -> PathBuf {
        match explicit.or(self.database_path.as_deref()) {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => home.join(path),
            None => home.join(DEFAULT_DATABASE_FILE),
        }
    }
}
