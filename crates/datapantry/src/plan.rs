//! JSON migration plans for `datapantry migrate`.
//!
//! ```json
//! {
//!   "newTableName": "staff",
//!   "columns": [{ "name": "id", "datatype": "number", "constraint": "primary" }],
//!   "renames": [{ "from": "full_name", "to": "name" }],
//!   "preserveData": true
//! }
//! ```
//!
//! `columnChanges` may list the diff operations explicitly. Without it they
//! are derived from the table's current columns plus `renames`.

use anyhow::{Context, Result};
use datapantry_schema::{diff_columns, Column, DiffOp, MigrationError, MigrationRequest};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenamePair {
    #[serde(alias = "oldName")]
    pub from: String,
    #[serde(alias = "newName")]
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MigrationPlan {
    #[serde(default)]
    pub new_table_name: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub column_changes: Option<Vec<DiffOp>>,
    #[serde(default)]
    pub renames: Vec<RenamePair>,
    #[serde(default)]
    pub preserve_data: Option<bool>,
}

impl MigrationPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid migration plan")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read migration plan {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("In {}", path.display()))
    }

    /// Turn the plan into a request against `table`.
    ///
    /// `current` is the table's current column list; it is only consulted when
    /// the plan does not list its changes.
    pub fn into_request(
        self,
        table: &str,
        current: &[Column],
        preserve_default: bool,
    ) -> std::result::Result<MigrationRequest, MigrationError> {
        let ops = match self.column_changes {
            Some(ops) => ops,
            None => {
                let renames: Vec<(String, String)> =
                    self.renames.into_iter().map(|r| (r.from, r.to)).collect();
                diff_columns(current, &self.columns, &renames)?
            }
        };

        let mut request = MigrationRequest::new(
            table,
            self.columns,
            ops,
            self.preserve_data.unwrap_or(preserve_default),
        );
        if let Some(name) = self.new_table_name {
            request = request.rename_to(name);
        }
        Ok(request)
    }
}
