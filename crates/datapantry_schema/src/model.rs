//! Logical column model: datatypes, constraints, columns and diff operations.

use crate::error::MigrationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Logical datatype of a user column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
    Time,
    #[serde(alias = "datetime")]
    DateTime,
    #[serde(alias = "foreign key")]
    ForeignKey,
}

impl DataType {
    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::DateTime)
    }

    /// Semantic subtype recorded for types SQLite has no storage class for.
    pub fn subtype(self) -> Option<SubtypeTag> {
        match self {
            DataType::Boolean => Some(SubtypeTag::Boolean),
            DataType::Date => Some(SubtypeTag::Date),
            DataType::Time => Some(SubtypeTag::Time),
            DataType::DateTime => Some(SubtypeTag::DateTime),
            DataType::String | DataType::Number | DataType::ForeignKey => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::DateTime => "datetime",
            DataType::ForeignKey => "foreign key",
        };
        f.write_str(name)
    }
}

/// Tag stored in the subtype metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtypeTag {
    Date,
    Time,
    DateTime,
    Boolean,
}

impl SubtypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SubtypeTag::Date => "DATE",
            SubtypeTag::Time => "TIME",
            SubtypeTag::DateTime => "DATETIME",
            SubtypeTag::Boolean => "BOOLEAN",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "DATE" => Some(SubtypeTag::Date),
            "TIME" => Some(SubtypeTag::Time),
            "DATETIME" => Some(SubtypeTag::DateTime),
            "BOOLEAN" => Some(SubtypeTag::Boolean),
            _ => None,
        }
    }

    pub fn datatype(self) -> DataType {
        match self {
            SubtypeTag::Date => DataType::Date,
            SubtypeTag::Time => DataType::Time,
            SubtypeTag::DateTime => DataType::DateTime,
            SubtypeTag::Boolean => DataType::Boolean,
        }
    }
}

/// Key constraint on a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    #[default]
    None,
    Primary,
    Unique,
}

impl Constraint {
    /// Primary and unique both demand distinct values.
    pub fn is_keyed(self) -> bool {
        matches!(self, Constraint::Primary | Constraint::Unique)
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    pub target_table: String,
    pub target_column: String,
}

/// A user column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    #[serde(default)]
    pub constraint: Constraint,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            constraint: Constraint::None,
            is_required: false,
            foreign_key: None,
        }
    }

    /// A ForeignKey column pointing at `table.column`.
    pub fn reference(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            foreign_key: Some(ForeignKeyRef {
                target_table: table.into(),
                target_column: column.into(),
            }),
            ..Self::new(name, DataType::ForeignKey)
        }
    }

    pub fn primary(mut self) -> Self {
        self.constraint = Constraint::Primary;
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraint = Constraint::Unique;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// The default primary column every new table starts with.
    pub fn default_id() -> Self {
        Self::new("id", DataType::Number).primary()
    }

    /// Check the column on its own: name present, foreign key iff ForeignKey.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.name.trim().is_empty() {
            return Err(MigrationError::InvalidColumnSpec(
                "column name must not be empty".to_string(),
            ));
        }
        match (&self.datatype, &self.foreign_key) {
            (DataType::ForeignKey, None) => Err(MigrationError::InvalidColumnSpec(format!(
                "foreign key column '{}' has no target",
                self.name
            ))),
            (DataType::ForeignKey, Some(fk))
                if fk.target_table.trim().is_empty() || fk.target_column.trim().is_empty() =>
            {
                Err(MigrationError::InvalidColumnSpec(format!(
                    "foreign key column '{}' has an incomplete target",
                    self.name
                )))
            }
            (DataType::ForeignKey, Some(_)) => Ok(()),
            (other, Some(_)) => Err(MigrationError::InvalidColumnSpec(format!(
                "column '{}' of type {} cannot carry a foreign key",
                self.name, other
            ))),
            (_, None) => Ok(()),
        }
    }
}

/// Validate a complete column list for one table.
///
/// Fails on the first column that is invalid on its own, on duplicate names,
/// and on more than one primary column.
pub fn validate_columns(columns: &[Column]) -> Result<(), MigrationError> {
    if columns.is_empty() {
        return Err(MigrationError::InvalidColumnSpec(
            "a table needs at least one column".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut primary: Option<&str> = None;
    for column in columns {
        column.validate()?;
        if !seen.insert(column.name.as_str()) {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
        if column.constraint == Constraint::Primary {
            if let Some(first) = primary {
                return Err(MigrationError::InvalidColumnSpec(format!(
                    "more than one primary column ('{}' and '{}')",
                    first, column.name
                )));
            }
            primary = Some(column.name.as_str());
        }
    }
    Ok(())
}

/// One named change between an old and a new column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiffOp {
    Delete {
        name: String,
    },
    Rename {
        #[serde(rename = "oldName")]
        from: String,
        #[serde(rename = "newName")]
        to: String,
    },
    /// Retype addresses the column by its post-rename name.
    #[serde(alias = "datatype")]
    Retype {
        name: String,
        #[serde(rename = "oldType")]
        from: DataType,
        #[serde(rename = "newType")]
        to: DataType,
    },
    Add {
        name: String,
        datatype: DataType,
        #[serde(rename = "isRequired", default)]
        is_required: bool,
    },
    #[serde(alias = "constraint")]
    ConstraintChange {
        name: String,
        constraint: Constraint,
    },
    #[serde(alias = "isRequired")]
    RequiredChange {
        name: String,
        #[serde(rename = "isRequired")]
        is_required: bool,
    },
}

impl std::fmt::Display for DiffOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffOp::Delete { name } => write!(f, "Delete column '{}'", name),
            DiffOp::Rename { from, to } => write!(f, "Rename column '{}' to '{}'", from, to),
            DiffOp::Retype { name, from, to } => {
                write!(f, "Change '{}' from {} to {}", name, from, to)
            }
            DiffOp::Add {
                name,
                datatype,
                is_required,
            } => {
                let required = if *is_required { " (required)" } else { "" };
                write!(f, "Add column '{}' ({}){}", name, datatype, required)
            }
            DiffOp::ConstraintChange { name, constraint } => {
                write!(f, "Set constraint of '{}' to {:?}", name, constraint)
            }
            DiffOp::RequiredChange { name, is_required } => {
                let state = if *is_required { "required" } else { "optional" };
                write!(f, "Make '{}' {}", name, state)
            }
        }
    }
}
