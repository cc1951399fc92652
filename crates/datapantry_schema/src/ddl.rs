//! Mapping between logical columns and SQLite column definitions.

use crate::model::{Column, Constraint, DataType, SubtypeTag};
use datapantry_db::{ColumnInfo, PhysicalColumnDef};

/// Type used when a referenced column's declared type is unknown.
pub const FALLBACK_REFERENCE_TYPE: &str = "REAL";

/// SQLite type for a logical datatype.
///
/// `reference_type` is the declared type of the referenced column and only
/// matters for ForeignKey.
pub fn physical_type(datatype: DataType, reference_type: Option<&str>) -> String {
    match datatype {
        DataType::String | DataType::Date | DataType::Time | DataType::DateTime => "TEXT".into(),
        DataType::Number => "REAL".into(),
        DataType::Boolean => "INTEGER".into(),
        DataType::ForeignKey => reference_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_REFERENCE_TYPE)
            .to_string(),
    }
}

/// Physical definition of one logical column.
pub fn physical_column(column: &Column, reference_type: Option<&str>) -> PhysicalColumnDef {
    let mut def = PhysicalColumnDef::new(
        column.name.clone(),
        physical_type(column.datatype, reference_type),
    );
    match column.constraint {
        Constraint::Primary => def = def.primary_key(),
        Constraint::Unique => def = def.unique(),
        Constraint::None => {}
    }
    if column.is_required {
        def = def.not_null();
    }
    if let Some(fk) = &column.foreign_key {
        def = def.references(fk.target_table.clone(), fk.target_column.clone());
    }
    def
}

/// Logical datatype of a physical column that is not a foreign key.
///
/// A recorded subtype wins; otherwise SQLite's affinity rules decide.
pub fn logical_type(info: &ColumnInfo, subtype: Option<SubtypeTag>) -> DataType {
    if let Some(tag) = subtype {
        return tag.datatype();
    }
    let declared = info.declared_type.to_ascii_uppercase();
    let numeric = ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC"];
    if numeric.iter().any(|marker| declared.contains(marker)) {
        DataType::Number
    } else {
        DataType::String
    }
}
