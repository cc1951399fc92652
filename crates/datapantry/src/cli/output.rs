//! Output formatting for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use datapantry_schema::{Column, Constraint, Row, Value};
use serde::Serialize;

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{table}");
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cell text; null is shown as `NULL` so it differs from an empty string.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.render(),
    }
}

fn format_constraint(constraint: Constraint) -> &'static str {
    match constraint {
        Constraint::None => "",
        Constraint::Primary => "primary",
        Constraint::Unique => "unique",
    }
}

pub fn column_rows(columns: &[Column]) -> Vec<Vec<String>> {
    columns
        .iter()
        .map(|c| {
            let references = c
                .foreign_key
                .as_ref()
                .map(|fk| format!("{}.{}", fk.target_table, fk.target_column))
                .unwrap_or_default();
            vec![
                c.name.clone(),
                c.datatype.to_string(),
                format_constraint(c.constraint).to_string(),
                if c.is_required { "yes" } else { "" }.to_string(),
                references,
            ]
        })
        .collect()
}

pub const COLUMN_HEADERS: [&str; 5] = ["COLUMN", "TYPE", "CONSTRAINT", "REQUIRED", "REFERENCES"];

/// Rows as table cells under the given headers.
pub fn data_rows(headers: &[String], rows: &[Row]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(format_value).unwrap_or_default())
                .collect()
        })
        .collect()
}
