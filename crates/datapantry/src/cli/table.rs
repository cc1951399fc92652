//! Table lifecycle commands: tables, create-table, drop-table, describe, impact.

use crate::cli::error::HelpfulError;
use crate::cli::output::{column_rows, data_rows, print_json, print_table, COLUMN_HEADERS};
use crate::cli::Session;
use datapantry_schema::TableImpact;
use tracing::info;

pub async fn list_tables(session: &Session) -> anyhow::Result<()> {
    let migrator = session.migrator().await?;
    let tables = migrator.list_tables().await.map_err(HelpfulError::from)?;

    if session.json {
        return print_json(&serde_json::json!({ "tables": tables }));
    }

    if tables.is_empty() {
        println!("No tables yet.");
        println!();
        println!("Create one with:");
        println!("  datapantry create-table people");
        return Ok(());
    }

    for table in &tables {
        println!("{}", table);
    }
    println!();
    println!("{} tables", tables.len());
    Ok(())
}

pub async fn create_table(session: &Session, name: &str) -> anyhow::Result<()> {
    let migrator = session.migrator().await?;
    let columns = migrator
        .create_table(name)
        .await
        .map_err(HelpfulError::from)?;
    let name = name.trim();

    if session.json {
        return print_json(&serde_json::json!({ "table": name, "columns": columns }));
    }
    println!("Created table '{}'", name);
    print_table(&COLUMN_HEADERS, column_rows(&columns));
    Ok(())
}

pub async fn drop_table(session: &Session, name: &str, force: bool) -> anyhow::Result<()> {
    let migrator = session.migrator().await?;
    let impact = migrator.table_impact(name).await.map_err(HelpfulError::from)?;

    if impact.row_count > 0 && !force {
        return Err(HelpfulError::new(format!(
            "Table '{}' holds {} rows",
            name, impact.row_count
        ))
        .with_context("Dropping it discards every row")
        .with_suggestion(format!("TRY: Inspect the rows first: datapantry impact {}", name))
        .with_suggestion(format!("TRY: Drop anyway: datapantry drop-table {} --force", name))
        .into());
    }

    migrator.drop_table(name).await.map_err(HelpfulError::from)?;
    info!(table = name, rows = impact.row_count, "Dropped from CLI");

    if session.json {
        return print_json(&serde_json::json!({
            "dropped": name,
            "rowsDiscarded": impact.row_count,
        }));
    }
    println!("Dropped table '{}' ({} rows discarded)", name, impact.row_count);
    Ok(())
}

pub async fn describe(session: &Session, name: &str) -> anyhow::Result<()> {
    let migrator = session.migrator().await?;
    let description = migrator
        .describe_table(name)
        .await
        .map_err(HelpfulError::from)?;

    if session.json {
        return print_json(&description);
    }
    println!("TABLE {} ({} rows)", description.name, description.row_count);
    print_table(&COLUMN_HEADERS, column_rows(&description.columns));
    Ok(())
}

pub async fn impact(session: &Session, name: &str) -> anyhow::Result<()> {
    let migrator = session.migrator().await?;
    let impact = migrator.table_impact(name).await.map_err(HelpfulError::from)?;

    if session.json {
        return print_json(&impact);
    }
    print_impact(&impact);
    Ok(())
}

pub fn print_impact(impact: &TableImpact) {
    println!(
        "Discarding the data of '{}' loses {} rows",
        impact.table, impact.row_count
    );
    if impact.sample.is_empty() {
        return;
    }
    let headers: Vec<String> = impact.sample[0].keys().map(str::to_string).collect();
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    print_table(&header_refs, data_rows(&headers, &impact.sample));
    if impact.row_count > impact.sample.len() as u64 {
        println!("... and {} more", impact.row_count - impact.sample.len() as u64);
    }
}
