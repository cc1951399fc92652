//! Position command - designer canvas positions of tables

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_json, print_table};
use crate::cli::Session;
use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum PositionAction {
    /// List recorded positions
    List,
    /// Record the position of a table
    Set {
        table: String,
        #[arg(allow_negative_numbers = true)]
        x: i64,
        #[arg(allow_negative_numbers = true)]
        y: i64,
    },
}

pub async fn run(session: &Session, action: PositionAction) -> anyhow::Result<()> {
    let db = session.open_db().await?;

    match action {
        PositionAction::List => {
            let positions = db.list_positions().await?;
            if session.json {
                return print_json(&positions);
            }
            if positions.is_empty() {
                println!("No positions recorded.");
                return Ok(());
            }
            let rows = positions
                .iter()
                .map(|p| vec![p.table_name.clone(), p.x.to_string(), p.y.to_string()])
                .collect();
            print_table(&["TABLE", "X", "Y"], rows);
            Ok(())
        }
        PositionAction::Set { table, x, y } => {
            if !db.table_exists(&table).await? {
                return Err(HelpfulError::new(format!("Table not found: {}", table))
                    .with_suggestion("TRY: List existing tables: datapantry tables")
                    .into());
            }
            db.upsert_position(&table, x, y).await?;
            if session.json {
                return print_json(&serde_json::json!({ "tableName": table, "x": x, "y": y }));
            }
            println!("Placed '{}' at ({}, {})", table, x, y);
            Ok(())
        }
    }
}
