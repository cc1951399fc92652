//! Migrate command - apply a JSON migration plan to one table

use crate::cli::error::HelpfulError;
use crate::cli::output::{column_rows, print_json, print_table, COLUMN_HEADERS};
use crate::cli::table::print_impact;
use crate::cli::Session;
use datapantry::MigrationPlan;
use datapantry_schema::{MigrationOutcome, NullReason};
use std::path::PathBuf;

#[derive(Debug, Clone, clap::Args)]
pub struct MigrateArgs {
    /// Table to migrate
    pub table: String,

    /// JSON migration plan
    #[arg(long)]
    pub plan: PathBuf,

    /// Show the column changes without applying them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(session: &Session, args: MigrateArgs) -> anyhow::Result<()> {
    let plan = MigrationPlan::from_file(&args.plan)?;
    let migrator = session.migrator().await?;
    let current = migrator
        .describe_table(&args.table)
        .await
        .map_err(HelpfulError::from)?;

    let request = plan
        .into_request(&args.table, &current.columns, session.config.preserve_data_default)
        .map_err(HelpfulError::from)?;

    if args.dry_run {
        if session.json {
            return print_json(&serde_json::json!({
                "table": args.table,
                "request": request,
                "rowsAtRisk": if request.preserve_data { 0 } else { current.row_count },
            }));
        }
        println!("Planned changes for '{}':", args.table);
        if request.ops.is_empty() {
            println!("  (no column changes)");
        }
        for op in &request.ops {
            println!("  {}", op);
        }
        if let Some(name) = &request.new_table_name {
            println!("  Rename table to '{}'", name);
        }
        if !request.preserve_data {
            let impact = migrator
                .table_impact(&args.table)
                .await
                .map_err(HelpfulError::from)?;
            print_impact(&impact);
        }
        return Ok(());
    }

    let outcome = migrator.migrate(request).await.map_err(HelpfulError::from)?;

    if session.json {
        return print_json(&outcome);
    }
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &MigrationOutcome) {
    println!(
        "Migrated '{}': {} rows copied",
        outcome.table, outcome.rows_copied
    );
    print_table(&COLUMN_HEADERS, column_rows(&outcome.final_columns));

    if outcome.referential_integrity_degraded {
        println!();
        println!("WARNING: some references were cleared");
        for nulled in &outcome.report.nulled_references {
            let reason = match nulled.reason {
                NullReason::DuplicateValue => "duplicate value",
                NullReason::DanglingReference => "no matching row",
                NullReason::UnreadableReference => "referenced table unreadable",
            };
            println!("  {}: {} values ({})", nulled.column, nulled.count, reason);
        }
    }
}
