//! DataPantry command line
//!
//! Table lifecycle and schema migrations for a DataPantry SQLite database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datapantry::PantryConfig;
use datapantry_logging::{init_logging, pantry_home, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::migrate::MigrateArgs;
use cli::position::PositionAction;
use cli::Session;

#[derive(Parser, Debug)]
#[command(name = "datapantry", version, about = "Schema evolution for DataPantry tables")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Database file (overrides config.toml)
    #[arg(long, global = true, env = "DATAPANTRY_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List user tables
    Tables,

    /// Create an empty table with the default `id` column
    CreateTable { name: String },

    /// Drop a table with its metadata and layout records
    DropTable {
        name: String,

        /// Drop even if the table holds rows
        #[arg(long)]
        force: bool,
    },

    /// Show the columns and row count of a table
    Describe { table: String },

    /// Show what discarding a table's data would lose
    Impact { table: String },

    /// Rebuild a table to a new column list
    Migrate(MigrateArgs),

    /// Manage designer canvas positions
    Position {
        #[command(subcommand)]
        action: PositionAction,
    },

    /// Show resolved paths and settings
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let home = pantry_home();
    let config = PantryConfig::load(&home)?;

    let mut log_config = LogConfig::new("datapantry");
    log_config.verbose = cli.verbose;
    log_config.filter = config.log_filter.as_deref();
    log_config.log_dir = Some(home.join("logs"));
    if let Err(err) = init_logging(log_config) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    let database = config.database_path(&home, cli.database.as_deref());
    let session = Session {
        home,
        config,
        database,
        json: cli.json,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Tables => cli::table::list_tables(&session).await,
            Commands::CreateTable { name } => cli::table::create_table(&session, &name).await,
            Commands::DropTable { name, force } => {
                cli::table::drop_table(&session, &name, force).await
            }
            Commands::Describe { table } => cli::table::describe(&session, &table).await,
            Commands::Impact { table } => cli::table::impact(&session, &table).await,
            Commands::Migrate(args) => cli::migrate::run(&session, args).await,
            Commands::Position { action } => cli::position::run(&session, action).await,
            Commands::Config => cli::config::run(&session),
        }
    })
}
