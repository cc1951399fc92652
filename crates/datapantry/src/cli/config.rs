//! Config command - show resolved paths and settings

use crate::cli::output::print_json;
use crate::cli::Session;
use datapantry::config::CONFIG_FILE;

pub fn run(session: &Session) -> anyhow::Result<()> {
    let config_path = session.home.join(CONFIG_FILE);

    if session.json {
        return print_json(&serde_json::json!({
            "home": session.home.to_string_lossy(),
            "config": {
                "path": config_path.to_string_lossy(),
                "exists": config_path.exists(),
            },
            "database": {
                "path": session.database.to_string_lossy(),
                "exists": session.database.exists(),
            },
            "maxConnections": session.config.max_connections,
            "preserveDataDefault": session.config.preserve_data_default,
            "logFilter": session.config.log_filter,
        }));
    }

    let exists = |present: bool| if present { "" } else { " (not created yet)" };
    println!("DataPantry configuration");
    println!();
    println!("  home:      {}", session.home.display());
    println!(
        "  config:    {}{}",
        config_path.display(),
        exists(config_path.exists())
    );
    println!(
        "  database:  {}{}",
        session.database.display(),
        exists(session.database.exists())
    );
    println!("  max connections:       {}", session.config.max_connections);
    println!(
        "  preserve data default: {}",
        session.config.preserve_data_default
    );
    if let Some(filter) = &session.config.log_filter {
        println!("  log filter:            {}", filter);
    }
    Ok(())
}
