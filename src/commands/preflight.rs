use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::migrate::catalog::{LegacyCatalog, TablePresence, UndiscoveredSpace, table_presence};
use crate::output::{Format, print_json};
use crate::store::legacy::SqliteLegacy;
use crate::store::target::{SqliteTarget, TargetStore};

#[derive(Debug, Serialize)]
struct DynamicTableSummary {
    space_id: i64,
    table: String,
    columns: usize,
}

#[derive(Debug, Serialize)]
struct PreflightReport {
    connection: String,
    tables: Vec<TablePresence>,
    dynamic_tables: Vec<DynamicTableSummary>,
    undiscovered: Vec<UndiscoveredSpace>,
    target_exists: bool,
    target_users: i64,
    owner_user_id: Option<i64>,
    ready: bool,
}

/// Report whether a migration from `connection` could run, then fail with
/// the first missing required table, if any.
pub fn run(config_path: &Path, connection: &str, format: Format) -> Result<()> {
    let config = Config::load(config_path)?;
    let legacy = SqliteLegacy::open(&config.connection(connection)?.path)?;

    let tables = table_presence(&legacy)?;
    let missing = tables
        .iter()
        .find(|table| table.required && !table.present)
        .map(|table| table.table.clone());

    let (dynamic_tables, undiscovered) = if missing.is_none() {
        let catalog = LegacyCatalog::load(&legacy)?;
        let dynamic: Vec<DynamicTableSummary> = catalog
            .dynamic_tables()
            .into_iter()
            .map(|table| DynamicTableSummary {
                space_id: table.space_id,
                table: table.name.clone(),
                columns: table.columns.len(),
            })
            .collect();
        (dynamic, catalog.undiscovered().to_vec())
    } else {
        (Vec::new(), Vec::new())
    };

    let target_exists = config.target.path.exists();
    let (target_users, owner_user_id) = if target_exists {
        let target = SqliteTarget::open(&config.target.path)?;
        (target.user_count()?, target.owner_user_id()?)
    } else {
        (0, None)
    };

    let report = PreflightReport {
        connection: connection.to_string(),
        tables,
        dynamic_tables,
        undiscovered,
        target_exists,
        target_users,
        owner_user_id,
        ready: missing.is_none() && owner_user_id.is_some(),
    };
    print_report(&report, format)?;

    match missing {
        Some(table) => Err(MigrateError::MissingLegacyTable(table)),
        None => Ok(()),
    }
}

fn print_report(report: &PreflightReport, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(report)?,
        Format::Pretty => {
            println!("{}", "Legacy tables".bold());
            for table in &report.tables {
                let prefix = match (table.present, table.required) {
                    (true, _) => " ok ".green().to_string(),
                    (false, false) => "warn".yellow().to_string(),
                    (false, true) => " ERR".red().bold().to_string(),
                };
                println!("  {prefix}  {}", table.table);
            }

            println!();
            println!("{}", "Dynamic tables".bold());
            for table in &report.dynamic_tables {
                println!(
                    "  {}  space {} -> {} ({} columns)",
                    " ok ".green(),
                    table.space_id,
                    table.table,
                    table.columns
                );
            }
            for space in &report.undiscovered {
                println!(
                    "  {}  space {} -> {}: {}",
                    "warn".yellow(),
                    space.space_id,
                    space.table.as_deref().unwrap_or("-"),
                    space.reason
                );
            }

            println!();
            println!("{}", "Target".bold());
            match report.owner_user_id {
                Some(id) => println!(
                    "  {}  {} users, services owned by user {id}",
                    " ok ".green(),
                    report.target_users
                ),
                None => println!(
                    "  {}  no users; run `tasklift init --owner-email` or add one",
                    " ERR".red().bold()
                ),
            }
        }
        Format::Minimal => {
            let missing = report
                .tables
                .iter()
                .filter(|table| table.required && !table.present)
                .count();
            println!(
                "ready={} missing_tables={} dynamic_tables={} undiscovered={} target_users={}",
                report.ready,
                missing,
                report.dynamic_tables.len(),
                report.undiscovered.len(),
                report.target_users
            );
        }
    }
    Ok(())
}
