use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::migrate::RunReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

/// What `migrate` prints: the run report plus where it ran.
#[derive(Debug, Clone, Serialize)]
pub struct MigrateSummary {
    pub connection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<&'static str>,
    #[serde(flatten)]
    pub report: RunReport,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn print_migrate_summary(summary: &MigrateSummary, format: Format) -> Result<()> {
    let report = &summary.report;
    match format {
        Format::Json => print_json(summary)?,
        Format::Pretty => {
            println!("{:<18} {:>8}", "metric".bold(), "count".bold());
            println!("{}", "-".repeat(27));
            for (label, count) in report.stats.rows() {
                let value = count.to_string();
                let value = match label {
                    "created" if count > 0 => value.green().to_string(),
                    "errors" if count > 0 => value.red().bold().to_string(),
                    "skipped" | "missing_list" | "missing_space" | "missing_dynamic"
                        if count > 0 =>
                    {
                        value.yellow().to_string()
                    }
                    _ => value,
                };
                println!("{label:<18} {value:>8}");
            }

            if !report.failures.is_empty() {
                println!();
                println!("{}", "failures".red().bold());
                for failure in &report.failures {
                    println!("  task {}: {}", failure.task_id, failure.message);
                }
            }

            println!();
            if report.dry_run {
                println!(
                    "{} from '{}'; nothing was written",
                    "Dry run complete".cyan().bold(),
                    summary.connection
                );
            } else {
                println!(
                    "{} from '{}'",
                    "Migration complete".green().bold(),
                    summary.connection
                );
            }
        }
        Format::Minimal => {
            let pairs: Vec<String> = report
                .stats
                .rows()
                .iter()
                .map(|(label, count)| format!("{label}={count}"))
                .collect();
            let mode = if report.dry_run { "dry-run" } else { "migrated" };
            println!("{mode} {}", pairs.join(" "));
        }
    }
    Ok(())
}
