use std::path::Path;

use tracing::info;

use crate::build_info;
use crate::config::Config;
use crate::error::Result;
use crate::migrate::{RunOptions, run_migration};
use crate::output::{Format, MigrateSummary, print_migrate_summary};
use crate::store::legacy::{SqliteLegacy, TaskFilter};
use crate::store::target::SqliteTarget;

#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub connection: String,
    pub chunk_size: Option<usize>,
    pub limit: Option<usize>,
    pub list_id: Option<i64>,
    pub task_id: Option<i64>,
    pub dry_run: bool,
    pub skip_payments: bool,
}

pub fn run(config_path: &Path, args: MigrateArgs, format: Format) -> Result<()> {
    let config = Config::load(config_path)?;
    let legacy = SqliteLegacy::open(&config.connection(&args.connection)?.path)?;
    let target = SqliteTarget::open(&config.target.path)?;

    let options = RunOptions {
        dry_run: args.dry_run,
        skip_payments: args.skip_payments,
        chunk_size: args.chunk_size.unwrap_or(config.defaults.chunk_size),
        limit: args.limit,
        filter: TaskFilter {
            list_id: args.list_id,
            task_id: args.task_id,
        },
    };
    info!(
        connection = %args.connection,
        dry_run = options.dry_run,
        chunk_size = options.chunk_size,
        "starting migration"
    );

    let report = run_migration(&legacy, &target, &options)?;
    let summary = MigrateSummary {
        connection: args.connection,
        build: build_info::git_sha(),
        report,
    };
    print_migrate_summary(&summary, format)
}
