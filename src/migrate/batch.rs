use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::migrate::RunOptions;
use crate::migrate::catalog::LegacyCatalog;
use crate::migrate::task::TaskMigrator;
use crate::model::{RowOutcome, SkipReason};
use crate::store::legacy::LegacySource;
use crate::store::target::TargetStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub seen: usize,
    pub created: usize,
    pub skipped: usize,
    pub payment_rows: usize,
    pub missing_dynamic: usize,
    pub missing_list: usize,
    pub missing_space: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.seen += 1;
        match outcome {
            RowOutcome::Created {
                payments,
                missing_dynamic,
                ..
            } => {
                self.created += 1;
                self.payment_rows += payments;
                self.missing_dynamic += usize::from(*missing_dynamic);
            }
            RowOutcome::SkippedDuplicate {
                payments,
                missing_dynamic,
                ..
            } => {
                self.skipped += 1;
                self.payment_rows += payments;
                self.missing_dynamic += usize::from(*missing_dynamic);
            }
            RowOutcome::SkippedMissingReference(reason) => {
                self.skipped += 1;
                match reason {
                    SkipReason::MissingList => self.missing_list += 1,
                    SkipReason::MissingSpace => self.missing_space += 1,
                }
            }
            RowOutcome::Failed(_) => self.errors += 1,
        }
    }

    /// Metric rows in display order.
    pub fn rows(&self) -> [(&'static str, usize); 8] {
        [
            ("seen", self.seen),
            ("created", self.created),
            ("skipped", self.skipped),
            ("payment_rows", self.payment_rows),
            ("missing_dynamic", self.missing_dynamic),
            ("missing_list", self.missing_list),
            ("missing_space", self.missing_space),
            ("errors", self.errors),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub task_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub stats: RunStats,
    pub failures: Vec<RowFailure>,
}

impl RunReport {
    fn record(&mut self, task_id: i64, outcome: RowOutcome) {
        self.stats.record(&outcome);
        if let RowOutcome::Failed(message) = outcome {
            self.failures.push(RowFailure { task_id, message });
        }
    }
}

/// Stream legacy tasks in id order and migrate each one.
///
/// Per-row problems are counted in the report. The run only stops early on
/// a fatal error: a missing required legacy table or, outside dry runs, a
/// target store without any user to own services.
pub fn run_migration(
    legacy: &dyn LegacySource,
    target: &dyn TargetStore,
    options: &RunOptions,
) -> Result<RunReport> {
    let catalog = LegacyCatalog::load(legacy)?;
    let mut migrator = TaskMigrator::new(legacy, target, &catalog, options);
    let mut report = RunReport {
        dry_run: options.dry_run,
        stats: RunStats::default(),
        failures: Vec::new(),
    };

    let chunk_size = options.chunk_size.max(1);
    let mut after: Option<Value> = None;
    loop {
        let remaining = options
            .limit
            .map(|limit| limit.saturating_sub(report.stats.seen));
        if remaining == Some(0) {
            break;
        }
        let batch = remaining.map_or(chunk_size, |left| left.min(chunk_size));

        let rows = legacy.tasks_after(options.filter, after.as_ref(), batch)?;
        debug!(after = ?after, rows = rows.len(), "fetched task chunk");
        let Some(last) = rows.last() else {
            break;
        };
        if after.as_ref() == Some(&last.raw_id) {
            warn!(after = ?after, "task cursor did not advance; stopping");
            break;
        }
        after = Some(last.raw_id.clone());
        let exhausted = rows.len() < batch;

        for row in rows {
            let task = match row.task {
                Ok(task) => task,
                Err(err) => {
                    let task_id = row.raw_id.as_i64().unwrap_or_default();
                    let message = format!("unreadable task row {}: {err}", row.raw_id);
                    error!(raw_id = %row.raw_id, %message, "task failed");
                    report.record(task_id, RowOutcome::Failed(message));
                    continue;
                }
            };
            let outcome = migrator.migrate(&task)?;
            match &outcome {
                RowOutcome::SkippedMissingReference(reason) => {
                    warn!(task_id = task.id, %reason, "skipped task");
                }
                RowOutcome::SkippedDuplicate {
                    application_number,
                    payments,
                    ..
                } => {
                    warn!(
                        task_id = task.id,
                        reason = "duplicate application number",
                        %application_number,
                        payments,
                        "skipped task"
                    );
                }
                RowOutcome::Failed(message) => {
                    error!(task_id = task.id, %message, "task failed");
                }
                RowOutcome::Created { .. } => {}
            }
            report.record(task.id, outcome);
        }

        info!(after = ?after, seen = report.stats.seen, "processed chunk");
        if exhausted {
            break;
        }
    }

    info!(
        dry_run = report.dry_run,
        seen = report.stats.seen,
        created = report.stats.created,
        skipped = report.stats.skipped,
        errors = report.stats.errors,
        "migration finished"
    );
    Ok(report)
}
