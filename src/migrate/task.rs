use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Result;
use crate::migrate::RunOptions;
use crate::migrate::catalog::LegacyCatalog;
use crate::migrate::resolvers::RunContext;
use crate::migrate::schema::sync_space_schema;
use crate::model::{
    DynamicTable, LegacyList, LegacyTask, NewApplication, NewPayment, RowOutcome, SkipReason,
    TimelineEvent,
};
use crate::normalize::{
    build_form_data, format_datetime, generate_application_number, map_priority, normalize_text,
    parse_csv_ids, parse_csv_tags, parse_legacy_datetime,
};
use crate::store::legacy::LegacySource;
use crate::store::target::TargetStore;

/// Key of the provenance object inside `custom_fields`.
pub const PROVENANCE_KEY: &str = "__legacy";
pub const MIGRATED_EVENT: &str = "migrated";

const CLIENT_NAME_KEYS: [&str; 3] = ["full_name", "client_name", "name"];
const DEFAULT_PAYMENT_METHOD: &str = "legacy";
const PAYMENT_STATUS: &str = "completed";

pub fn payment_reference(legacy_payment_id: i64) -> String {
    format!("legacy-finance-{legacy_payment_id}")
}

/// Migrates one legacy task at a time, carrying resolver caches between calls.
pub struct TaskMigrator<'a> {
    legacy: &'a dyn LegacySource,
    target: &'a dyn TargetStore,
    catalog: &'a LegacyCatalog,
    options: &'a RunOptions,
    ctx: RunContext,
}

impl<'a> TaskMigrator<'a> {
    pub fn new(
        legacy: &'a dyn LegacySource,
        target: &'a dyn TargetStore,
        catalog: &'a LegacyCatalog,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            legacy,
            target,
            catalog,
            options,
            ctx: RunContext::new(options.dry_run),
        }
    }

    /// Run one task to a terminal outcome.
    ///
    /// Only fatal errors come back as `Err`; anything else that goes wrong is
    /// reported as [`RowOutcome::Failed`] so the batch can carry on.
    pub fn migrate(&mut self, task: &LegacyTask) -> Result<RowOutcome> {
        match self.try_migrate(task) {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Ok(RowOutcome::Failed(err.to_string())),
        }
    }

    fn try_migrate(&mut self, task: &LegacyTask) -> Result<RowOutcome> {
        let catalog = self.catalog;
        let Some(list) = catalog.list(task.list_id) else {
            return Ok(RowOutcome::SkippedMissingReference(SkipReason::MissingList));
        };
        let Some(space) = catalog.space(list.space_id) else {
            return Ok(RowOutcome::SkippedMissingReference(SkipReason::MissingSpace));
        };
        let Some(table) = catalog.dynamic_table(space.id) else {
            return Ok(RowOutcome::SkippedMissingReference(SkipReason::MissingSpace));
        };

        let dynamic_row = self.legacy.dynamic_row(table, task.id)?;
        let missing_dynamic = dynamic_row.is_none();
        let form_data = dynamic_row
            .as_ref()
            .map(build_form_data)
            .unwrap_or_default();

        let application_type_id = self.ctx.application_type(self.target, list)?;
        sync_space_schema(
            &mut self.ctx,
            self.legacy,
            self.target,
            catalog,
            application_type_id,
            space.id,
        )?;

        let status = catalog.status(task.status_id);
        let application_status_id = match status {
            Some(status) => Some(self.ctx.application_status(self.target, status)?),
            None => None,
        };
        let service_id = self.ctx.service(self.target, space.id, list)?;
        let service_stage_id = match status {
            Some(status) => Some(
                self.ctx
                    .service_stage(self.target, service_id, &status.display_name())?,
            ),
            None => None,
        };
        let assigned_to = self
            .ctx
            .assignee(self.legacy, self.target, task.assign_to.as_deref())?;
        let fallback_name = client_fallback_name(&form_data);
        let client_id = self.ctx.client(
            self.legacy,
            self.target,
            task.contact_id,
            fallback_name.as_deref(),
        )?;

        let application_number = generate_application_number(&list.display_name(), task.id);
        if let Some(application_id) = self.target.find_application(&application_number)? {
            // An earlier run may have created the application and then failed
            // on its payments; finish those here.
            let payments = if self.ctx.is_dry_run() || self.options.skip_payments {
                0
            } else {
                self.import_payments(application_id, task.id)?
            };
            return Ok(RowOutcome::SkippedDuplicate {
                application_number,
                payments,
                missing_dynamic,
            });
        }

        if self.ctx.is_dry_run() {
            return Ok(RowOutcome::Created {
                application_number,
                payments: 0,
                missing_dynamic,
            });
        }

        let total_fee = task
            .total_fee
            .or_else(|| form_data.get("total_fee").and_then(numeric_value))
            .unwrap_or(0.0);
        let custom_fields = with_provenance(form_data, task, list, table);
        let application = NewApplication {
            application_number: application_number.clone(),
            application_type_id,
            application_status_id,
            assigned_to,
            client_id,
            service_id: Some(service_id),
            service_stage_id,
            custom_fields,
            priority: map_priority(task.priority.as_deref()),
            tags: parse_csv_tags(task.tags.as_deref().unwrap_or_default()),
            notes: task.notes.clone(),
            submitted_at: legacy_date(task, "date_created"),
            due_date: legacy_date(task, "due_date"),
            total_fee,
        };
        let event = migrated_event(task, list, table);
        let application_id = self.target.create_application(&application, &event)?;
        debug!(task_id = task.id, application_id, %application_number, "created application");

        let payments = if self.options.skip_payments {
            0
        } else {
            self.import_payments(application_id, task.id)?
        };

        Ok(RowOutcome::Created {
            application_number,
            payments,
            missing_dynamic,
        })
    }

    /// Import the task's finance rows not yet recorded on the application.
    /// Returns the number of payments written.
    pub fn import_payments(&self, application_id: i64, legacy_task_id: i64) -> Result<usize> {
        if !self.catalog.has_finance_table() {
            return Ok(0);
        }

        let mut fresh = Vec::new();
        for payment in self.legacy.payments_for_task(legacy_task_id)? {
            let reference = payment_reference(payment.id);
            if self.target.payment_exists(application_id, &reference)? {
                continue;
            }
            let paid_at = parse_legacy_datetime(payment.raw.get("transaction_date"))
                .or_else(|| parse_legacy_datetime(payment.raw.get("created_at")))
                .map(format_datetime);
            fresh.push(NewPayment {
                payment_reference: reference,
                amount: payment.amount.unwrap_or(0.0).max(0.0),
                payment_method: payment
                    .payment_method
                    .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
                status: PAYMENT_STATUS.to_string(),
                paid_at,
            });
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let state = self.target.record_payments(application_id, &fresh)?;
        debug!(
            application_id,
            imported = fresh.len(),
            amount_paid = state.amount_paid,
            is_paid = state.is_paid,
            "imported payments"
        );
        Ok(fresh.len())
    }
}

fn client_fallback_name(form_data: &BTreeMap<String, Value>) -> Option<String> {
    CLIENT_NAME_KEYS
        .iter()
        .find_map(|key| normalize_text(form_data.get(*key)))
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn legacy_date(task: &LegacyTask, column: &str) -> Option<String> {
    parse_legacy_datetime(task.raw.get(column)).map(format_datetime)
}

fn with_provenance(
    form_data: BTreeMap<String, Value>,
    task: &LegacyTask,
    list: &LegacyList,
    table: &DynamicTable,
) -> Value {
    let mut fields: Map<String, Value> = form_data.into_iter().collect();
    fields.insert(
        PROVENANCE_KEY.to_string(),
        json!({
            "task_id": task.id,
            "list_id": list.id,
            "space_id": table.space_id,
            "status_id": task.status_id,
            "contact_id": task.contact_id,
            "assignee_ids": parse_csv_ids(task.assign_to.as_deref().unwrap_or_default()),
            "dynamic_table": table.name,
            "migrated_at": Utc::now().to_rfc3339(),
        }),
    );
    Value::Object(fields)
}

fn migrated_event(task: &LegacyTask, list: &LegacyList, table: &DynamicTable) -> TimelineEvent {
    TimelineEvent {
        event_type: MIGRATED_EVENT.to_string(),
        description: format!("Migrated from legacy task #{}", task.id),
        metadata: json!({
            "legacy_task_id": task.id,
            "legacy_list_id": list.id,
            "legacy_space_id": table.space_id,
            "legacy_status_id": task.status_id,
        }),
    }
}
