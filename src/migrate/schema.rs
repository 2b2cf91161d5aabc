//! Form-field schema derived from a space's legacy field definitions.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::migrate::catalog::LegacyCatalog;
use crate::migrate::resolvers::RunContext;
use crate::model::{FieldKind, LegacyChild, LegacyField, NewFormField};
use crate::normalize::{humanize_key, normalize_field_key, resolve_unique_name};
use crate::store::legacy::LegacySource;
use crate::store::target::TargetStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub fields: usize,
    pub created_fields: usize,
    pub options: usize,
}

/// Sync the type's form fields from its space, at most once per run.
pub fn sync_space_schema(
    ctx: &mut RunContext,
    legacy: &dyn LegacySource,
    target: &dyn TargetStore,
    catalog: &LegacyCatalog,
    application_type_id: i64,
    space_id: i64,
) -> Result<SyncSummary> {
    if ctx.schema_synced(application_type_id) || ctx.is_dry_run() {
        return Ok(SyncSummary::default());
    }

    let fields = legacy.fields_for_space(space_id)?;
    if fields.is_empty() {
        ctx.mark_schema_synced(application_type_id);
        return Ok(SyncSummary::default());
    }

    let mut options = HashMap::new();
    if catalog.has_child_table() {
        for field in &fields {
            if FieldKind::from_legacy(field.field_type.as_deref()).has_options() {
                options.insert(field.id, legacy.children_for_field(field.id)?);
            }
        }
    }

    let summary = sync_form_fields(target, application_type_id, &fields, &options)?;
    ctx.mark_schema_synced(application_type_id);
    debug!(
        application_type_id,
        space_id,
        fields = summary.fields,
        created = summary.created_fields,
        options = summary.options,
        "synced form fields"
    );
    Ok(summary)
}

/// Attach one form field per legacy field, in display order.
///
/// Names are taken from the normalized column name. A legacy field keeps the
/// name it was given on an earlier run; otherwise the name is suffixed until it
/// clashes with neither an existing form field nor one named earlier in this
/// pass.
pub fn sync_form_fields(
    target: &dyn TargetStore,
    application_type_id: i64,
    fields: &[LegacyField],
    options: &HashMap<i64, Vec<LegacyChild>>,
) -> Result<SyncSummary> {
    let mut used = target.attached_field_names(application_type_id)?;
    used.extend(target.form_field_names()?);

    let mut summary = SyncSummary::default();
    for (index, field) in fields.iter().enumerate() {
        let kind = FieldKind::from_legacy(field.field_type.as_deref());

        let form_field_id = match target.find_form_field_by_legacy_id(field.id)? {
            Some(existing) => {
                used.insert(existing.name);
                existing.id
            }
            None => {
                let source = field
                    .column_name
                    .as_deref()
                    .or(field.name.as_deref())
                    .unwrap_or_default();
                let name = resolve_unique_name(&normalize_field_key(source), &mut used);
                let label = field.name.clone().unwrap_or_else(|| humanize_key(&name));
                summary.created_fields += 1;
                target.create_form_field(&NewFormField {
                    name,
                    label,
                    kind,
                    legacy_field_id: Some(field.id),
                })?
            }
        };

        let is_required = field.assign_to.is_some();
        let display_order = field.field_order.unwrap_or(index as i64);
        target.attach_form_field(application_type_id, form_field_id, is_required, display_order)?;
        summary.fields += 1;

        if !kind.has_options() {
            continue;
        }
        for (position, child) in options.get(&field.id).into_iter().flatten().enumerate() {
            let value = child.id.to_string();
            let label = child.name.clone().unwrap_or_else(|| value.clone());
            let order = child.child_order.unwrap_or(position as i64);
            target.upsert_field_option(form_field_id, &value, &label, order)?;
            summary.options += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::fixtures::{legacy_fixture, target_with_owner};

    fn field(id: i64, order: Option<i64>, kind: &str, name: &str, column: &str) -> LegacyField {
        LegacyField {
            id,
            field_order: order,
            space_id: Some(1),
            field_type: Some(kind.into()),
            name: (!name.is_empty()).then(|| name.to_string()),
            column_name: Some(column.into()),
            assign_to: None,
        }
    }

    fn legacy_id_of(target: &dyn TargetStore, name: &str) -> Option<i64> {
        target
            .find_form_field_by_name(name)
            .unwrap()
            .and_then(|record| record.legacy_field_id)
    }

    #[test]
    fn same_named_fields_from_two_spaces_get_suffixed() {
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();
        let study = target.create_application_type("Study", "study").unwrap();

        sync_form_fields(
            &target,
            visa,
            &[field(1, Some(1), "textarea", "Notes", "notes")],
            &HashMap::new(),
        )
        .unwrap();
        sync_form_fields(
            &target,
            study,
            &[field(4, Some(1), "textarea", "Notes", "notes")],
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(legacy_id_of(&target, "notes"), Some(1));
        assert_eq!(legacy_id_of(&target, "notes_1"), Some(4));
        assert!(target.attached_field_names(visa).unwrap().contains("notes"));
        assert!(target.attached_field_names(study).unwrap().contains("notes_1"));

        let labels: Vec<String> = target
            .connection()
            .prepare("SELECT label FROM form_fields ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(labels, vec!["Notes", "Notes"]);
    }

    #[test]
    fn resync_reuses_names_assigned_earlier() {
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();
        let study = target.create_application_type("Study", "study").unwrap();
        let visa_fields = [field(1, Some(1), "textarea", "Notes", "notes")];
        let study_fields = [field(4, Some(1), "textarea", "Notes", "notes")];

        for _ in 0..2 {
            sync_form_fields(&target, visa, &visa_fields, &HashMap::new()).unwrap();
            let summary =
                sync_form_fields(&target, study, &study_fields, &HashMap::new()).unwrap();
            assert_eq!(summary.fields, 1);
        }

        assert_eq!(target.count_rows("form_fields").unwrap(), 2);
        assert_eq!(target.count_rows("application_type_form_field").unwrap(), 2);
        assert!(target.find_form_field_by_name("notes_2").unwrap().is_none());
    }

    #[test]
    fn collisions_within_one_space_are_resolved_in_order() {
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();

        let summary = sync_form_fields(
            &target,
            visa,
            &[
                field(1, None, "text", "Full Name", "full name"),
                field(2, None, "text", "", "Full-Name"),
            ],
            &HashMap::new(),
        )
        .unwrap();

        assert_eq!(summary.created_fields, 2);
        let (order, label): (i64, String) = target
            .connection()
            .query_row(
                "SELECT p.display_order, f.label FROM application_type_form_field p
                 JOIN form_fields f ON f.id = p.form_field_id WHERE f.name = 'full_name_1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(order, 1);
        assert_eq!(label, "Full Name 1");
    }

    #[test]
    fn choice_fields_get_options_and_required_flags() {
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();
        let mut dropdown = field(2, Some(2), "Dropdown", "Visa Type", "visa_type");
        dropdown.assign_to = Some("x".into());
        let children = vec![
            LegacyChild {
                id: 11,
                child_order: Some(1),
                name: Some("Tourist".into()),
                field_id: Some(2),
            },
            LegacyChild {
                id: 12,
                child_order: None,
                name: None,
                field_id: Some(2),
            },
        ];
        let options = HashMap::from([(2, children)]);

        let summary = sync_form_fields(&target, visa, &[dropdown.clone()], &options).unwrap();
        assert_eq!(summary.options, 2);
        sync_form_fields(&target, visa, &[dropdown], &options).unwrap();
        assert_eq!(target.count_rows("form_field_options").unwrap(), 2);

        let fallback_label: String = target
            .connection()
            .query_row(
                "SELECT label FROM form_field_options WHERE value = '12'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(fallback_label, "12");

        let (kind, required): (String, bool) = target
            .connection()
            .query_row(
                "SELECT f.field_type, p.is_required FROM form_fields f
                 JOIN application_type_form_field p ON p.form_field_id = f.id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "select");
        assert!(required);
    }

    #[test]
    fn space_sync_runs_once_per_type_and_never_in_dry_run() {
        let legacy = legacy_fixture();
        let catalog = LegacyCatalog::load(&legacy).unwrap();
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();

        let mut dry = RunContext::new(true);
        let summary = sync_space_schema(&mut dry, &legacy, &target, &catalog, visa, 1).unwrap();
        assert_eq!(summary, SyncSummary::default());
        assert_eq!(target.count_rows("form_fields").unwrap(), 0);

        let mut ctx = RunContext::new(false);
        let first = sync_space_schema(&mut ctx, &legacy, &target, &catalog, visa, 1).unwrap();
        assert_eq!(first.fields, 3);
        assert_eq!(first.options, 2);
        let second = sync_space_schema(&mut ctx, &legacy, &target, &catalog, visa, 1).unwrap();
        assert_eq!(second, SyncSummary::default());
    }

    #[test]
    fn failed_space_sync_is_retried_by_the_next_task() {
        let legacy = legacy_fixture();
        let catalog = LegacyCatalog::load(&legacy).unwrap();
        let target = target_with_owner();
        let visa = target.create_application_type("Visa", "visa").unwrap();
        target
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_options BEFORE INSERT ON form_field_options
                 BEGIN SELECT RAISE(ABORT, 'options locked'); END;",
            )
            .unwrap();

        let mut ctx = RunContext::new(false);
        let err = sync_space_schema(&mut ctx, &legacy, &target, &catalog, visa, 1).unwrap_err();
        assert!(err.to_string().contains("options locked"));
        assert!(!ctx.schema_synced(visa));

        target
            .connection()
            .execute_batch("DROP TRIGGER reject_options;")
            .unwrap();
        let retry = sync_space_schema(&mut ctx, &legacy, &target, &catalog, visa, 1).unwrap();
        assert_eq!(retry.fields, 3);
        assert_eq!(retry.options, 2);
        assert!(ctx.schema_synced(visa));
        assert_eq!(target.count_rows("form_field_options").unwrap(), 2);
        assert_eq!(target.attached_field_names(visa).unwrap().len(), 3);
    }
}
