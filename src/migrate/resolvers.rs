//! Memoizing legacy-id -> target-id resolution, scoped to one run.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::model::{LegacyList, LegacyPerson, LegacyStatus, NewUser, UserRole};
use crate::normalize::{parse_csv_ids, slugify};
use crate::store::legacy::LegacySource;
use crate::store::target::TargetStore;

pub const DEFAULT_STATUS_COLOR: &str = "gray";
pub const DEFAULT_STAGE_COLOR: &str = "gray";

/// First id handed out per entity kind during a dry run.
pub const PLACEHOLDER_BASE: i64 = 900_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    ApplicationType,
    ApplicationStatus,
    Service,
    ServiceStage,
    ClientUser,
    StaffUser,
}

/// Kind-scoped counters standing in for target ids when nothing is written.
#[derive(Debug, Default)]
pub struct PlaceholderIds {
    next: HashMap<EntityKind, i64>,
}

impl PlaceholderIds {
    pub fn allocate(&mut self, kind: EntityKind) -> i64 {
        let slot = self.next.entry(kind).or_insert(PLACEHOLDER_BASE);
        let id = *slot;
        *slot += 1;
        id
    }
}

/// Per-run caches shared by every resolver call.
#[derive(Debug, Default)]
pub struct RunContext {
    dry_run: bool,
    placeholders: PlaceholderIds,
    owner_id: Option<i64>,
    application_types: HashMap<i64, i64>,
    statuses: HashMap<i64, i64>,
    services: HashMap<(i64, String), i64>,
    stages: HashMap<(i64, String), i64>,
    clients: HashMap<i64, i64>,
    staff: HashMap<i64, i64>,
    synced_types: HashSet<i64>,
}

impl RunContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn schema_synced(&self, application_type_id: i64) -> bool {
        self.synced_types.contains(&application_type_id)
    }

    /// Record a completed schema sync. A sync that failed is not marked, so
    /// the next task of the same type tries again.
    pub fn mark_schema_synced(&mut self, application_type_id: i64) {
        self.synced_types.insert(application_type_id);
    }

    pub fn application_type(&mut self, target: &dyn TargetStore, list: &LegacyList) -> Result<i64> {
        if let Some(id) = self.application_types.get(&list.id) {
            return Ok(*id);
        }

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::ApplicationType)
        } else {
            let name = list.display_name();
            let slug = slugify(&name);
            match target.find_application_type(&slug)? {
                Some(id) => id,
                None => {
                    let id = target.create_application_type(&name, &slug)?;
                    debug!(list_id = list.id, application_type_id = id, %slug, "created application type");
                    id
                }
            }
        };

        self.application_types.insert(list.id, id);
        Ok(id)
    }

    pub fn application_status(
        &mut self,
        target: &dyn TargetStore,
        status: &LegacyStatus,
    ) -> Result<i64> {
        if let Some(id) = self.statuses.get(&status.id) {
            return Ok(*id);
        }

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::ApplicationStatus)
        } else {
            let name = status.display_name();
            let slug = slugify(&name);
            match target.find_status(&slug)? {
                Some(id) => id,
                None => {
                    let id = target.create_status(&name, &slug, DEFAULT_STATUS_COLOR, true)?;
                    debug!(status_id = status.id, application_status_id = id, %slug, "created application status");
                    id
                }
            }
        };

        self.statuses.insert(status.id, id);
        Ok(id)
    }

    /// Services belong to the lowest-id target user; a store with no users
    /// cannot host them and aborts the run.
    pub fn service(
        &mut self,
        target: &dyn TargetStore,
        space_id: i64,
        list: &LegacyList,
    ) -> Result<i64> {
        let name = list.display_name();
        let key = (space_id, name);
        if let Some(id) = self.services.get(&key) {
            return Ok(*id);
        }

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::Service)
        } else {
            let owner_id = self.owner_id(target)?;
            match target.find_service(owner_id, &key.1)? {
                Some(id) => id,
                None => {
                    let id = target.create_service(owner_id, &key.1)?;
                    debug!(space_id, service_id = id, name = %key.1, "created service");
                    id
                }
            }
        };

        self.services.insert(key, id);
        Ok(id)
    }

    pub fn service_stage(
        &mut self,
        target: &dyn TargetStore,
        service_id: i64,
        stage_name: &str,
    ) -> Result<i64> {
        let key = (service_id, stage_name.to_string());
        if let Some(id) = self.stages.get(&key) {
            return Ok(*id);
        }

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::ServiceStage)
        } else {
            match target.find_service_stage(service_id, stage_name)? {
                Some(id) => id,
                None => target.create_service_stage(service_id, stage_name, DEFAULT_STAGE_COLOR, 0)?,
            }
        };

        self.stages.insert(key, id);
        Ok(id)
    }

    /// Client user for a legacy contact; `None` when the contact is unknown.
    pub fn client(
        &mut self,
        legacy: &dyn LegacySource,
        target: &dyn TargetStore,
        contact_id: Option<i64>,
        fallback_name: Option<&str>,
    ) -> Result<Option<i64>> {
        let Some(contact_id) = contact_id else {
            return Ok(None);
        };
        if let Some(id) = self.clients.get(&contact_id) {
            return Ok(Some(*id));
        }
        let Some(contact) = legacy.contact(contact_id)? else {
            return Ok(None);
        };

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::ClientUser)
        } else {
            ensure_user(target, &contact, UserRole::Client, fallback_name)?
        };

        self.clients.insert(contact_id, id);
        Ok(Some(id))
    }

    /// Staff user for the first id of a legacy assignment list.
    pub fn assignee(
        &mut self,
        legacy: &dyn LegacySource,
        target: &dyn TargetStore,
        assign_to: Option<&str>,
    ) -> Result<Option<i64>> {
        let ids = parse_csv_ids(assign_to.unwrap_or_default());
        let Some(staff_id) = ids.first().and_then(|raw| raw.parse::<i64>().ok()) else {
            return Ok(None);
        };
        if let Some(id) = self.staff.get(&staff_id) {
            return Ok(Some(*id));
        }
        let Some(staff) = legacy.staff_user(staff_id)? else {
            return Ok(None);
        };

        let id = if self.dry_run {
            self.placeholders.allocate(EntityKind::StaffUser)
        } else {
            ensure_user(target, &staff, UserRole::Staff, None)?
        };

        self.staff.insert(staff_id, id);
        Ok(Some(id))
    }

    fn owner_id(&mut self, target: &dyn TargetStore) -> Result<i64> {
        if let Some(id) = self.owner_id {
            return Ok(id);
        }
        let id = target.owner_user_id()?.ok_or(MigrateError::NoOwnerUser)?;
        self.owner_id = Some(id);
        Ok(id)
    }
}

/// Placeholder address for legacy people without an email.
pub fn synthesized_email(role: UserRole, legacy_id: i64) -> String {
    let label = match role {
        UserRole::Staff => "staff",
        UserRole::Client | UserRole::Admin => "contact",
    };
    format!("legacy-{label}-{legacy_id}@legacy.local")
}

fn ensure_user(
    target: &dyn TargetStore,
    person: &LegacyPerson,
    role: UserRole,
    fallback_name: Option<&str>,
) -> Result<i64> {
    let email = person
        .email
        .clone()
        .unwrap_or_else(|| synthesized_email(role, person.id));
    if let Some(id) = target.find_user_by_email(&email)? {
        return Ok(id);
    }

    let default_name = match role {
        UserRole::Staff => format!("Legacy Staff {}", person.id),
        UserRole::Client | UserRole::Admin => format!("Legacy Client {}", person.id),
    };
    let name = person
        .full_name()
        .or_else(|| fallback_name.map(str::to_string))
        .unwrap_or(default_name);

    let id = target.create_user(&NewUser {
        name,
        email: email.clone(),
        password: Uuid::new_v4().simple().to_string(),
        phone: person.phone.clone(),
        role,
    })?;
    debug!(legacy_id = person.id, user_id = id, %email, %role, "created user");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::fixtures::{legacy_fixture, target_with_owner};
    use crate::store::target::SqliteTarget;

    fn list(id: i64, name: Option<&str>) -> LegacyList {
        LegacyList {
            id,
            name: name.map(str::to_string),
            space_id: Some(1),
        }
    }

    #[test]
    fn placeholders_are_kind_scoped() {
        let mut ids = PlaceholderIds::default();
        assert_eq!(ids.allocate(EntityKind::Service), 900_000);
        assert_eq!(ids.allocate(EntityKind::Service), 900_001);
        assert_eq!(ids.allocate(EntityKind::ClientUser), 900_000);
    }

    #[test]
    fn application_types_are_reused_by_slug_and_memoized() {
        let target = target_with_owner();
        let mut ctx = RunContext::new(false);

        let first = ctx
            .application_type(&target, &list(10, Some("Student Visa")))
            .unwrap();
        let same_slug = ctx
            .application_type(&target, &list(11, Some("student  visa!")))
            .unwrap();
        let again = ctx
            .application_type(&target, &list(10, Some("renamed")))
            .unwrap();

        assert_eq!(first, same_slug);
        assert_eq!(first, again);
        assert_eq!(target.count_rows("application_types").unwrap(), 1);
    }

    #[test]
    fn unnamed_lists_and_statuses_get_legacy_labels() {
        let target = target_with_owner();
        let mut ctx = RunContext::new(false);

        ctx.application_type(&target, &list(42, None)).unwrap();
        assert!(target.find_application_type("legacy-list-42").unwrap().is_some());

        let status = LegacyStatus {
            id: 7,
            name: None,
            list_id: None,
        };
        let id = ctx.application_status(&target, &status).unwrap();
        assert_eq!(target.find_status("legacy-status-7").unwrap(), Some(id));
    }

    #[test]
    fn services_require_an_owner_user() {
        let target = SqliteTarget::open_memory().unwrap();
        let mut ctx = RunContext::new(false);

        let err = ctx
            .service(&target, 1, &list(10, Some("Student Visa")))
            .unwrap_err();
        assert!(matches!(err, MigrateError::NoOwnerUser));
        assert!(err.is_fatal());
    }

    #[test]
    fn stages_are_keyed_by_service_and_name() {
        let target = target_with_owner();
        let mut ctx = RunContext::new(false);
        let service = ctx
            .service(&target, 1, &list(10, Some("Student Visa")))
            .unwrap();

        let review = ctx.service_stage(&target, service, "In Review").unwrap();
        let review_again = ctx.service_stage(&target, service, "In Review").unwrap();
        let approved = ctx.service_stage(&target, service, "Approved").unwrap();

        assert_eq!(review, review_again);
        assert_ne!(review, approved);
        assert_eq!(target.count_rows("service_stages").unwrap(), 2);
    }

    #[test]
    fn clients_dedupe_by_email_and_synthesize_missing_ones() {
        let legacy = legacy_fixture();
        let target = target_with_owner();
        let mut ctx = RunContext::new(false);

        let ada = ctx.client(&legacy, &target, Some(500), None).unwrap().unwrap();
        assert_eq!(target.find_user_by_email("ada@example.com").unwrap(), Some(ada));

        let anonymous = ctx
            .client(&legacy, &target, Some(501), Some("Walk-in Client"))
            .unwrap()
            .unwrap();
        assert_eq!(
            target
                .find_user_by_email("legacy-contact-501@legacy.local")
                .unwrap(),
            Some(anonymous)
        );
        let name: String = target
            .connection()
            .query_row("SELECT name FROM users WHERE id = ?1", [anonymous], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "Walk-in Client");

        assert_eq!(ctx.client(&legacy, &target, Some(404), None).unwrap(), None);
        assert_eq!(ctx.client(&legacy, &target, None, None).unwrap(), None);

        // A fresh run finds the users it created earlier instead of duplicating them.
        let mut rerun = RunContext::new(false);
        assert_eq!(
            rerun.client(&legacy, &target, Some(501), None).unwrap(),
            Some(anonymous)
        );
        assert_eq!(target.user_count().unwrap(), 3);
    }

    #[test]
    fn assignee_uses_first_parsed_staff_id() {
        let legacy = legacy_fixture();
        let target = target_with_owner();
        let mut ctx = RunContext::new(false);

        let sam = ctx
            .assignee(&legacy, &target, Some(" x, 900,901"))
            .unwrap()
            .unwrap();
        assert_eq!(target.find_user_by_email("sam@agency.test").unwrap(), Some(sam));

        assert_eq!(ctx.assignee(&legacy, &target, Some("")).unwrap(), None);
        assert_eq!(ctx.assignee(&legacy, &target, None).unwrap(), None);
        assert_eq!(ctx.assignee(&legacy, &target, Some("404")).unwrap(), None);
    }

    #[test]
    fn dry_run_never_touches_the_target() {
        let legacy = legacy_fixture();
        let target = SqliteTarget::open_memory().unwrap();
        let mut ctx = RunContext::new(true);

        let type_id = ctx
            .application_type(&target, &list(10, Some("Student Visa")))
            .unwrap();
        let service = ctx
            .service(&target, 1, &list(10, Some("Student Visa")))
            .unwrap();
        let client = ctx.client(&legacy, &target, Some(500), None).unwrap();

        assert_eq!(type_id, PLACEHOLDER_BASE);
        assert_eq!(service, PLACEHOLDER_BASE);
        assert_eq!(client, Some(PLACEHOLDER_BASE));
        assert_eq!(target.user_count().unwrap(), 0);
        assert_eq!(target.count_rows("application_types").unwrap(), 0);
    }
}
