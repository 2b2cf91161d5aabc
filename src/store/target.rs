use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{MigrateError, Result};
use crate::model::{
    FormFieldRecord, NewApplication, NewFormField, NewPayment, NewUser, PaidState, TimelineEvent,
};

/// Tables owned by the target schema, in creation order.
pub const TARGET_TABLES: [&str; 11] = [
    "users",
    "application_types",
    "form_fields",
    "form_field_options",
    "application_type_form_field",
    "application_statuses",
    "services",
    "service_stages",
    "applications",
    "application_timeline",
    "payments",
];

/// Write side of the migration: create, find-by-unique-key and upsert.
pub trait TargetStore {
    fn user_count(&self) -> Result<i64>;
    /// Lowest-id user, used as owner of bootstrapped services.
    fn owner_user_id(&self) -> Result<Option<i64>>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<i64>>;
    fn create_user(&self, user: &NewUser) -> Result<i64>;

    fn find_application_type(&self, slug: &str) -> Result<Option<i64>>;
    fn create_application_type(&self, name: &str, slug: &str) -> Result<i64>;

    fn find_status(&self, slug: &str) -> Result<Option<i64>>;
    fn create_status(
        &self,
        name: &str,
        slug: &str,
        color: &str,
        visible_to_client: bool,
    ) -> Result<i64>;

    fn find_service(&self, owner_id: i64, name: &str) -> Result<Option<i64>>;
    fn create_service(&self, owner_id: i64, name: &str) -> Result<i64>;
    fn find_service_stage(&self, service_id: i64, name: &str) -> Result<Option<i64>>;
    fn create_service_stage(
        &self,
        service_id: i64,
        name: &str,
        color: &str,
        position: i64,
    ) -> Result<i64>;

    fn form_field_names(&self) -> Result<HashSet<String>>;
    fn attached_field_names(&self, application_type_id: i64) -> Result<HashSet<String>>;
    fn find_form_field_by_legacy_id(
        &self,
        legacy_field_id: i64,
    ) -> Result<Option<FormFieldRecord>>;
    fn find_form_field_by_name(&self, name: &str) -> Result<Option<FormFieldRecord>>;
    fn create_form_field(&self, field: &NewFormField) -> Result<i64>;
    /// Attach a field to a type; attaching again only refreshes the flags.
    fn attach_form_field(
        &self,
        application_type_id: i64,
        form_field_id: i64,
        is_required: bool,
        display_order: i64,
    ) -> Result<()>;
    fn upsert_field_option(
        &self,
        form_field_id: i64,
        value: &str,
        label: &str,
        display_order: i64,
    ) -> Result<()>;

    fn find_application(&self, application_number: &str) -> Result<Option<i64>>;
    /// Insert the application and its timeline event atomically.
    fn create_application(&self, app: &NewApplication, event: &TimelineEvent) -> Result<i64>;

    fn payment_exists(&self, application_id: i64, payment_reference: &str) -> Result<bool>;
    /// Insert payments and recompute the paid state in one transaction.
    fn record_payments(&self, application_id: i64, payments: &[NewPayment]) -> Result<PaidState>;
}

pub struct SqliteTarget {
    conn: Connection,
}

impl SqliteTarget {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let target = Self { conn };
        target.create_tables()?;
        Ok(target)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let target = Self { conn };
        target.create_tables()?;
        Ok(target)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                phone TEXT,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS application_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS form_fields (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                label TEXT NOT NULL,
                field_type TEXT NOT NULL,
                legacy_field_id INTEGER UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS form_field_options (
                id INTEGER PRIMARY KEY,
                form_field_id INTEGER NOT NULL REFERENCES form_fields(id),
                value TEXT NOT NULL,
                label TEXT NOT NULL,
                display_order INTEGER NOT NULL DEFAULT 0,
                UNIQUE (form_field_id, value)
            );
            CREATE TABLE IF NOT EXISTS application_type_form_field (
                application_type_id INTEGER NOT NULL REFERENCES application_types(id),
                form_field_id INTEGER NOT NULL REFERENCES form_fields(id),
                is_required INTEGER NOT NULL DEFAULT 0,
                display_order INTEGER NOT NULL DEFAULT 0,
                section TEXT,
                PRIMARY KEY (application_type_id, form_field_id)
            );
            CREATE TABLE IF NOT EXISTS application_statuses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL,
                visible_to_client INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS services (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, name)
            );
            CREATE TABLE IF NOT EXISTS service_stages (
                id INTEGER PRIMARY KEY,
                service_id INTEGER NOT NULL REFERENCES services(id),
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                UNIQUE (service_id, name)
            );
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY,
                application_number TEXT NOT NULL UNIQUE,
                application_type_id INTEGER NOT NULL REFERENCES application_types(id),
                application_status_id INTEGER REFERENCES application_statuses(id),
                assigned_to INTEGER REFERENCES users(id),
                client_id INTEGER REFERENCES users(id),
                service_id INTEGER REFERENCES services(id),
                service_stage_id INTEGER REFERENCES service_stages(id),
                custom_fields TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                notes TEXT,
                submitted_at TEXT,
                due_date TEXT,
                total_fee REAL NOT NULL DEFAULT 0,
                amount_paid REAL NOT NULL DEFAULT 0,
                is_paid INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS application_timeline (
                id INTEGER PRIMARY KEY,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                event_type TEXT NOT NULL,
                description TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY,
                application_id INTEGER NOT NULL REFERENCES applications(id),
                payment_reference TEXT NOT NULL,
                amount REAL NOT NULL,
                payment_method TEXT NOT NULL,
                status TEXT NOT NULL,
                paid_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (application_id, payment_reference)
            );
            CREATE INDEX IF NOT EXISTS idx_payments_reference ON payments(payment_reference);
            CREATE INDEX IF NOT EXISTS idx_applications_type ON applications(application_type_id);",
        )?;
        Ok(())
    }

    /// Row count of one target table.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        if !TARGET_TABLES.contains(&table) {
            return Err(MigrateError::Target(format!("unknown target table '{table}'")));
        }
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn optional_id<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(sql, params, |row| row.get(0))
            .optional()?)
    }

    fn form_field_record<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Option<FormFieldRecord>> {
        Ok(self
            .conn
            .query_row(sql, params, |row| {
                Ok(FormFieldRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    legacy_field_id: row.get(2)?,
                })
            })
            .optional()?)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl TargetStore for SqliteTarget {
    fn user_count(&self) -> Result<i64> {
        self.count_rows("users")
    }

    fn owner_user_id(&self) -> Result<Option<i64>> {
        self.optional_id("SELECT id FROM users ORDER BY id LIMIT 1", [])
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM users WHERE email = ?1 COLLATE NOCASE",
            params![email],
        )
    }

    fn create_user(&self, user: &NewUser) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO users (name, email, password, phone, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.name,
                user.email,
                user.password,
                user.phone,
                user.role.to_string(),
                now()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_application_type(&self, slug: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM application_types WHERE slug = ?1",
            params![slug],
        )
    }

    fn create_application_type(&self, name: &str, slug: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO application_types (name, slug, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![name, slug, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_status(&self, slug: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM application_statuses WHERE slug = ?1",
            params![slug],
        )
    }

    fn create_status(
        &self,
        name: &str,
        slug: &str,
        color: &str,
        visible_to_client: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO application_statuses (name, slug, color, visible_to_client)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, slug, color, visible_to_client],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_service(&self, owner_id: i64, name: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM services WHERE user_id = ?1 AND name = ?2",
            params![owner_id, name],
        )
    }

    fn create_service(&self, owner_id: i64, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO services (user_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![owner_id, name, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn find_service_stage(&self, service_id: i64, name: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM service_stages WHERE service_id = ?1 AND name = ?2",
            params![service_id, name],
        )
    }

    fn create_service_stage(
        &self,
        service_id: i64,
        name: &str,
        color: &str,
        position: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO service_stages (service_id, name, color, position) VALUES (?1, ?2, ?3, ?4)",
            params![service_id, name, color, position],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn form_field_names(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM form_fields")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(names)
    }

    fn attached_field_names(&self, application_type_id: i64) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.name FROM form_fields f
             JOIN application_type_form_field p ON p.form_field_id = f.id
             WHERE p.application_type_id = ?1",
        )?;
        let names = stmt
            .query_map(params![application_type_id], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(names)
    }

    fn find_form_field_by_legacy_id(
        &self,
        legacy_field_id: i64,
    ) -> Result<Option<FormFieldRecord>> {
        self.form_field_record(
            "SELECT id, name, legacy_field_id FROM form_fields WHERE legacy_field_id = ?1",
            params![legacy_field_id],
        )
    }

    fn find_form_field_by_name(&self, name: &str) -> Result<Option<FormFieldRecord>> {
        self.form_field_record(
            "SELECT id, name, legacy_field_id FROM form_fields WHERE name = ?1",
            params![name],
        )
    }

    fn create_form_field(&self, field: &NewFormField) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO form_fields (name, label, field_type, legacy_field_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                field.name,
                field.label,
                field.kind.to_string(),
                field.legacy_field_id,
                now()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn attach_form_field(
        &self,
        application_type_id: i64,
        form_field_id: i64,
        is_required: bool,
        display_order: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO application_type_form_field
                (application_type_id, form_field_id, is_required, display_order, section)
             VALUES (?1, ?2, ?3, ?4, NULL)
             ON CONFLICT (application_type_id, form_field_id)
             DO UPDATE SET is_required = excluded.is_required, display_order = excluded.display_order",
            params![application_type_id, form_field_id, is_required, display_order],
        )?;
        Ok(())
    }

    fn upsert_field_option(
        &self,
        form_field_id: i64,
        value: &str,
        label: &str,
        display_order: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO form_field_options (form_field_id, value, label, display_order)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (form_field_id, value)
             DO UPDATE SET label = excluded.label, display_order = excluded.display_order",
            params![form_field_id, value, label, display_order],
        )?;
        Ok(())
    }

    fn find_application(&self, application_number: &str) -> Result<Option<i64>> {
        self.optional_id(
            "SELECT id FROM applications WHERE application_number = ?1",
            params![application_number],
        )
    }

    fn create_application(&self, app: &NewApplication, event: &TimelineEvent) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let created_at = now();

        tx.execute(
            "INSERT INTO applications (
                application_number, application_type_id, application_status_id, assigned_to,
                client_id, service_id, service_stage_id, custom_fields, priority, tags, notes,
                submitted_at, due_date, total_fee, amount_paid, is_paid, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, 0, ?15)",
            params![
                app.application_number,
                app.application_type_id,
                app.application_status_id,
                app.assigned_to,
                app.client_id,
                app.service_id,
                app.service_stage_id,
                serde_json::to_string(&app.custom_fields)?,
                app.priority,
                serde_json::to_string(&app.tags)?,
                app.notes,
                app.submitted_at,
                app.due_date,
                app.total_fee,
                created_at,
            ],
        )?;
        let application_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO application_timeline (application_id, event_type, description, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                application_id,
                event.event_type,
                event.description,
                serde_json::to_string(&event.metadata)?,
                created_at,
            ],
        )?;

        tx.commit()?;
        Ok(application_id)
    }

    fn payment_exists(&self, application_id: i64, payment_reference: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE application_id = ?1 AND payment_reference = ?2)",
            params![application_id, payment_reference],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn record_payments(&self, application_id: i64, payments: &[NewPayment]) -> Result<PaidState> {
        let tx = self.conn.unchecked_transaction()?;
        let created_at = now();

        for payment in payments {
            tx.execute(
                "INSERT INTO payments (application_id, payment_reference, amount, payment_method, status, paid_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    application_id,
                    payment.payment_reference,
                    payment.amount,
                    payment.payment_method,
                    payment.status,
                    payment.paid_at,
                    created_at,
                ],
            )?;
        }

        let amount_paid: f64 = tx.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE application_id = ?1",
            params![application_id],
            |row| row.get(0),
        )?;
        let total_fee: f64 = tx.query_row(
            "SELECT total_fee FROM applications WHERE id = ?1",
            params![application_id],
            |row| row.get(0),
        )?;
        let is_paid = amount_paid >= total_fee;
        tx.execute(
            "UPDATE applications SET amount_paid = ?1, is_paid = ?2 WHERE id = ?3",
            params![amount_paid, is_paid, application_id],
        )?;

        tx.commit()?;
        Ok(PaidState {
            amount_paid,
            is_paid,
        })
    }
}
