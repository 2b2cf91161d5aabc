//! In-memory legacy and target databases shared by the pipeline tests.

use rusqlite::Connection;

use crate::model::{NewUser, UserRole};
use crate::store::legacy::SqliteLegacy;
use crate::store::target::{SqliteTarget, TargetStore};

pub const LEGACY_SCHEMA: &str = "
    CREATE TABLE task (
        id INTEGER PRIMARY KEY, list_id INTEGER, status_id INTEGER, assign_to TEXT,
        contact_id INTEGER, notes TEXT, priority TEXT, tags TEXT,
        date_created TEXT, due_date TEXT, total_fee REAL
    );
    CREATE TABLE list (id INTEGER PRIMARY KEY, name TEXT, space_id INTEGER);
    CREATE TABLE space (id INTEGER PRIMARY KEY, name TEXT, space_db_table TEXT);
    CREATE TABLE status (id INTEGER PRIMARY KEY, name TEXT, list_id INTEGER);
    CREATE TABLE contact (
        id INTEGER PRIMARY KEY, first_name TEXT, middle_name TEXT, last_name TEXT,
        email TEXT, phone TEXT
    );
    CREATE TABLE user (
        id INTEGER PRIMARY KEY, first_name TEXT, middle_name TEXT, last_name TEXT,
        email TEXT, phone TEXT
    );
    CREATE TABLE field (
        id INTEGER PRIMARY KEY, field_order INTEGER, space_id INTEGER, type TEXT,
        name TEXT, column_name TEXT, assign_to TEXT
    );
    CREATE TABLE child (id INTEGER PRIMARY KEY, child_order INTEGER, name TEXT, field_id INTEGER);
    CREATE TABLE finance_transaction (
        id INTEGER PRIMARY KEY, task_id INTEGER, amount REAL, payment_method TEXT,
        transaction_date TEXT, created_at TEXT
    );
    CREATE TABLE space_visa (
        id INTEGER PRIMARY KEY, task_id INTEGER, notes TEXT, visa_type TEXT, passport_no TEXT
    );
    CREATE TABLE space_study (id INTEGER PRIMARY KEY, task_id INTEGER, notes TEXT, school TEXT);
";

/// Two migratable spaces sharing a `Notes` field, a space whose dynamic
/// table is gone, and tasks covering every row outcome.
pub const LEGACY_DATA: &str = "
    INSERT INTO space VALUES (1, 'Visas', 'space_visa'), (2, 'Study', 'space_study'),
                             (3, 'Ghost', 'space_missing');
    INSERT INTO list VALUES (10, 'Student Visa', 1), (20, 'Admissions', 2), (30, 'Orphaned', 3);
    INSERT INTO status VALUES (100, 'In Review', 10), (101, 'Approved', 10), (200, 'Submitted', 20);
    INSERT INTO contact VALUES (500, 'Ada', '', 'Obi', 'Ada@Example.com', '+2348000'),
                               (501, NULL, NULL, NULL, NULL, NULL);
    INSERT INTO user VALUES (900, 'Sam', NULL, 'Staff', 'sam@agency.test', NULL),
                            (901, 'Kim', NULL, NULL, NULL, NULL);
    INSERT INTO field VALUES
        (1, 1, 1, 'textarea', 'Notes', 'notes', ''),
        (2, 2, 1, 'Dropdown', 'Visa Type', 'visa_type', 'x'),
        (3, 3, 1, 'text', 'Passport No', 'passport_no', NULL),
        (4, 1, 2, 'textarea', 'Notes', 'notes', NULL),
        (5, 2, 2, 'text', '', 'school', NULL);
    INSERT INTO child VALUES (1, 1, 'Tourist', 2), (2, 2, 'Student', 2);
    INSERT INTO task VALUES
        (1, 10, 100, '900,901', 500, 'first contact', 'A', 'vip, urgent,vip', '2021-03-04 10:30:00', '0000-00-00', 100),
        (2, 10, 101, '', 501, NULL, 'b', NULL, NULL, NULL, NULL),
        (3, 20, 200, '901', NULL, NULL, NULL, NULL, NULL, 'soon', 50),
        (4, 99, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL),
        (5, 30, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL);
    INSERT INTO space_visa VALUES (1, 1, '  call me ', 'Tourist', 'A123');
    INSERT INTO space_study VALUES (1, 3, 'NULL', 'Oxford');
    INSERT INTO finance_transaction VALUES
        (1, 1, 60, '', '2021-03-05', NULL),
        (2, 1, 50, 'card', NULL, '2021-03-06 09:00:00'),
        (3, 3, -5, 'cash', NULL, NULL);
";

pub fn legacy_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    conn.execute_batch(LEGACY_DATA).unwrap();
    conn
}

pub fn legacy_fixture() -> SqliteLegacy {
    SqliteLegacy::from_connection(legacy_connection())
}

pub fn target_with_owner() -> SqliteTarget {
    let target = SqliteTarget::open_memory().unwrap();
    target
        .create_user(&NewUser {
            name: "Agency Owner".into(),
            email: "owner@agency.test".into(),
            password: "secret".into(),
            phone: None,
            role: UserRole::Admin,
        })
        .unwrap();
    target
}
