#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use rusqlite::Connection;
use serde_json::Value;

const LEGACY_SQL: &str = "
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
    CREATE TABLE space_visa (id INTEGER PRIMARY KEY, task_id INTEGER, notes TEXT, visa_type TEXT);
    CREATE TABLE space_study (id INTEGER PRIMARY KEY, task_id INTEGER, notes TEXT);

    INSERT INTO space VALUES (1, 'Visas', 'space_visa'), (2, 'Study', 'space_study');
    INSERT INTO list VALUES (10, 'Student Visa', 1), (20, 'Admissions', 2);
    INSERT INTO status VALUES (100, 'In Review', 10), (200, 'Submitted', 20);
    INSERT INTO contact VALUES (500, 'Ada', NULL, 'Obi', 'ada@example.com', NULL);
    INSERT INTO user VALUES (900, 'Sam', NULL, 'Staff', 'sam@agency.test', NULL);
    INSERT INTO field VALUES
        (1, 1, 1, 'textarea', 'Notes', 'notes', NULL),
        (2, 2, 1, 'dropdown', 'Visa Type', 'visa_type', 'x'),
        (3, 1, 2, 'textarea', 'Notes', 'notes', NULL);
    INSERT INTO child VALUES (1, 1, 'Tourist', 2);
    INSERT INTO task VALUES
        (1, 10, 100, '900', 500, NULL, 'a', 'vip', '2021-03-04', NULL, 100),
        (2, 20, 200, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL),
        (3, 77, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL);
    INSERT INTO space_visa VALUES (1, 1, 'call me', 'Tourist');
    INSERT INTO finance_transaction VALUES (1, 1, 40, 'card', '2021-03-05', NULL);
";

/// Legacy database with two migratable tasks and one pointing at a missing list.
pub fn write_legacy_db(path: &Path) {
    let conn = Connection::open(path).expect("legacy db opens");
    conn.execute_batch(LEGACY_SQL).expect("legacy fixture loads");
}

pub fn tasklift(dir: &Path, args: &[&str]) -> Output {
    let binary = assert_cmd::cargo::cargo_bin!("tasklift");
    let mut cmd = Command::new(binary);
    cmd.current_dir(dir);
    cmd.env("NO_COLOR", "1");
    cmd.arg("--quiet");
    cmd.args(args);
    cmd.output().expect("tasklift command executes")
}

pub fn tasklift_json(dir: &Path, args: &[&str]) -> Value {
    let output = tasklift(dir, args);
    assert!(
        output.status.success(),
        "tasklift {:?} failed:\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json stdout")
}

/// Error object printed on the last stderr line of a failed command.
pub fn tasklift_err_json(dir: &Path, args: &[&str]) -> Value {
    let output = tasklift(dir, args);
    assert!(
        !output.status.success(),
        "expected tasklift {:?} to fail:\nstdout:\n{}",
        args,
        String::from_utf8_lossy(&output.stdout)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .expect("stderr has an error line");
    serde_json::from_str(last).expect("error line is json")
}

/// Legacy db plus config, with an owner user in the target.
pub fn initialized(dir: &Path) {
    write_legacy_db(&dir.join("legacy.db"));
    tasklift_json(dir, &["init", "--owner-email", "owner@agency.test"]);
}
