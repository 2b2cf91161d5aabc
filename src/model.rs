use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::normalize::normalize_text;

/// One legacy row, column name -> cell value.
pub type RawRow = BTreeMap<String, Value>;

/// Integer content of a cell, accepting numeric strings.
pub fn raw_i64(row: &RawRow, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64)),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

pub fn raw_f64(row: &RawRow, column: &str) -> Option<f64> {
    match row.get(column)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Text content of a cell with legacy null conventions applied.
pub fn raw_text(row: &RawRow, column: &str) -> Option<String> {
    normalize_text(row.get(column))
}

fn required_id(row: &RawRow, column: &str) -> Result<i64> {
    raw_i64(row, column).ok_or_else(|| MigrateError::MissingColumn(column.to_string()))
}

// ---------------------------------------------------------------------------
// Legacy records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTask {
    pub id: i64,
    pub list_id: Option<i64>,
    pub status_id: Option<i64>,
    pub assign_to: Option<String>,
    pub contact_id: Option<i64>,
    pub notes: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<String>,
    pub total_fee: Option<f64>,
    /// Untouched row, kept for date columns parsed later.
    pub raw: RawRow,
}

impl LegacyTask {
    pub fn from_row(row: RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(&row, "id")?,
            list_id: raw_i64(&row, "list_id"),
            status_id: raw_i64(&row, "status_id"),
            assign_to: raw_text(&row, "assign_to"),
            contact_id: raw_i64(&row, "contact_id"),
            notes: raw_text(&row, "notes"),
            priority: raw_text(&row, "priority"),
            tags: raw_text(&row, "tags"),
            total_fee: raw_f64(&row, "total_fee"),
            raw: row,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyList {
    pub id: i64,
    pub name: Option<String>,
    pub space_id: Option<i64>,
}

impl LegacyList {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            name: raw_text(row, "name"),
            space_id: raw_i64(row, "space_id"),
        })
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Legacy List {}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacySpace {
    pub id: i64,
    pub name: Option<String>,
    pub space_db_table: Option<String>,
}

impl LegacySpace {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            name: raw_text(row, "name"),
            space_db_table: raw_text(row, "space_db_table"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyStatus {
    pub id: i64,
    pub name: Option<String>,
    pub list_id: Option<i64>,
}

impl LegacyStatus {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            name: raw_text(row, "name"),
            list_id: raw_i64(row, "list_id"),
        })
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Legacy Status {}", self.id))
    }
}

/// Per-space custom field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyField {
    pub id: i64,
    pub field_order: Option<i64>,
    pub space_id: Option<i64>,
    pub field_type: Option<String>,
    pub name: Option<String>,
    pub column_name: Option<String>,
    pub assign_to: Option<String>,
}

impl LegacyField {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            field_order: raw_i64(row, "field_order"),
            space_id: raw_i64(row, "space_id"),
            field_type: raw_text(row, "type"),
            name: raw_text(row, "name"),
            column_name: raw_text(row, "column_name"),
            assign_to: raw_text(row, "assign_to"),
        })
    }
}

/// Option of a choice-type legacy field.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyChild {
    pub id: i64,
    pub child_order: Option<i64>,
    pub name: Option<String>,
    pub field_id: Option<i64>,
}

impl LegacyChild {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            child_order: raw_i64(row, "child_order"),
            name: raw_text(row, "name"),
            field_id: raw_i64(row, "field_id"),
        })
    }
}

/// Row of the legacy `contact` or `user` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPerson {
    pub id: i64,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl LegacyPerson {
    pub fn from_row(row: &RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(row, "id")?,
            first_name: raw_text(row, "first_name"),
            middle_name: raw_text(row, "middle_name"),
            last_name: raw_text(row, "last_name"),
            email: raw_text(row, "email").map(|email| email.to_lowercase()),
            phone: raw_text(row, "phone"),
        })
    }

    /// First, middle and last name joined, or `None` when all are blank.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPayment {
    pub id: i64,
    pub task_id: i64,
    pub amount: Option<f64>,
    pub payment_method: Option<String>,
    pub raw: RawRow,
}

impl LegacyPayment {
    pub fn from_row(row: RawRow) -> Result<Self> {
        Ok(Self {
            id: required_id(&row, "id")?,
            task_id: required_id(&row, "task_id")?,
            amount: raw_f64(&row, "amount"),
            payment_method: raw_text(&row, "payment_method"),
            raw: row,
        })
    }
}

/// Discovered per-space table holding custom field values keyed by task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicTable {
    pub space_id: i64,
    pub name: String,
    pub columns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Target records
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Select,
    Textarea,
    Date,
    Email,
    Number,
    File,
    Checkbox,
    Radio,
}

impl FieldKind {
    pub fn from_legacy(raw: Option<&str>) -> Self {
        let lowered = raw.map(|value| value.trim().to_ascii_lowercase());
        match lowered.as_deref() {
            Some("dropdown" | "select") => Self::Select,
            Some("textarea") => Self::Textarea,
            Some("date") => Self::Date,
            Some("email") => Self::Email,
            Some("number" | "numeric") => Self::Number,
            Some("file") => Self::File,
            Some("checkbox") => Self::Checkbox,
            Some("radio") => Self::Radio,
            _ => Self::Text,
        }
    }

    /// Kinds whose values come from a fixed option list.
    pub fn has_options(self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Checkbox)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Select => write!(f, "select"),
            Self::Textarea => write!(f, "textarea"),
            Self::Date => write!(f, "date"),
            Self::Email => write!(f, "email"),
            Self::Number => write!(f, "number"),
            Self::File => write!(f, "file"),
            Self::Checkbox => write!(f, "checkbox"),
            Self::Radio => write!(f, "radio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Client,
    Staff,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Client => write!(f, "client"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub legacy_field_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormFieldRecord {
    pub id: i64,
    pub name: String,
    pub legacy_field_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub application_number: String,
    pub application_type_id: i64,
    pub application_status_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub client_id: Option<i64>,
    pub service_id: Option<i64>,
    pub service_stage_id: Option<i64>,
    pub custom_fields: Value,
    pub priority: i64,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub submitted_at: Option<String>,
    pub due_date: Option<String>,
    pub total_fee: f64,
}

/// Append-only event written alongside a created application.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub event_type: String,
    pub description: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub payment_reference: String,
    pub amount: f64,
    pub payment_method: String,
    pub status: String,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaidState {
    pub amount_paid: f64,
    pub is_paid: bool,
}

// ---------------------------------------------------------------------------
// Row outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingList,
    MissingSpace,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingList => write!(f, "missing list"),
            Self::MissingSpace => write!(f, "missing space or dynamic table"),
        }
    }
}

/// Terminal state of one legacy task.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created {
        application_number: String,
        payments: usize,
        missing_dynamic: bool,
    },
    /// Already migrated. `payments` counts finance rows recorded on the
    /// existing application during this run.
    SkippedDuplicate {
        application_number: String,
        payments: usize,
        missing_dynamic: bool,
    },
    SkippedMissingReference(SkipReason),
    Failed(String),
}
