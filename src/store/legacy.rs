use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params, params_from_iter};
use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::model::{
    DynamicTable, LegacyChild, LegacyField, LegacyList, LegacyPayment, LegacyPerson, LegacySpace,
    LegacyStatus, LegacyTask, RawRow,
};

/// Row filters applied when streaming legacy tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub list_id: Option<i64>,
    pub task_id: Option<i64>,
}

/// One streamed `task` row. Rows that cannot be read as a task still carry
/// their raw id so streaming can continue past them.
#[derive(Debug)]
pub struct TaskRow {
    pub raw_id: Value,
    pub task: Result<LegacyTask>,
}

/// Read-only view of the legacy tracker.
pub trait LegacySource {
    fn table_exists(&self, name: &str) -> Result<bool>;
    fn table_columns(&self, name: &str) -> Result<Vec<String>>;

    /// Next chunk of task rows ordered by raw id, starting after `after`
    /// (or from the first row when `None`).
    fn tasks_after(
        &self,
        filter: TaskFilter,
        after: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<TaskRow>>;

    fn lists(&self) -> Result<Vec<LegacyList>>;
    fn spaces(&self) -> Result<Vec<LegacySpace>>;
    fn statuses(&self) -> Result<Vec<LegacyStatus>>;

    /// Field definitions of a space in display order.
    fn fields_for_space(&self, space_id: i64) -> Result<Vec<LegacyField>>;
    fn children_for_field(&self, field_id: i64) -> Result<Vec<LegacyChild>>;

    fn contact(&self, id: i64) -> Result<Option<LegacyPerson>>;
    fn staff_user(&self, id: i64) -> Result<Option<LegacyPerson>>;

    fn dynamic_row(&self, table: &DynamicTable, task_id: i64) -> Result<Option<RawRow>>;
    fn payments_for_task(&self, task_id: i64) -> Result<Vec<LegacyPayment>>;
}

/// Legacy dump loaded into SQLite.
pub struct SqliteLegacy {
    conn: Connection,
}

impl SqliteLegacy {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MigrateError::LegacyDatabaseMissing(
                path.display().to_string(),
            ));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn query_rows<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<RawRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = stmt
            .query_map(params, |row| {
                let mut raw = RawRow::new();
                for (idx, column) in columns.iter().enumerate() {
                    raw.insert(column.clone(), cell_to_json(row.get_ref(idx)?));
                }
                Ok(raw)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn people(&self, table: &str, id: i64) -> Result<Option<LegacyPerson>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?1 LIMIT 1", quote_ident(table)?);
        self.query_rows(&sql, params![id])?
            .first()
            .map(LegacyPerson::from_row)
            .transpose()
    }
}

impl LegacySource for SqliteLegacy {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(columns)
    }

    fn tasks_after(
        &self,
        filter: TaskFilter,
        after: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<TaskRow>> {
        let mut sql = String::from("SELECT * FROM \"task\" WHERE id IS NOT NULL");
        let mut values = Vec::new();
        if let Some(last) = after {
            sql.push_str(" AND id > ?");
            values.push(json_to_sql(last));
        }
        if let Some(list_id) = filter.list_id {
            sql.push_str(" AND list_id = ?");
            values.push(SqlValue::Integer(list_id));
        }
        if let Some(task_id) = filter.task_id {
            sql.push_str(" AND id = ?");
            values.push(SqlValue::Integer(task_id));
        }
        sql.push_str(" ORDER BY id LIMIT ?");
        values.push(SqlValue::Integer(limit as i64));

        let rows = self
            .query_rows(&sql, params_from_iter(values))?
            .into_iter()
            .map(|raw| TaskRow {
                raw_id: raw.get("id").cloned().unwrap_or(Value::Null),
                task: LegacyTask::from_row(raw),
            })
            .collect();
        Ok(rows)
    }

    fn lists(&self) -> Result<Vec<LegacyList>> {
        self.query_rows("SELECT * FROM \"list\" ORDER BY id", [])?
            .iter()
            .map(LegacyList::from_row)
            .collect()
    }

    fn spaces(&self) -> Result<Vec<LegacySpace>> {
        self.query_rows("SELECT * FROM \"space\" ORDER BY id", [])?
            .iter()
            .map(LegacySpace::from_row)
            .collect()
    }

    fn statuses(&self) -> Result<Vec<LegacyStatus>> {
        self.query_rows("SELECT * FROM \"status\" ORDER BY id", [])?
            .iter()
            .map(LegacyStatus::from_row)
            .collect()
    }

    fn fields_for_space(&self, space_id: i64) -> Result<Vec<LegacyField>> {
        self.query_rows(
            "SELECT * FROM \"field\" WHERE space_id = ?1
             ORDER BY field_order IS NULL, field_order, id",
            params![space_id],
        )?
        .iter()
        .map(LegacyField::from_row)
        .collect()
    }

    fn children_for_field(&self, field_id: i64) -> Result<Vec<LegacyChild>> {
        self.query_rows(
            "SELECT * FROM \"child\" WHERE field_id = ?1
             ORDER BY child_order IS NULL, child_order, id",
            params![field_id],
        )?
        .iter()
        .map(LegacyChild::from_row)
        .collect()
    }

    fn contact(&self, id: i64) -> Result<Option<LegacyPerson>> {
        self.people("contact", id)
    }

    fn staff_user(&self, id: i64) -> Result<Option<LegacyPerson>> {
        self.people("user", id)
    }

    fn dynamic_row(&self, table: &DynamicTable, task_id: i64) -> Result<Option<RawRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE task_id = ?1 ORDER BY rowid LIMIT 1",
            quote_ident(&table.name)?
        );
        Ok(self.query_rows(&sql, params![task_id])?.into_iter().next())
    }

    fn payments_for_task(&self, task_id: i64) -> Result<Vec<LegacyPayment>> {
        self.query_rows(
            "SELECT * FROM \"finance_transaction\" WHERE task_id = ?1 ORDER BY id",
            params![task_id],
        )?
        .into_iter()
        .map(LegacyPayment::from_row)
        .collect()
    }
}

/// Legacy table names come from data, so only plain identifiers are accepted.
pub fn quote_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !valid {
        return Err(MigrateError::InvalidTableName(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn cell_to_json(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::from(value),
        ValueRef::Real(value) => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
