use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::error::{MigrateError, Result};
use crate::model::{DynamicTable, LegacyList, LegacySpace, LegacyStatus};
use crate::store::legacy::{LegacySource, quote_ident};

pub const REQUIRED_TABLES: [&str; 7] = ["task", "list", "space", "status", "contact", "user", "field"];
pub const OPTIONAL_TABLES: [&str; 2] = ["child", "finance_transaction"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePresence {
    pub table: String,
    pub required: bool,
    pub present: bool,
}

/// A space whose dynamic table could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndiscoveredSpace {
    pub space_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub reason: String,
}

pub fn table_presence(legacy: &dyn LegacySource) -> Result<Vec<TablePresence>> {
    let required = REQUIRED_TABLES.iter().map(|table| (*table, true));
    let optional = OPTIONAL_TABLES.iter().map(|table| (*table, false));
    required
        .chain(optional)
        .map(|(table, required)| {
            Ok(TablePresence {
                table: table.to_string(),
                required,
                present: legacy.table_exists(table)?,
            })
        })
        .collect()
}

/// Small legacy tables loaded once per run, plus the dynamic tables found
/// behind each space.
#[derive(Debug, Default)]
pub struct LegacyCatalog {
    lists: HashMap<i64, LegacyList>,
    spaces: HashMap<i64, LegacySpace>,
    statuses: HashMap<i64, LegacyStatus>,
    dynamic_tables: HashMap<i64, DynamicTable>,
    undiscovered: Vec<UndiscoveredSpace>,
    has_child_table: bool,
    has_finance_table: bool,
}

impl LegacyCatalog {
    /// Fails with [`MigrateError::MissingLegacyTable`] before reading anything
    /// else when the legacy schema is incomplete.
    pub fn load(legacy: &dyn LegacySource) -> Result<Self> {
        let presence = table_presence(legacy)?;
        if let Some(missing) = presence.iter().find(|p| p.required && !p.present) {
            return Err(MigrateError::MissingLegacyTable(missing.table.clone()));
        }
        let present = |name: &str| presence.iter().any(|p| p.table == name && p.present);

        let mut catalog = Self {
            lists: legacy.lists()?.into_iter().map(|l| (l.id, l)).collect(),
            spaces: legacy.spaces()?.into_iter().map(|s| (s.id, s)).collect(),
            statuses: legacy.statuses()?.into_iter().map(|s| (s.id, s)).collect(),
            has_child_table: present("child"),
            has_finance_table: present("finance_transaction"),
            ..Self::default()
        };
        catalog.discover_dynamic_tables(legacy)?;
        Ok(catalog)
    }

    fn discover_dynamic_tables(&mut self, legacy: &dyn LegacySource) -> Result<()> {
        let mut space_ids: Vec<i64> = self.spaces.keys().copied().collect();
        space_ids.sort_unstable();

        for space_id in space_ids {
            let table = self.spaces[&space_id].space_db_table.clone();
            match inspect_dynamic_table(legacy, space_id, table.as_deref())? {
                Ok(dynamic) => {
                    self.dynamic_tables.insert(space_id, dynamic);
                }
                Err(reason) => {
                    warn!(space_id, table = table.as_deref().unwrap_or("-"), %reason, "dynamic table not usable");
                    self.undiscovered.push(UndiscoveredSpace {
                        space_id,
                        table,
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn list(&self, id: Option<i64>) -> Option<&LegacyList> {
        id.and_then(|id| self.lists.get(&id))
    }

    pub fn space(&self, id: Option<i64>) -> Option<&LegacySpace> {
        id.and_then(|id| self.spaces.get(&id))
    }

    pub fn status(&self, id: Option<i64>) -> Option<&LegacyStatus> {
        id.and_then(|id| self.statuses.get(&id))
    }

    pub fn dynamic_table(&self, space_id: i64) -> Option<&DynamicTable> {
        self.dynamic_tables.get(&space_id)
    }

    /// Discovered tables ordered by space id.
    pub fn dynamic_tables(&self) -> Vec<&DynamicTable> {
        let mut tables: Vec<&DynamicTable> = self.dynamic_tables.values().collect();
        tables.sort_by_key(|table| table.space_id);
        tables
    }

    pub fn undiscovered(&self) -> &[UndiscoveredSpace] {
        &self.undiscovered
    }

    pub fn has_child_table(&self) -> bool {
        self.has_child_table
    }

    pub fn has_finance_table(&self) -> bool {
        self.has_finance_table
    }
}

/// Outer error is a store failure; inner error is the reason the table is unusable.
fn inspect_dynamic_table(
    legacy: &dyn LegacySource,
    space_id: i64,
    table: Option<&str>,
) -> Result<std::result::Result<DynamicTable, String>> {
    let Some(name) = table else {
        return Ok(Err("space has no dynamic table name".into()));
    };
    if quote_ident(name).is_err() {
        return Ok(Err("invalid table name".into()));
    }
    if !legacy.table_exists(name)? {
        return Ok(Err("table does not exist".into()));
    }
    let columns = legacy.table_columns(name)?;
    if !columns.iter().any(|column| column == "task_id") {
        return Ok(Err("table has no task_id column".into()));
    }
    Ok(Ok(DynamicTable {
        space_id,
        name: name.to_string(),
        columns,
    }))
}
