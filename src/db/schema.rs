//! Schema snapshot and per-session cache
//!
//! The snapshot is rendered into the system prompt so the model knows which
//! tables and columns exist.

use crate::db::executor::SqlExecutor;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Table name to ordered columns. Tables sort by name; columns keep ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl SchemaSnapshot {
    /// Build from `(table, column, type)` rows already in ordinal order per table.
    pub fn from_columns<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String)>,
    {
        let mut tables: BTreeMap<String, Vec<ColumnInfo>> = BTreeMap::new();
        for (table, name, column_type) in rows {
            tables.entry(table).or_default().push(ColumnInfo { name, column_type });
        }
        Self { tables }
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[ColumnInfo])> {
        self.tables.iter().map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Text block listing every table and its columns.
    pub fn to_context(&self) -> String {
        if self.tables.is_empty() {
            return "(no tables found)\n".to_string();
        }
        let mut out = String::new();
        for (table, columns) in &self.tables {
            out.push_str(&format!("Table: {}\n", table));
            for col in columns {
                out.push_str(&format!(" - {} ({})\n", col.name, col.column_type));
            }
            out.push('\n');
        }
        out
    }
}

/// Schema fetched at most once until refreshed or invalidated.
#[derive(Debug, Default)]
pub struct SchemaCache {
    snapshot: Option<SchemaSnapshot>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&SchemaSnapshot> {
        self.snapshot.as_ref()
    }

    /// Cached snapshot, fetching it first if needed.
    pub async fn load(&mut self, executor: &dyn SqlExecutor) -> Result<&SchemaSnapshot> {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => Self::fetch(executor).await?,
        };
        Ok(self.snapshot.insert(snapshot))
    }

    /// Drop the cached snapshot and fetch a fresh one.
    pub async fn refresh(&mut self, executor: &dyn SqlExecutor) -> Result<&SchemaSnapshot> {
        self.snapshot = None;
        self.load(executor).await
    }

    pub fn invalidate(&mut self) {
        if self.snapshot.take().is_some() {
            info!("Schema cache invalidated");
        }
    }

    async fn fetch(executor: &dyn SqlExecutor) -> Result<SchemaSnapshot> {
        let snapshot = executor.fetch_schema().await?;
        info!("Loaded schema with {} tables", snapshot.table_count());
        Ok(snapshot)
    }
}
