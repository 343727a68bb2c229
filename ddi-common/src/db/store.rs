//! Storage abstraction
//!
//! The [`Store`] trait is record-oriented: a record is a JSON object keyed by
//! column name, interpreted through the table's [`Table`] definition. Typed
//! access lives one level up in [`super::repository::Repository`].

use super::schema::{Column, ColumnKind, Table};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One row, keyed by column name
pub type Record = serde_json::Map<String, Value>;

/// Single filter condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::In(c, _) | Condition::IsNull(c) | Condition::NotNull(c) => c,
        }
    }
}

/// Conjunction of conditions plus ordering and paging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    /// (column, ascending)
    pub order_by: Vec<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn eq<T: Serialize>(mut self, column: &str, value: T) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), to_value(value)));
        self
    }

    /// `column IN (values)`; an empty list matches nothing
    pub fn any_of<T: Serialize>(mut self, column: &str, values: impl IntoIterator<Item = T>) -> Self {
        let values = values.into_iter().map(to_value).collect();
        self.conditions.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNull(column.to_string()));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::NotNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), true));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), false));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Same conditions without ordering or paging (for counts)
    pub fn unpaged(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            ..Self::default()
        }
    }

    /// Every referenced column must exist in `table`
    pub fn check_columns(&self, table: &Table) -> Result<()> {
        let referenced = self
            .conditions
            .iter()
            .map(Condition::column)
            .chain(self.order_by.iter().map(|(c, _)| c.as_str()));

        for column in referenced {
            if !table.has_column(column) {
                return Err(Error::InvalidInput(format!(
                    "Unknown column '{}' on table '{}'",
                    column, table.name
                )));
            }
        }
        Ok(())
    }
}

/// Rows for several tables, written atomically in entry order
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) entries: Vec<(&'static Table, Vec<Record>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue rows for upsert into `table`
    pub fn upsert(&mut self, table: &'static Table, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        self.entries.push((table, records));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of rows queued
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn entries(&self) -> &[(&'static Table, Vec<Record>)] {
        &self.entries
    }
}

/// Ids to delete per table, executed atomically in entry order
#[derive(Debug, Default, Clone)]
pub struct DeletePlan {
    pub entries: Vec<(&'static Table, Vec<Uuid>)>,
}

impl DeletePlan {
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, ids)| ids.len()).sum()
    }
}

/// Row storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one row by id
    async fn fetch(&self, table: &Table, id: Uuid) -> Result<Option<Record>>;

    /// Rows matching `filter`
    async fn select(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>>;

    /// Number of rows matching `filter` (ordering and paging ignored)
    async fn count(&self, table: &Table, filter: &Filter) -> Result<u64>;

    /// Insert-or-update by id, all rows or none
    async fn write(&self, batch: WriteBatch) -> Result<usize>;

    /// Insert rows whose `key` columns do not match an existing row
    ///
    /// The existence check and the inserts happen atomically. Returns the
    /// number of rows inserted.
    async fn insert_missing(
        &self,
        table: &'static Table,
        key: &[&str],
        records: Vec<Record>,
    ) -> Result<usize>;

    /// Delete rows, all entries or none
    async fn delete(&self, plan: DeletePlan) -> Result<usize>;

    /// Upsert rows of a single table
    async fn upsert(&self, table: &'static Table, records: Vec<Record>) -> Result<usize> {
        let mut batch = WriteBatch::new();
        batch.upsert(table, records);
        self.write(batch).await
    }
}

/// Value stored for a column: absent or null NOT NULL columns fall back to
/// their zero value, JSON columns store `null`
pub fn stored_value(column: &Column, value: Option<&Value>) -> Value {
    match value {
        Some(v) if !v.is_null() => v.clone(),
        _ if column.nullable || column.kind == ColumnKind::Json => Value::Null,
        _ => match column.kind {
            ColumnKind::Text => Value::String(String::new()),
            ColumnKind::Integer | ColumnKind::Boolean => Value::from(0),
            ColumnKind::Real => Value::from(0.0),
            _ => Value::Null,
        },
    }
}

/// Record with exactly the table's columns, as it would be stored
pub fn normalize_record(table: &Table, record: &Record) -> Record {
    table
        .columns
        .iter()
        .map(|c| (c.name.to_string(), stored_value(c, record.get(c.name))))
        .collect()
}

/// Read a UUID column out of a record
pub fn record_uuid(record: &Record, column: &str) -> Option<Uuid> {
    record
        .get(column)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Read a text column out of a record
pub fn record_str<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get(column).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::VARIABLES;

    #[test]
    fn test_filter_builder() {
        let id = Uuid::new_v4();
        let filter = Filter::new().eq("dataset_id", id).order_by("name").limit(10).offset(20);

        assert_eq!(
            filter.conditions[0],
            Condition::Eq("dataset_id".into(), Value::String(id.to_string()))
        );
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.unpaged().limit, None);
        assert!(filter.unpaged().order_by.is_empty());
    }

    #[test]
    fn test_unknown_columns_rejected() {
        assert!(Filter::new().eq("name", "x").check_columns(&VARIABLES).is_ok());
        assert!(Filter::new().eq("name; DROP TABLE x", "x").check_columns(&VARIABLES).is_err());
        assert!(Filter::new().order_by("nope").check_columns(&VARIABLES).is_err());
    }

    #[test]
    fn test_write_batch_skips_empty() {
        let mut batch = WriteBatch::new();
        batch.upsert(&VARIABLES, Vec::new());
        assert!(batch.is_empty());
        batch.upsert(&VARIABLES, vec![Record::new(), Record::new()]);
        assert_eq!(batch.len(), 2);
    }
}
