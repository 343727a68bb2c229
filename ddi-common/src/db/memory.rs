//! In-memory implementation of [`Store`]
//!
//! Mirrors the SQLite semantics the import pipeline relies on: upsert by id,
//! unique keys, foreign keys on write, all-or-nothing batches. Used by unit
//! tests and by tooling that does not need persistence.

use super::schema::Table;
use super::store::{normalize_record, record_uuid, Condition, DeletePlan, Filter, Record, Store, WriteBatch};
use crate::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

type Rows = IndexMap<Uuid, Record>;

/// Store keeping every table in an insertion-ordered map
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Rows>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Rows>> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Rows>> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// Value semantics
// ============================================================================

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), Value::Number(y)) | (Value::Number(y), Value::Bool(x)) => {
            y.as_i64() == Some(*x as i64)
        }
        _ => a == b,
    }
}

/// SQLite ordering: NULL first, then numbers, then text
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) | Value::Number(_) => 1,
            Value::String(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match rank(a).cmp(&rank(b)) {
            Ordering::Equal => a.to_string().cmp(&b.to_string()),
            other => other,
        },
    }
}

fn matches(record: &Record, condition: &Condition) -> bool {
    let field = |c: &str| record.get(c).unwrap_or(&Value::Null);
    match condition {
        Condition::Eq(c, Value::Null) | Condition::IsNull(c) => field(c).is_null(),
        Condition::Eq(c, value) => values_equal(field(c), value),
        Condition::In(c, values) => values.iter().any(|v| values_equal(field(c), v)),
        Condition::NotNull(c) => !field(c).is_null(),
    }
}

fn filtered<'a>(rows: Option<&'a Rows>, filter: &Filter) -> Vec<&'a Record> {
    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.values()
        .filter(|r| filter.conditions.iter().all(|c| matches(r, c)))
        .collect()
}

fn key_matches(a: &Record, b: &Record, key: &[&str]) -> bool {
    key.iter().all(|c| {
        let left = a.get(*c).unwrap_or(&Value::Null);
        let right = b.get(*c).unwrap_or(&Value::Null);
        // NULLs never collide in unique constraints
        !left.is_null() && values_equal(left, right)
    })
}

// ============================================================================
// Constraint checks
// ============================================================================

fn check_row(tables: &HashMap<String, Rows>, table: &Table, id: Uuid, record: &Record) -> Result<()> {
    check_foreign_keys(tables, table, id, record)?;
    check_unique(tables, table, id, record)
}

fn check_foreign_keys(tables: &HashMap<String, Rows>, table: &Table, id: Uuid, record: &Record) -> Result<()> {
    for (column, fk) in table.foreign_keys() {
        let Some(value) = record.get(column.name).filter(|v| !v.is_null()) else {
            if !column.nullable {
                return Err(constraint(table, format!("NOT NULL constraint failed: {}.{}", table.name, column.name)));
            }
            continue;
        };

        let target = value.as_str().and_then(|s| Uuid::parse_str(s).ok());
        let exists = target
            .map(|t| {
                tables
                    .get(fk.table)
                    .map(|rows| rows.contains_key(&t))
                    .unwrap_or(false)
                    || (fk.table == table.name && t == id)
            })
            .unwrap_or(false);

        if !exists {
            return Err(constraint(
                table,
                format!("FOREIGN KEY constraint failed: {}.{} -> {}", table.name, column.name, value),
            ));
        }
    }
    Ok(())
}

fn check_unique(tables: &HashMap<String, Rows>, table: &Table, id: Uuid, record: &Record) -> Result<()> {
    if let Some(rows) = tables.get(table.name) {
        for key in &table.unique_keys {
            let clash = rows
                .iter()
                .any(|(other_id, other)| *other_id != id && key_matches(record, other, key));
            if clash {
                return Err(constraint(
                    table,
                    format!("UNIQUE constraint failed: {}({})", table.name, key.join(", ")),
                ));
            }
        }
    }

    Ok(())
}

fn constraint(table: &Table, message: String) -> Error {
    Error::validation(table.name, message)
}

fn row_id(table: &Table, record: &Record) -> Result<Uuid> {
    record_uuid(record, "id")
        .ok_or_else(|| Error::InvalidInput(format!("{} row without a valid id", table.name)))
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl Store for MemoryStore {
    async fn fetch(&self, table: &Table, id: Uuid) -> Result<Option<Record>> {
        let tables = self.read();
        Ok(tables.get(table.name).and_then(|rows| rows.get(&id)).cloned())
    }

    async fn select(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>> {
        filter.check_columns(table)?;
        let tables = self.read();
        let mut rows = filtered(tables.get(table.name), filter);

        if !filter.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for (column, ascending) in &filter.order_by {
                    let left = a.get(column).unwrap_or(&Value::Null);
                    let right = b.get(column).unwrap_or(&Value::Null);
                    let ordering = compare_values(left, right);
                    if ordering != Ordering::Equal {
                        return if *ascending { ordering } else { ordering.reverse() };
                    }
                }
                Ordering::Equal
            });
        }

        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, table: &Table, filter: &Filter) -> Result<u64> {
        filter.check_columns(table)?;
        let tables = self.read();
        Ok(filtered(tables.get(table.name), filter).len() as u64)
    }

    async fn write(&self, batch: WriteBatch) -> Result<usize> {
        let mut tables = self.write_lock();
        // Work on a copy so a failing row leaves nothing behind
        let mut working = tables.clone();
        let mut written = Vec::new();

        for (table, records) in batch.entries() {
            for record in records {
                let id = row_id(table, record)?;
                let row = normalize_record(table, record);
                check_unique(&working, table, id, &row)?;
                working
                    .entry(table.name.to_string())
                    .or_default()
                    .insert(id, row);
                written.push((*table, id));
            }
        }

        // Foreign keys are checked once the whole batch is in place
        for (table, id) in &written {
            if let Some(row) = working.get(table.name).and_then(|rows| rows.get(id)) {
                check_foreign_keys(&working, table, *id, row)?;
            }
        }

        *tables = working;
        let written = written.len();
        Ok(written)
    }

    async fn insert_missing(
        &self,
        table: &'static Table,
        key: &[&str],
        records: Vec<Record>,
    ) -> Result<usize> {
        for column in key {
            if !table.has_column(column) {
                return Err(Error::InvalidInput(format!(
                    "Unknown column '{}' on table '{}'",
                    column, table.name
                )));
            }
        }

        let mut tables = self.write_lock();
        let mut working = tables.clone();
        let mut inserted = 0;

        for record in &records {
            let id = row_id(table, record)?;
            let row = normalize_record(table, record);
            let present = working
                .get(table.name)
                .map(|rows| rows.contains_key(&id) || rows.values().any(|r| key_matches(&row, r, key)))
                .unwrap_or(false);
            if present {
                continue;
            }

            check_row(&working, table, id, &row)?;
            working
                .entry(table.name.to_string())
                .or_default()
                .insert(id, row);
            inserted += 1;
        }

        *tables = working;
        Ok(inserted)
    }

    async fn delete(&self, plan: DeletePlan) -> Result<usize> {
        let mut tables = self.write_lock();
        let mut deleted = 0;

        for (table, ids) in &plan.entries {
            if let Some(rows) = tables.get_mut(table.name) {
                for id in ids {
                    if rows.shift_remove(id).is_some() {
                        deleted += 1;
                    }
                }
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::{DATASETS, STUDIES, TOPICS};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store
            .upsert(&STUDIES, vec![record(json!({"id": id, "name": "s", "label": "one"}))])
            .await
            .unwrap();
        store
            .upsert(&STUDIES, vec![record(json!({"id": id, "name": "s", "label": "two"}))])
            .await
            .unwrap();

        assert_eq!(store.count(&STUDIES, &Filter::new()).await.unwrap(), 1);
        let row = store.fetch(&STUDIES, id).await.unwrap().unwrap();
        assert_eq!(row["label"], "two");
        assert_eq!(row["description"], "");
    }

    #[tokio::test]
    async fn test_unique_key_violation() {
        let store = MemoryStore::new();
        store
            .upsert(&STUDIES, vec![record(json!({"id": Uuid::new_v4(), "name": "s"}))])
            .await
            .unwrap();

        let err = store
            .upsert(&STUDIES, vec![record(json!({"id": Uuid::new_v4(), "name": "s"}))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[tokio::test]
    async fn test_foreign_key_violation_rolls_back_batch() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();

        let mut batch = WriteBatch::new();
        batch.upsert(&STUDIES, vec![record(json!({"id": study, "name": "s"}))]);
        batch.upsert(
            &DATASETS,
            vec![record(json!({"id": Uuid::new_v4(), "study_id": Uuid::new_v4(), "name": "d"}))],
        );

        assert!(store.write(batch).await.is_err());
        assert!(store.fetch(&STUDIES, study).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_self_reference_within_batch() {
        let store = MemoryStore::new();
        let study = Uuid::new_v4();
        let (root, leaf) = (Uuid::new_v4(), Uuid::new_v4());

        let mut batch = WriteBatch::new();
        batch.upsert(&STUDIES, vec![record(json!({"id": study, "name": "s"}))]);
        batch.upsert(
            &TOPICS,
            vec![
                record(json!({"id": root, "study_id": study, "name": "root"})),
                record(json!({"id": leaf, "study_id": study, "name": "leaf", "parent_id": root})),
            ],
        );
        assert_eq!(store.write(batch).await.unwrap(), 3);

        let children = store
            .select(&TOPICS, &Filter::new().eq("parent_id", root))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        let roots = store.select(&TOPICS, &Filter::new().is_null("parent_id")).await.unwrap();
        assert_eq!(roots[0]["name"], "root");
    }

    #[tokio::test]
    async fn test_order_and_paging() {
        let store = MemoryStore::new();
        let records = ["b", "c", "a"]
            .iter()
            .map(|n| record(json!({"id": Uuid::new_v4(), "name": n})))
            .collect();
        store.upsert(&STUDIES, records).await.unwrap();

        let rows = store
            .select(&STUDIES, &Filter::new().order_by("name").offset(1).limit(5))
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}
