//! SQLite implementation of [`Store`]
//!
//! SQL is generated from the table definitions. Column and table names only
//! ever come from those definitions (filters are checked against them), all
//! values are bound as parameters.

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use super::schema::{Column, ColumnKind, Table};
use super::store::{stored_value, Condition, DeletePlan, Filter, Record, Store, WriteBatch};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Ids per `DELETE ... IN (...)` statement
const DELETE_CHUNK: usize = 500;

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Override the lock retry window
    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ============================================================================
// SQL generation
// ============================================================================

fn column_list(table: &Table) -> String {
    table.column_names().collect::<Vec<_>>().join(", ")
}

fn upsert_sql(table: &Table) -> String {
    let columns = column_list(table);
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let updates = table
        .column_names()
        .filter(|c| *c != "id")
        .map(|c| format!("{} = excluded.{}", c, c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        table.name, columns, placeholders, updates
    )
}

fn insert_ignore_sql(table: &Table) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        table.name,
        column_list(table),
        vec!["?"; table.columns.len()].join(", ")
    )
}

fn where_sql(filter: &Filter) -> String {
    if filter.conditions.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = filter
        .conditions
        .iter()
        .map(|condition| match condition {
            Condition::Eq(c, Value::Null) | Condition::IsNull(c) => format!("{} IS NULL", c),
            Condition::Eq(c, _) => format!("{} = ?", c),
            Condition::In(_, values) if values.is_empty() => "0 = 1".to_string(),
            Condition::In(c, values) => {
                format!("{} IN ({})", c, vec!["?"; values.len()].join(", "))
            }
            Condition::NotNull(c) => format!("{} IS NOT NULL", c),
        })
        .collect();

    format!(" WHERE {}", clauses.join(" AND "))
}

fn order_sql(filter: &Filter) -> String {
    let mut sql = String::new();
    if !filter.order_by.is_empty() {
        let parts: Vec<String> = filter
            .order_by
            .iter()
            .map(|(c, asc)| format!("{} {}", c, if *asc { "ASC" } else { "DESC" }))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", parts.join(", ")));
    }
    match (filter.limit, filter.offset) {
        (Some(limit), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (None, 0) => {}
        (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
    }
    sql
}

// ============================================================================
// Binding and decoding
// ============================================================================

fn bind_value<'q>(query: SqliteQuery<'q>, column: &Column, value: &Value) -> Result<SqliteQuery<'q>> {
    let mismatch = || {
        Error::InvalidInput(format!(
            "Column '{}' ({:?}) cannot hold {}",
            column.name, column.kind, value
        ))
    };

    Ok(match column.kind {
        ColumnKind::Json => query.bind(serde_json::to_string(value)?),
        ColumnKind::Uuid | ColumnKind::Timestamp => match value {
            Value::Null => query.bind(None::<String>),
            Value::String(s) => query.bind(s.clone()),
            _ => return Err(mismatch()),
        },
        ColumnKind::Text => match value {
            Value::Null => query.bind(None::<String>),
            Value::String(s) => query.bind(s.clone()),
            Value::Number(n) => query.bind(n.to_string()),
            Value::Bool(b) => query.bind(b.to_string()),
            _ => return Err(mismatch()),
        },
        ColumnKind::Integer => match value {
            Value::Null => query.bind(None::<i64>),
            Value::Number(n) => query.bind(
                n.as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .ok_or_else(mismatch)?,
            ),
            Value::String(s) => query.bind(s.trim().parse::<i64>().map_err(|_| mismatch())?),
            Value::Bool(b) => query.bind(*b as i64),
            _ => return Err(mismatch()),
        },
        ColumnKind::Real => match value {
            Value::Null => query.bind(None::<f64>),
            Value::Number(n) => query.bind(n.as_f64().ok_or_else(mismatch)?),
            Value::String(s) => query.bind(s.trim().parse::<f64>().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        },
        ColumnKind::Boolean => match value {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(b) => query.bind(*b as i64),
            Value::Number(n) => query.bind((n.as_i64().unwrap_or(0) != 0) as i64),
            _ => return Err(mismatch()),
        },
    })
}

fn bind_record<'q>(mut query: SqliteQuery<'q>, table: &Table, record: &Record) -> Result<SqliteQuery<'q>> {
    for column in &table.columns {
        let value = stored_value(column, record.get(column.name));
        query = bind_value(query, column, &value)?;
    }
    Ok(query)
}

fn bind_filter<'q>(mut query: SqliteQuery<'q>, table: &Table, filter: &Filter) -> Result<SqliteQuery<'q>> {
    for condition in &filter.conditions {
        match condition {
            Condition::Eq(_, Value::Null) | Condition::IsNull(_) | Condition::NotNull(_) => {}
            Condition::Eq(c, value) => {
                let column = table.get_column(c).ok_or_else(|| unknown_column(table, c))?;
                query = bind_value(query, column, value)?;
            }
            Condition::In(c, values) => {
                let column = table.get_column(c).ok_or_else(|| unknown_column(table, c))?;
                for value in values {
                    query = bind_value(query, column, value)?;
                }
            }
        }
    }
    Ok(query)
}

fn unknown_column(table: &Table, column: &str) -> Error {
    Error::InvalidInput(format!("Unknown column '{}' on table '{}'", column, table.name))
}

fn decode_row(table: &Table, row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();

    for column in &table.columns {
        let value = match column.kind {
            ColumnKind::Uuid | ColumnKind::Text | ColumnKind::Timestamp => row
                .try_get::<Option<String>, _>(column.name)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(column.name)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnKind::Real => row
                .try_get::<Option<f64>, _>(column.name)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnKind::Boolean => row
                .try_get::<Option<i64>, _>(column.name)?
                .map(|v| Value::Bool(v != 0))
                .unwrap_or(Value::Null),
            ColumnKind::Json => match row.try_get::<Option<String>, _>(column.name)? {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            },
        };
        record.insert(column.name.to_string(), value);
    }

    Ok(record)
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl Store for SqliteStore {
    async fn fetch(&self, table: &Table, id: Uuid) -> Result<Option<Record>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", column_list(table), table.name);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode_row(table, &r)).transpose()
    }

    async fn select(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>> {
        filter.check_columns(table)?;

        let sql = format!(
            "SELECT {} FROM {}{}{}",
            column_list(table),
            table.name,
            where_sql(filter),
            order_sql(filter)
        );
        let rows = bind_filter(sqlx::query(&sql), table, filter)?
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| decode_row(table, r)).collect()
    }

    async fn count(&self, table: &Table, filter: &Filter) -> Result<u64> {
        filter.check_columns(table)?;

        let sql = format!("SELECT COUNT(*) AS n FROM {}{}", table.name, where_sql(filter));
        let row = bind_filter(sqlx::query(&sql), table, filter)?
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("n")?;

        Ok(count as u64)
    }

    async fn write(&self, batch: WriteBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let batch = &batch;
        let pool = &self.pool;
        retry_on_lock("write batch", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            // Rows in one batch may reference each other (topic parents)
            sqlx::query("PRAGMA defer_foreign_keys = ON")
                .execute(&mut *tx)
                .await?;
            let mut written = 0;

            for (table, records) in batch.entries() {
                let sql = upsert_sql(table);
                for record in records {
                    bind_record(sqlx::query(&sql), table, record)?
                        .execute(&mut *tx)
                        .await?;
                    written += 1;
                }
            }

            tx.commit().await?;
            Ok(written)
        })
        .await
    }

    async fn insert_missing(
        &self,
        table: &'static Table,
        key: &[&str],
        records: Vec<Record>,
    ) -> Result<usize> {
        let mut columns = Vec::with_capacity(key.len());
        for name in key {
            columns.push(table.get_column(name).ok_or_else(|| unknown_column(table, name))?);
        }
        if records.is_empty() {
            return Ok(0);
        }

        let exists_sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {}) AS present",
            table.name,
            key.iter().map(|c| format!("{} = ?", c)).collect::<Vec<_>>().join(" AND ")
        );
        let insert_sql = insert_ignore_sql(table);
        let records = &records;
        let columns = &columns;
        let pool = &self.pool;

        retry_on_lock("insert missing", self.max_lock_wait_ms, || {
            let exists_sql = exists_sql.as_str();
            let insert_sql = insert_sql.as_str();
            async move {
                let mut tx = pool.begin().await?;
                let mut inserted = 0;

                for record in records {
                    let mut probe = sqlx::query(exists_sql);
                    for column in columns.iter() {
                        let value = stored_value(column, record.get(column.name));
                        probe = bind_value(probe, column, &value)?;
                    }
                    let present: bool = probe.fetch_one(&mut *tx).await?.try_get("present")?;
                    if present {
                        continue;
                    }

                    let result = bind_record(sqlx::query(insert_sql), table, record)?
                        .execute(&mut *tx)
                        .await?;
                    inserted += result.rows_affected() as usize;
                }

                tx.commit().await?;
                Ok(inserted)
            }
        })
        .await
    }

    async fn delete(&self, plan: DeletePlan) -> Result<usize> {
        if plan.total() == 0 {
            return Ok(0);
        }

        let plan = &plan;
        let pool = &self.pool;
        retry_on_lock("delete rows", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            // Rows of self-referencing tables go in one plan entry; check at commit.
            sqlx::query("PRAGMA defer_foreign_keys = ON")
                .execute(&mut *tx)
                .await?;

            let mut deleted = 0;
            for (table, ids) in &plan.entries {
                for chunk in ids.chunks(DELETE_CHUNK) {
                    let sql = format!(
                        "DELETE FROM {} WHERE id IN ({})",
                        table.name,
                        vec!["?"; chunk.len()].join(", ")
                    );
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(id.to_string());
                    }
                    deleted += query.execute(&mut *tx).await?.rows_affected() as usize;
                }
            }

            tx.commit().await?;
            Ok(deleted)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_tables;
    use crate::db::tables::{DATASETS, STUDIES, TRANSFORMATIONS, VARIABLES};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await.unwrap();
        create_tables(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn study(id: Uuid, name: &str) -> Record {
        record(json!({"id": id, "name": name, "label": name.to_uppercase(), "config": {"lang": "en"}}))
    }

    #[test]
    fn test_upsert_sql_shape() {
        let sql = upsert_sql(&STUDIES);
        assert!(sql.starts_with("INSERT INTO studies (id, name,"));
        assert!(sql.contains("ON CONFLICT(id) DO UPDATE SET name = excluded.name"));
        assert!(!sql.contains("id = excluded.id"));
    }

    #[tokio::test]
    async fn test_upsert_fetch_round_trip() {
        let store = store().await;
        let id = Uuid::new_v4();

        store.upsert(&STUDIES, vec![study(id, "soep-core")]).await.unwrap();
        let row = store.fetch(&STUDIES, id).await.unwrap().unwrap();

        assert_eq!(row["name"], "soep-core");
        assert_eq!(row["label"], "SOEP-CORE");
        // Missing NOT NULL text falls back to empty string
        assert_eq!(row["description"], "");
        assert_eq!(row["current_commit"], Value::Null);
        assert_eq!(row["config"], json!({"lang": "en"}));
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let store = store().await;
        let id = Uuid::new_v4();

        store.upsert(&STUDIES, vec![study(id, "soep-core")]).await.unwrap();
        let mut changed = study(id, "soep-core");
        changed.insert("label".into(), json!("Changed"));
        store.upsert(&STUDIES, vec![changed]).await.unwrap();

        assert_eq!(store.count(&STUDIES, &Filter::new()).await.unwrap(), 1);
        let row = store.fetch(&STUDIES, id).await.unwrap().unwrap();
        assert_eq!(row["label"], "Changed");
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = store().await;
        let study_id = Uuid::new_v4();

        let mut batch = WriteBatch::new();
        batch.upsert(&STUDIES, vec![study(study_id, "a")]);
        // dataset pointing at a study that does not exist
        batch.upsert(
            &DATASETS,
            vec![record(json!({"id": Uuid::new_v4(), "study_id": Uuid::new_v4(), "name": "d"}))],
        );

        assert!(store.write(batch).await.is_err());
        assert!(store.fetch(&STUDIES, study_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_filter_order_and_paging() {
        let store = store().await;
        let records = ["c", "a", "b"]
            .iter()
            .map(|n| study(Uuid::new_v4(), n))
            .collect();
        store.upsert(&STUDIES, records).await.unwrap();

        let rows = store
            .select(&STUDIES, &Filter::new().order_by("name").limit(2).offset(1))
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "c"]);

        let rows = store
            .select(&STUDIES, &Filter::new().any_of("name", ["a", "c"]).order_by_desc("name"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "c");

        let none = store
            .select(&STUDIES, &Filter::new().any_of("name", Vec::<String>::new()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_insert_missing_skips_existing_pairs() {
        let store = store().await;
        let study_id = Uuid::new_v4();
        let dataset_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut batch = WriteBatch::new();
        batch.upsert(&STUDIES, vec![study(study_id, "s")]);
        batch.upsert(&DATASETS, vec![record(json!({"id": dataset_id, "study_id": study_id, "name": "d"}))]);
        batch.upsert(
            &VARIABLES,
            vec![
                record(json!({"id": a, "dataset_id": dataset_id, "name": "a"})),
                record(json!({"id": b, "dataset_id": dataset_id, "name": "b"})),
            ],
        );
        store.write(batch).await.unwrap();

        let pair = record(json!({"id": Uuid::new_v4(), "origin_id": a, "target_id": b}));
        let inserted = store
            .insert_missing(&TRANSFORMATIONS, &["origin_id", "target_id"], vec![pair.clone()])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let inserted = store
            .insert_missing(&TRANSFORMATIONS, &["origin_id", "target_id"], vec![pair])
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.count(&TRANSFORMATIONS, &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_plan() {
        let store = store().await;
        let id = Uuid::new_v4();
        store.upsert(&STUDIES, vec![study(id, "gone")]).await.unwrap();

        let plan = DeletePlan {
            entries: vec![(&*STUDIES, vec![id])],
        };
        assert_eq!(store.delete(plan).await.unwrap(), 1);
        assert!(store.fetch(&STUDIES, id).await.unwrap().is_none());
    }
}
