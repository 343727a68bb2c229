//! Schema synchronization
//!
//! Tables are created from their [`Table`] definitions with
//! `CREATE TABLE IF NOT EXISTS`. A definition that later gains a column is
//! reconciled here: the column is appended with `ALTER TABLE ADD COLUMN`.
//! Type and constraint drift on existing columns is only logged; SQLite
//! needs a table rebuild to change those.

use super::schema::{Column, ColumnKind, Table};
use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct LiveColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// How a stored table differs from its definition
#[derive(Debug, Clone, PartialEq)]
pub enum Drift<'a> {
    /// Not in the database yet; added by [`sync_table`]
    Missing(&'a Column),
    /// Stored with a different type affinity
    Affinity { column: &'a str, stored: String },
    /// Declared NOT NULL, stored nullable
    Nullable { column: &'a str },
}

/// Live columns of `table`, in declaration order
pub async fn live_columns(pool: &SqlitePool, table: &str) -> Result<Vec<LiveColumn>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;

    let mut ordered: Vec<(i64, LiveColumn)> = rows
        .iter()
        .map(|row| {
            (
                row.get::<i64, _>("cid"),
                LiveColumn {
                    name: row.get("name"),
                    declared_type: row.get("type"),
                    not_null: row.get::<i64, _>("notnull") != 0,
                    primary_key: row.get::<i64, _>("pk") != 0,
                },
            )
        })
        .collect();
    ordered.sort_by_key(|(cid, _)| *cid);
    Ok(ordered.into_iter().map(|(_, column)| column).collect())
}

pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

/// SQLite affinity of a declared type, per the rules of `CREATE TABLE`
fn affinity(declared: &str) -> &'static str {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        "INTEGER"
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| upper.contains(t)) {
        "TEXT"
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| upper.contains(t)) {
        "REAL"
    } else {
        "NUMERIC"
    }
}

/// True when `declared` stores values the way `kind` expects
pub fn kind_matches(kind: ColumnKind, declared: &str) -> bool {
    affinity(kind.sql_type()) == affinity(declared)
}

/// Differences between `table` and what is stored
pub fn drift<'a>(table: &'a Table, live: &[LiveColumn]) -> Vec<Drift<'a>> {
    table
        .columns
        .iter()
        .filter_map(|column| {
            let Some(stored) = live.iter().find(|l| l.name == column.name) else {
                return Some(Drift::Missing(column));
            };
            if !kind_matches(column.kind, &stored.declared_type) {
                Some(Drift::Affinity {
                    column: column.name,
                    stored: stored.declared_type.clone(),
                })
            } else if !column.nullable && !stored.not_null && !stored.primary_key {
                Some(Drift::Nullable { column: column.name })
            } else {
                None
            }
        })
        .collect()
}

/// Append missing columns to `table`
///
/// Returns the number of columns added. A table that does not exist yet
/// is left to `create_tables`.
pub async fn sync_table(pool: &SqlitePool, table: &Table) -> Result<usize> {
    if !table_exists(pool, table.name).await? {
        warn!(table = table.name, "Table missing during schema sync");
        return Ok(0);
    }

    let live = live_columns(pool, table.name).await?;
    let mut added = 0;
    for change in drift(table, &live) {
        match change {
            Drift::Missing(column) => {
                add_column(pool, table.name, column).await?;
                added += 1;
            }
            Drift::Affinity { column, stored } => warn!(
                table = table.name,
                column,
                expected = column_type(table, column),
                stored = %stored,
                "Column stored with another type, rebuild the table to migrate"
            ),
            Drift::Nullable { column } => warn!(
                table = table.name,
                column,
                "Column stored without NOT NULL, rebuild the table to migrate"
            ),
        }
    }

    if added == 0 {
        debug!(table = table.name, "Schema up to date");
    }
    Ok(added)
}

fn column_type(table: &Table, name: &str) -> &'static str {
    table
        .columns
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.kind.sql_type())
        .unwrap_or("?")
}

/// `ALTER TABLE ADD COLUMN` for one definition
///
/// SQLite only adds NOT NULL columns that carry a default, and never adds
/// key or REFERENCES constraints; those parts of the definition are dropped.
async fn add_column(pool: &SqlitePool, table: &str, column: &Column) -> Result<()> {
    let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, column.kind.sql_type());
    match column.default {
        Some(default) if !column.nullable => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
        Some(default) => sql.push_str(&format!(" DEFAULT {}", default)),
        None if !column.nullable => {
            warn!(table, column = column.name, "No default, adding NOT NULL column as nullable")
        }
        None => {}
    }

    info!(table, column = column.name, "Adding column");
    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => Ok(()),
        // Another process got there first
        Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn periods_v2() -> Table {
        Table::new("periods")
            .column(Column::text("name"))
            .column(Column::text("label"))
            .column(Column::text("definition"))
    }

    #[test]
    fn test_kind_matches_by_affinity() {
        assert!(kind_matches(ColumnKind::Text, "text"));
        assert!(kind_matches(ColumnKind::Uuid, "VARCHAR(36)"));
        assert!(kind_matches(ColumnKind::Boolean, "BIGINT"));
        assert!(kind_matches(ColumnKind::Real, "DOUBLE"));
        assert!(!kind_matches(ColumnKind::Json, "INTEGER"));
        assert!(!kind_matches(ColumnKind::Real, "TEXT"));
    }

    #[tokio::test]
    async fn test_missing_column_is_added_with_default() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE periods (id TEXT PRIMARY KEY NOT NULL, name TEXT NOT NULL DEFAULT '', label TEXT NOT NULL DEFAULT '')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO periods (id, name) VALUES ('p1', '2010')")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(sync_table(&pool, &periods_v2()).await.unwrap(), 1);

        let columns = live_columns(&pool, "periods").await.unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[3].name, "definition");
        assert!(columns[3].not_null);

        let value: String = sqlx::query_scalar("SELECT definition FROM periods WHERE id = 'p1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value, "");

        assert_eq!(sync_table(&pool, &periods_v2()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_type_and_null_drift_is_reported_only() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE periods (id TEXT PRIMARY KEY NOT NULL, name INTEGER, label TEXT, definition TEXT NOT NULL DEFAULT '')")
            .execute(&pool)
            .await
            .unwrap();

        let table = periods_v2();
        let live = live_columns(&pool, "periods").await.unwrap();
        let found = drift(&table, &live);

        assert!(found.contains(&Drift::Affinity { column: "name", stored: "INTEGER".to_string() }));
        assert!(found.contains(&Drift::Nullable { column: "label" }));
        assert_eq!(found.len(), 2);
        assert_eq!(sync_table(&pool, &table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_table_is_skipped() {
        let pool = memory_pool().await;
        assert!(!table_exists(&pool, "periods").await.unwrap());
        assert_eq!(sync_table(&pool, &periods_v2()).await.unwrap(), 0);
    }
}
