//! Database initialization
//!
//! Opens (or creates) the SQLite file, applies connection pragmas, creates
//! every table from its definition and adds columns that newer definitions
//! introduced.

use super::schema_sync;
use super::tables::all_tables;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Open the database at `db_path` and bring its schema up to date
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_tables(&pool).await?;
    sync_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema (single connection)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_tables(&pool).await?;
    Ok(pool)
}

/// `CREATE TABLE IF NOT EXISTS` plus foreign key indexes for every table
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    for table in all_tables() {
        sqlx::query(&table.create_table_sql()).execute(pool).await?;
        for index in table.create_index_sql() {
            sqlx::query(&index).execute(pool).await?;
        }
    }
    Ok(())
}

/// Add columns missing from existing tables
pub async fn sync_tables(pool: &SqlitePool) -> Result<()> {
    let mut added = 0;
    for table in all_tables() {
        added += schema_sync::sync_table(pool, table).await?;
    }
    if added > 0 {
        info!(columns = added, "Schema synchronized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema_sync::table_exists;

    #[tokio::test]
    async fn test_init_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ddi.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());
        for table in all_tables() {
            assert!(
                table_exists(&pool, table.name).await.unwrap(),
                "missing {}",
                table.name
            );
        }

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.unwrap();
        assert_eq!(fk, 1);
        pool.close().await;

        // Reopening is idempotent
        let pool = init_database(&db_path).await.unwrap();
        pool.close().await;
    }
}
