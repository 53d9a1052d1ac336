//! Database initialization
//!
//! Opens the SQLite pool and creates the schema on first run. Schema
//! creation is idempotent so startup is safe to repeat.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::Result;

/// Open (creating if needed) the database at `db_path` and ensure the
/// schema exists.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| crate::Error::Write(format!("creating {}: {e}", parent.display())))?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    // WAL lets readers proceed while one writer commits
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. Each `:memory:` connection is a separate
/// database, so the pool is pinned to a single connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables if they do not exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_equivalence_graph_table(pool).await?;
    create_equivalence_member_table(pool).await?;
    create_schedule_block_table(pool).await?;
    create_equivalent_schedule_table(pool).await?;
    create_content_table(pool).await?;
    Ok(())
}

async fn create_equivalence_graph_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equivalence_graph (
            graph_id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Resource id -> graph id index. A resource belongs to at most one graph.
async fn create_equivalence_member_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equivalence_member (
            member_id TEXT PRIMARY KEY,
            graph_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_equivalence_member_graph ON equivalence_member (graph_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_schedule_block_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_block (
            source TEXT NOT NULL,
            channel TEXT NOT NULL,
            block_start TIMESTAMP NOT NULL,
            data TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (source, channel, block_start)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (source, channel, block, broadcast). Superseded broadcasts
/// are flagged inactive rather than deleted.
async fn create_equivalent_schedule_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equivalent_schedule (
            source TEXT NOT NULL,
            channel TEXT NOT NULL,
            block_start TIMESTAMP NOT NULL,
            broadcast_id TEXT NOT NULL,
            broadcast_start TIMESTAMP NOT NULL,
            item_id TEXT NOT NULL,
            broadcast TEXT NOT NULL,
            graph TEXT,
            content TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            schedule_update TEXT,
            equiv_update TEXT,
            PRIMARY KEY (source, channel, block_start, broadcast_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_equivalent_schedule_item ON equivalent_schedule (item_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_content_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
