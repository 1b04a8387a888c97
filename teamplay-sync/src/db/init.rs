//! Database initialization

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use teamplay_common::Result;
use tracing::info;

/// Open (creating if needed) the database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
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

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables if missing (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            current_song_index INTEGER NOT NULL DEFAULT -1,
            is_playing INTEGER NOT NULL DEFAULT 0,
            started_at_utc TEXT,
            elapsed_seconds REAL NOT NULL DEFAULT 0.0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            guid TEXT PRIMARY KEY,
            team_guid TEXT NOT NULL REFERENCES teams(guid) ON DELETE CASCADE,
            link TEXT NOT NULL,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            rating INTEGER NOT NULL DEFAULT 0,
            uploaded_by TEXT NOT NULL,
            inserted_at TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_team ON songs(team_guid, position)")
        .execute(pool)
        .await?;

    Ok(())
}
