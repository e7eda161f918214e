//! Database initialization
//!
//! Opens (creating if needed) the library database and ensures the schema
//! exists. Every `CREATE` is idempotent, so this runs on every start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Per-connection PRAGMAs go through the connect options so every pooled
    // connection gets them, not just the one that happens to run a query.
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
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

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all library tables on an already-open pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_providers_table(pool).await?;
    create_artists_table(pool).await?;
    create_media_table(pool).await?;
    create_stars_table(pool).await?;
    Ok(())
}

/// Providers are configuration: enablement and duplicate ordering
pub async fn create_providers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS providers (
            name TEXT PRIMARY KEY,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            pref TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    // UNIQUE(name) backs the atomic insert-or-fetch in MediaLibrary::add.
    // Default BINARY collation keeps the match case-sensitive.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            artist_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_media_table(pool: &SqlitePool) -> Result<()> {
    // AUTOINCREMENT: media ids are never reused after a delete
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            media_id INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id INTEGER NOT NULL REFERENCES artists(artist_id),
            title TEXT NOT NULL,
            duration INTEGER NOT NULL,
            provider TEXT NOT NULL,
            provider_data TEXT NOT NULL DEFAULT '{}',
            is_preferred INTEGER NOT NULL DEFAULT 0,
            date_added TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_song ON media(artist_id, title)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_provider ON media(provider)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_stars_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stars (
            user_id INTEGER NOT NULL,
            media_id INTEGER NOT NULL REFERENCES media(media_id) ON DELETE CASCADE,
            PRIMARY KEY (user_id, media_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stars_media ON stars(media_id)")
        .execute(pool)
        .await?;

    Ok(())
}
