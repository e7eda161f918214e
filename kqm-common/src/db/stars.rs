//! Favorites ("stars")
//!
//! Owned by the account layer; the library only counts them.

use crate::Result;
use sqlx::SqlitePool;

/// Mark a media item as a favorite of a user. Starring twice is a no-op.
pub async fn add_star(pool: &SqlitePool, user_id: i64, media_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO stars (user_id, media_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(media_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn remove_star(pool: &SqlitePool, user_id: i64, media_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM stars WHERE user_id = ? AND media_id = ?")
        .bind(user_id)
        .bind(media_id)
        .execute(pool)
        .await?;

    Ok(())
}
