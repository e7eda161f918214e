//! Provider configuration
//!
//! Providers are managed outside the library engine (settings UI, admin
//! tools). The library only reads them, on every query, so a change here is
//! visible to the next listing without restarting anything.

use crate::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A media provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub name: String,
    pub is_enabled: bool,
    /// Lower values win when several providers supply the same song
    pub priority: i64,
}

impl Provider {
    pub fn new(name: impl Into<String>, priority: i64) -> Self {
        Self {
            name: name.into(),
            is_enabled: true,
            priority,
        }
    }
}

/// All providers ordered by priority, then name
pub async fn list_providers(pool: &SqlitePool) -> Result<Vec<Provider>> {
    let rows = sqlx::query(
        "SELECT name, is_enabled, priority FROM providers ORDER BY priority, name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Provider> {
            Ok(Provider {
                name: row.try_get("name")?,
                is_enabled: row.try_get("is_enabled")?,
                priority: row.try_get("priority")?,
            })
        })
        .collect()
}

/// Insert a provider or overwrite its enablement and priority
pub async fn upsert_provider(pool: &SqlitePool, provider: &Provider) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO providers (name, is_enabled, priority)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            is_enabled = excluded.is_enabled,
            priority = excluded.priority
        "#,
    )
    .bind(&provider.name)
    .bind(provider.is_enabled)
    .bind(provider.priority)
    .execute(pool)
    .await?;

    Ok(())
}

/// Enable or disable a provider. Returns false if no such provider exists.
pub async fn set_provider_enabled(pool: &SqlitePool, name: &str, enabled: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE providers SET is_enabled = ? WHERE name = ?")
        .bind(enabled)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
