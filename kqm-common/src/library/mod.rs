//! Media library engine
//!
//! Stores artists and songs supplied by multiple providers and serves
//! deduplicated listings. Several rows may describe the same song
//! (same artist and title) from different providers; listings return one
//! representative row per song, chosen among enabled providers:
//!
//! 1. a row flagged preferred wins,
//! 2. otherwise (or among several preferred rows) the lowest provider priority,
//! 3. then the lowest media id.
//!
//! `MediaLibrary` holds no state besides the pool, so clones are cheap and
//! can be shared between request handlers and the scanner.

pub mod filter;
pub mod models;

pub use filter::{FilterClause, FilterOp, FilterTarget, FilterValue, MediaField, MediaFilter};
pub use models::{ArtistRecord, Library, MediaRecord, NewMedia, Normalized, RemoveSummary};

use crate::config::{LibraryConfig, DEFAULT_REMOVE_BATCH_SIZE};
use crate::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

/// Enabled-provider media, group aggregates, and per-group ranking.
/// The filter conditions are appended after `WHERE 1 = 1` in `ranked`.
const REPRESENTATIVE_HEAD: &str = r#"
WITH enabled AS (
    SELECT m.media_id, m.artist_id, m.title, m.duration, m.provider,
           m.provider_data, m.is_preferred, p.priority
    FROM media m
    JOIN providers p ON p.name = m.provider
    WHERE p.is_enabled = 1
),
group_stats AS (
    SELECT e.artist_id, e.title,
           COUNT(DISTINCT e.provider) AS num_media,
           COUNT(s.media_id) AS num_stars
    FROM enabled e
    LEFT JOIN stars s ON s.media_id = e.media_id
    GROUP BY e.artist_id, e.title
),
ranked AS (
    SELECT e.media_id, e.artist_id, e.title, e.duration, e.provider,
           ROW_NUMBER() OVER (
               PARTITION BY e.artist_id, e.title
               ORDER BY e.is_preferred DESC, e.priority ASC, e.media_id ASC
           ) AS pick
    FROM enabled e
    WHERE 1 = 1"#;

const REPRESENTATIVE_TAIL: &str = r#"
)
SELECT r.media_id, r.artist_id, a.name AS artist, r.title, r.duration, r.provider,
       g.num_media, g.num_stars
FROM ranked r
JOIN artists a ON a.artist_id = r.artist_id
JOIN group_stats g ON g.artist_id = r.artist_id AND g.title = r.title
WHERE r.pick = 1
ORDER BY a.name, r.title, r.media_id
"#;

/// Data access and query engine over the library database
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    pool: SqlitePool,
    remove_batch_size: usize,
}

impl MediaLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            remove_batch_size: DEFAULT_REMOVE_BATCH_SIZE,
        }
    }

    /// Library using the `[library]` section of the config file
    pub fn from_config(pool: SqlitePool, config: &LibraryConfig) -> Self {
        Self::new(pool).with_batch_size(config.remove_batch_size)
    }

    /// Override how many ids one DELETE statement binds (minimum 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.remove_batch_size = batch_size.max(1);
        self
    }

    pub fn remove_batch_size(&self) -> usize {
        self.remove_batch_size
    }

    /// Artists and songs in a form suitable for sending to clients: one
    /// representative media item per song, sorted by artist then title.
    pub async fn get_library(&self) -> Result<Library> {
        let rows = self.representatives(&MediaFilter::new()).await?;

        let mut library = Library::default();
        for media in rows {
            match library.artists.get_mut(media.artist_id) {
                Some(artist) => artist.media_ids.push(media.media_id),
                None => library.artists.push(
                    media.artist_id,
                    ArtistRecord {
                        artist_id: media.artist_id,
                        name: media.artist.clone(),
                        media_ids: vec![media.media_id],
                    },
                ),
            }
            library.media.push(media.media_id, media);
        }

        debug!(
            "Library listing: {} artists, {} songs",
            library.artists.len(),
            library.media.len()
        );
        Ok(library)
    }

    /// Representative media items among rows matching every filter clause
    pub async fn get_media(&self, filter: &MediaFilter) -> Result<Normalized<MediaRecord>> {
        let mut media = Normalized::default();
        for record in self.representatives(filter).await? {
            media.push(record.media_id, record);
        }
        Ok(media)
    }

    async fn representatives(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(REPRESENTATIVE_HEAD);
        filter.push_conditions(&mut qb)?;
        qb.push(REPRESENTATIVE_TAIL);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(media_from_row).collect()
    }

    /// Add one provider-supplied song version, creating its artist if needed.
    /// Returns the new media id.
    pub async fn add(&self, item: &NewMedia) -> Result<i64> {
        let media = item.validate()?;

        let mut tx = self.pool.begin().await?;
        let artist_id = resolve_artist(&mut *tx, media.artist).await?;

        let media_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO media (artist_id, title, duration, provider, provider_data, is_preferred)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING media_id
            "#,
        )
        .bind(artist_id)
        .bind(media.title)
        .bind(media.duration)
        .bind(media.provider)
        .bind(&media.provider_data)
        .bind(media.is_preferred)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Added media {}: {} - {} ({})",
            media_id, media.artist, media.title, media.provider
        );
        Ok(media_id)
    }

    /// Delete media items in batches of at most `remove_batch_size` ids.
    ///
    /// Batches run one after another. A failed batch stops the loop: earlier
    /// batches stay committed and later ones are not attempted.
    pub async fn remove(&self, media_ids: &[i64]) -> Result<RemoveSummary> {
        let mut summary = RemoveSummary::default();

        for batch in media_ids.chunks(self.remove_batch_size) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM media WHERE media_id IN (");
            let mut ids = qb.separated(", ");
            for id in batch {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");

            let result = qb.build().execute(&self.pool).await.map_err(|e| {
                warn!(
                    "Remove batch {} failed after {} deleted: {}",
                    summary.batches + 1,
                    summary.deleted,
                    e
                );
                e
            })?;

            summary.batches += 1;
            summary.deleted += result.rows_affected();
            debug!(
                "Remove batch {}: {} ids, {} deleted",
                summary.batches,
                batch.len(),
                result.rows_affected()
            );
        }

        Ok(summary)
    }
}

/// Insert-or-fetch an artist by exact name inside the caller's transaction.
///
/// The UNIQUE(name) constraint makes the insert the arbiter: concurrent
/// callers adding the same new name all end up with the one row that won.
async fn resolve_artist(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO artists (name) VALUES (?) ON CONFLICT(name) DO NOTHING RETURNING artist_id",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(artist_id) = inserted {
        debug!("new artist: {}", name);
        return Ok(artist_id);
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT artist_id FROM artists WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(artist_id) => {
            debug!("matched artist: {}", name);
            Ok(artist_id)
        }
        None => Err(Error::Concurrency(format!(
            "Artist {:?} conflicted on insert but was not found",
            name
        ))),
    }
}

fn media_from_row(row: &SqliteRow) -> Result<MediaRecord> {
    Ok(MediaRecord {
        media_id: row.try_get("media_id")?,
        artist_id: row.try_get("artist_id")?,
        artist: row.try_get("artist")?,
        title: row.try_get("title")?,
        duration: row.try_get("duration")?,
        provider: row.try_get("provider")?,
        num_media: row.try_get("num_media")?,
        num_stars: row.try_get("num_stars")?,
    })
}
