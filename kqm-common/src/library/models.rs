//! Library records as handed to callers
//!
//! None of these carry `provider_data`; it never leaves the query layer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered ids plus an id → record lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalized<T> {
    pub result: Vec<i64>,
    pub entities: BTreeMap<i64, T>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            result: Vec::new(),
            entities: BTreeMap::new(),
        }
    }
}

impl<T> Normalized<T> {
    pub fn push(&mut self, id: i64, entity: T) {
        if self.entities.insert(id, entity).is_none() {
            self.result.push(id);
        }
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    /// Records in `result` order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.result.iter().filter_map(|id| self.entities.get(id))
    }
}

/// Representative media item for one (artist, title) song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub media_id: i64,
    pub artist_id: i64,
    /// Artist name, denormalized
    pub artist: String,
    pub title: String,
    /// Seconds
    pub duration: i64,
    pub provider: String,
    /// Number of enabled providers supplying this song
    pub num_media: i64,
    /// Favorites across every enabled version of this song
    pub num_stars: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRecord {
    pub artist_id: i64,
    pub name: String,
    /// Representative media ids, in listing order
    pub media_ids: Vec<i64>,
}

/// Complete catalog for clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub artists: Normalized<ArtistRecord>,
    pub media: Normalized<MediaRecord>,
}

/// What a `remove` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveSummary {
    /// DELETE statements issued
    pub batches: usize,
    /// Rows actually deleted
    pub deleted: u64,
}

/// A song version reported by a provider, as received from the scanner.
///
/// Fields are optional so a partial payload deserializes and can be rejected
/// with its contents in the error message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<Value>,
    #[serde(default)]
    pub is_preferred: bool,
}

impl NewMedia {
    pub fn new(
        artist: impl Into<String>,
        title: impl Into<String>,
        duration: f64,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            artist: Some(artist.into()),
            title: Some(title.into()),
            duration: Some(duration),
            provider: Some(provider.into()),
            provider_data: None,
            is_preferred: false,
        }
    }

    pub fn with_provider_data(mut self, provider_data: Value) -> Self {
        self.provider_data = Some(provider_data);
        self
    }

    pub fn preferred(mut self) -> Self {
        self.is_preferred = true;
        self
    }

    /// Check required fields and normalize for storage
    pub(crate) fn validate(&self) -> Result<ValidMedia<'_>> {
        let artist = non_empty(&self.artist);
        let title = non_empty(&self.title);
        let provider = non_empty(&self.provider);
        let duration = self.duration.filter(|d| d.is_finite() && *d > 0.0);

        match (artist, title, duration, provider) {
            (Some(artist), Some(title), Some(duration), Some(provider)) => {
                let provider_data = match &self.provider_data {
                    Some(value) => serde_json::to_string(value)
                        .map_err(|e| Error::Validation(format!("Invalid provider data: {}", e)))?,
                    None => "{}".to_string(),
                };

                Ok(ValidMedia {
                    artist,
                    title,
                    duration: duration.round() as i64,
                    provider,
                    provider_data,
                    is_preferred: self.is_preferred,
                })
            }
            _ => Err(Error::Validation(format!(
                "Invalid media data: {}",
                serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
            ))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// A validated `NewMedia`, ready to insert
#[derive(Debug)]
pub(crate) struct ValidMedia<'a> {
    pub artist: &'a str,
    pub title: &'a str,
    pub duration: i64,
    pub provider: &'a str,
    /// JSON text
    pub provider_data: String,
    pub is_preferred: bool,
}
