use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A completed playback event reported by the listening-history service.
///
/// Immutable once fetched. Items without a completion timestamp ("now
/// playing") are dropped at parse time and never reach this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningEvent {
    /// Epoch seconds; the canonical sortable field.
    pub timestamp: i64,
    /// Timestamp rendered in the user's timezone, for display only.
    pub local_time: DateTime<FixedOffset>,
    pub artist_name: String,
    pub artist_mbid: Option<String>,
    pub album_name: String,
    pub album_mbid: Option<String>,
    pub track_name: String,
    pub track_mbid: Option<String>,
}

/// Identity of catalog resolution: all events sharing a key share one
/// resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub artist_name: String,
    pub track_name: String,
}

impl TrackKey {
    pub fn new(artist_name: impl Into<String>, track_name: impl Into<String>) -> Self {
        Self {
            artist_name: artist_name.into(),
            track_name: track_name.into(),
        }
    }
}

/// One row of the unique-track library table.
///
/// Created once per key, populated once by the resolver and once by the
/// enricher. `track_id` stays `None` when the catalog search found no
/// candidate; such records are never retried within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub key: TrackKey,
    /// Count of listening events sharing this key.
    pub frequency: u64,
    pub track_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub popularity: Option<u8>,
    pub genre: Option<String>,
    pub features: Option<AudioFeatures>,
}

impl TrackRecord {
    pub fn new(key: TrackKey) -> Self {
        Self {
            key,
            frequency: 0,
            track_id: None,
            duration_ms: None,
            popularity: None,
            genre: None,
            features: None,
        }
    }

    /// A record is unmapped when resolution found no catalog candidate.
    pub fn is_unmapped(&self) -> bool {
        self.track_id.is_none()
    }
}

/// The fixed audio-descriptor vector describing a track's acoustic
/// character. Field names follow the catalog's feature endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub key: i32,
    pub loudness: f64,
    pub mode: i32,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
}

/// Result of left-joining a [`ListeningEvent`] with its [`TrackRecord`].
/// Catalog fields are `None` when resolution failed or found no match.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: ListeningEvent,
    pub track_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub popularity: Option<u8>,
    pub genre: Option<String>,
    pub features: Option<AudioFeatures>,
}
