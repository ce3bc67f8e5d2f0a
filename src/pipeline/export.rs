use std::fmt::Display;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::domain::{AudioFeatures, EnrichedEvent, TrackRecord};
use crate::error::Result;

const FEATURE_COLUMNS: [&str; 11] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
];

/// Write the complete table: one row per listening event, event fields
/// followed by the joined catalog fields, nulls rendered empty.
pub async fn write_complete_csv(path: &Path, events: &[EnrichedEvent]) -> Result<()> {
    let mut out = String::new();
    out.push_str(
        "timestamp,local_time,artist_name,artist_mbid,album_name,album_mbid,track_name,track_mbid,track_id,duration_ms,popularity,genre,",
    );
    out.push_str(&FEATURE_COLUMNS.join(","));
    out.push('\n');

    for row in events {
        let mut fields = vec![
            row.event.timestamp.to_string(),
            row.event.local_time.to_rfc3339(),
            text_field(&row.event.artist_name),
            opt_text_field(&row.event.artist_mbid),
            text_field(&row.event.album_name),
            opt_text_field(&row.event.album_mbid),
            text_field(&row.event.track_name),
            opt_text_field(&row.event.track_mbid),
            opt_text_field(&row.track_id),
            opt_field(&row.duration_ms),
            opt_field(&row.popularity),
            opt_text_field(&row.genre),
        ];
        fields.extend(feature_fields(&row.features));
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    write_file(path, &out).await?;
    info!(rows = events.len(), path = %path.display(), "wrote complete table");
    Ok(())
}

/// Write the unique-track library table.
pub async fn write_library_csv(path: &Path, library: &[TrackRecord]) -> Result<()> {
    let mut out = String::new();
    out.push_str("artist_name,track_name,frequency,track_id,duration_ms,popularity,genre,");
    out.push_str(&FEATURE_COLUMNS.join(","));
    out.push('\n');

    for record in library {
        let mut fields = vec![
            text_field(&record.key.artist_name),
            text_field(&record.key.track_name),
            record.frequency.to_string(),
            opt_text_field(&record.track_id),
            opt_field(&record.duration_ms),
            opt_field(&record.popularity),
            opt_text_field(&record.genre),
        ];
        fields.extend(feature_fields(&record.features));
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    write_file(path, &out).await?;
    info!(rows = library.len(), path = %path.display(), "wrote library table");
    Ok(())
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

fn feature_fields(features: &Option<AudioFeatures>) -> Vec<String> {
    match features {
        Some(f) => vec![
            f.danceability.to_string(),
            f.energy.to_string(),
            f.key.to_string(),
            f.loudness.to_string(),
            f.mode.to_string(),
            f.speechiness.to_string(),
            f.acousticness.to_string(),
            f.instrumentalness.to_string(),
            f.liveness.to_string(),
            f.valence.to_string(),
            f.tempo.to_string(),
        ],
        None => vec![String::new(); FEATURE_COLUMNS.len()],
    }
}

/// Quote a text field when it would break the delimited format.
fn text_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn opt_text_field(value: &Option<String>) -> String {
    value.as_deref().map(text_field).unwrap_or_default()
}

fn opt_field<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}
