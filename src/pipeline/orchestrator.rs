use anyhow::Context;
use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::apis::catalog::{CatalogApi, CatalogOutcome};
use crate::apis::lastfm::ScrobbleClient;
use crate::apis::session::CredentialSession;
use crate::domain::{EnrichedEvent, ListeningEvent, TrackKey, TrackRecord};
use crate::pipeline::enricher::enrich_library;
use crate::pipeline::resolver::resolve_library;

/// The reconciled output of a run: every fetched event with its catalog
/// fields, plus the unique-track library the fields came from.
#[derive(Debug)]
pub struct DatasetBundle {
    pub complete: Vec<EnrichedEvent>,
    pub library: Vec<TrackRecord>,
}

/// Drives fetch → dedup → resolve → enrich → join.
pub struct ScrobblePipeline {
    scrobbles: ScrobbleClient,
    catalog: Box<dyn CatalogApi>,
    page_size: u32,
}

impl ScrobblePipeline {
    pub fn new(scrobbles: ScrobbleClient, catalog: Box<dyn CatalogApi>, page_size: u32) -> Self {
        Self {
            scrobbles,
            catalog,
            page_size,
        }
    }

    /// Fetch a user's full listening history and enrich it with catalog
    /// metadata and audio features.
    pub async fn run(
        &self,
        session: &mut CredentialSession,
        username: &str,
        timezone: Tz,
        max_pages: u32,
    ) -> anyhow::Result<DatasetBundle> {
        let events = self
            .scrobbles
            .recent_tracks(username, timezone, self.page_size, max_pages)
            .await
            .context("fetching listening history")?;

        let mut library = build_library(&events);
        info!(
            events = events.len(),
            unique_tracks = library.len(),
            "deduplicated listening events"
        );

        let resolve_stats = resolve_library(self.catalog.as_ref(), session, &mut library).await;
        info!(
            resolved = resolve_stats.resolved,
            missed = resolve_stats.missed,
            token_refreshes = resolve_stats.token_refreshes,
            auth_rejected = resolve_stats.auth_rejected,
            errors = resolve_stats.errors,
            "catalog resolution finished"
        );

        let enrich_stats = enrich_library(self.catalog.as_ref(), session, &mut library).await;
        info!(
            enriched = enrich_stats.enriched,
            skipped = enrich_stats.skipped,
            missed = enrich_stats.missed,
            errors = enrich_stats.errors,
            "feature enrichment finished"
        );

        let complete = join_events(&events, &library);
        let (unmapped, total) = count_unmapped(&library);
        info!(unmapped, total, "library tracks without a catalog id");

        Ok(DatasetBundle { complete, library })
    }

    /// Fetch a playlist's tracks and enrich them the same way library rows
    /// are enriched. Each row gets frequency 1; the catalog listing already
    /// carries id, duration and popularity, so only genre and features are
    /// looked up.
    pub async fn playlist(
        &self,
        session: &mut CredentialSession,
        owner: &str,
        playlist_id: &str,
    ) -> anyhow::Result<Vec<TrackRecord>> {
        info!(owner, playlist_id, "fetching playlist");
        let entries = match self
            .catalog
            .playlist_tracks(owner, playlist_id, session)
            .await?
        {
            CatalogOutcome::Hit(entries) => entries,
            CatalogOutcome::Miss => {
                anyhow::bail!("playlist {}/{} not found", owner, playlist_id)
            }
            CatalogOutcome::AuthExpired => {
                if let Err(e) = self.catalog.refresh_session(session).await {
                    error!(error = %e, "credential refresh failed");
                }
                anyhow::bail!("catalog session expired while fetching the playlist; rerun")
            }
            CatalogOutcome::AuthRejected => {
                anyhow::bail!("catalog rejected authorization for the playlist fetch")
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut record =
                TrackRecord::new(TrackKey::new(entry.artist_name, entry.track_name));
            record.frequency = 1;
            record.track_id = Some(entry.track_id);
            record.duration_ms = Some(entry.duration_ms);
            record.popularity = Some(entry.popularity);

            if let Some(artist_id) = entry.artist_id {
                match self.catalog.artist_genre(&artist_id, session).await {
                    Ok(CatalogOutcome::Hit(genre)) => record.genre = genre,
                    Ok(CatalogOutcome::AuthExpired) => {
                        if let Err(e) = self.catalog.refresh_session(session).await {
                            error!(error = %e, "credential refresh failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%artist_id, error = %e, "genre lookup failed");
                    }
                }
            }
            records.push(record);
        }

        let enrich_stats = enrich_library(self.catalog.as_ref(), session, &mut records).await;
        info!(
            tracks = records.len(),
            enriched = enrich_stats.enriched,
            missed = enrich_stats.missed,
            "playlist enrichment finished"
        );

        Ok(records)
    }
}

/// Group events by (artist, track) into the unique-track library, counting
/// frequency. First-seen order is kept so output is stable across runs.
pub fn build_library(events: &[ListeningEvent]) -> Vec<TrackRecord> {
    let mut index: HashMap<TrackKey, usize> = HashMap::new();
    let mut library: Vec<TrackRecord> = Vec::new();

    for event in events {
        let key = TrackKey::new(event.artist_name.clone(), event.track_name.clone());
        match index.get(&key) {
            Some(&slot) => library[slot].frequency += 1,
            None => {
                let mut record = TrackRecord::new(key.clone());
                record.frequency = 1;
                index.insert(key, library.len());
                library.push(record);
            }
        }
    }

    library
}

/// Left-join the event sequence against the enriched library on
/// (artist, track). Every event yields exactly one output row, in input
/// order; events whose key resolution failed carry null catalog fields.
pub fn join_events(events: &[ListeningEvent], library: &[TrackRecord]) -> Vec<EnrichedEvent> {
    let by_key: HashMap<(&str, &str), &TrackRecord> = library
        .iter()
        .map(|record| {
            (
                (
                    record.key.artist_name.as_str(),
                    record.key.track_name.as_str(),
                ),
                record,
            )
        })
        .collect();

    events
        .iter()
        .map(|event| {
            let record = by_key
                .get(&(event.artist_name.as_str(), event.track_name.as_str()))
                .copied();
            EnrichedEvent {
                event: event.clone(),
                track_id: record.and_then(|r| r.track_id.clone()),
                duration_ms: record.and_then(|r| r.duration_ms),
                popularity: record.and_then(|r| r.popularity),
                genre: record.and_then(|r| r.genre.clone()),
                features: record.and_then(|r| r.features.clone()),
            }
        })
        .collect()
}

/// Diagnostic: how many library rows resolution failed to map, out of how
/// many total.
pub fn count_unmapped(library: &[TrackRecord]) -> (usize, usize) {
    let unmapped = library.iter().filter(|r| r.is_unmapped()).count();
    (unmapped, library.len())
}

/// The library rows without a catalog id.
pub fn unmapped_tracks(library: &[TrackRecord]) -> Vec<&TrackRecord> {
    library.iter().filter(|r| r.is_unmapped()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(timestamp: i64, artist: &str, track: &str) -> ListeningEvent {
        ListeningEvent {
            timestamp,
            local_time: chrono::Utc
                .timestamp_opt(timestamp, 0)
                .unwrap()
                .fixed_offset(),
            artist_name: artist.to_string(),
            artist_mbid: None,
            album_name: "Album".to_string(),
            album_mbid: None,
            track_name: track.to_string(),
            track_mbid: None,
        }
    }

    #[test]
    fn build_library_groups_and_counts() {
        let events = vec![
            event(100, "A", "X"),
            event(200, "A", "X"),
            event(300, "B", "Y"),
        ];
        let library = build_library(&events);

        assert_eq!(library.len(), 2);
        assert_eq!(library[0].key, TrackKey::new("A", "X"));
        assert_eq!(library[0].frequency, 2);
        assert_eq!(library[1].key, TrackKey::new("B", "Y"));
        assert_eq!(library[1].frequency, 1);
    }

    #[test]
    fn frequencies_sum_to_event_count() {
        let events = vec![
            event(1, "A", "X"),
            event(2, "B", "Y"),
            event(3, "A", "X"),
            event(4, "A", "Z"),
            event(5, "B", "Y"),
        ];
        let library = build_library(&events);
        let total: u64 = library.iter().map(|r| r.frequency).sum();
        assert_eq!(total as usize, events.len());
    }

    #[test]
    fn join_preserves_row_count_and_order() {
        let events = vec![
            event(100, "A", "X"),
            event(200, "A", "X"),
            event(300, "B", "Y"),
        ];
        let mut library = build_library(&events);
        library[0].track_id = Some("id-ax".to_string());
        library[0].popularity = Some(70);

        let complete = join_events(&events, &library);

        assert_eq!(complete.len(), events.len());
        let timestamps: Vec<i64> = complete.iter().map(|row| row.event.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn events_sharing_a_key_share_catalog_fields() {
        let events = vec![
            event(100, "A", "X"),
            event(200, "A", "X"),
            event(300, "B", "Y"),
        ];
        let mut library = build_library(&events);
        library[0].track_id = Some("id-ax".to_string());
        library[0].genre = Some("synthpop".to_string());

        let complete = join_events(&events, &library);

        assert_eq!(complete[0].track_id.as_deref(), Some("id-ax"));
        assert_eq!(complete[1].track_id.as_deref(), Some("id-ax"));
        assert_eq!(complete[0].genre, complete[1].genre);
        // the unresolved key joins with null fields instead of dropping
        assert!(complete[2].track_id.is_none());
    }

    #[test]
    fn count_unmapped_reports_null_ids() {
        let events = vec![event(1, "A", "X"), event(2, "B", "Y"), event(3, "C", "Z")];
        let mut library = build_library(&events);
        library[1].track_id = Some("id".to_string());

        assert_eq!(count_unmapped(&library), (2, 3));
        let unmapped = unmapped_tracks(&library);
        assert_eq!(unmapped.len(), 2);
        assert!(unmapped.iter().all(|r| r.is_unmapped()));
    }
}
