use tracing::{debug, error, warn};

use crate::apis::catalog::{CatalogApi, CatalogOutcome};
use crate::apis::session::CredentialSession;
use crate::domain::TrackRecord;

/// Counters for one feature-enrichment pass over the library.
#[derive(Debug, Default, PartialEq)]
pub struct EnrichStats {
    pub enriched: usize,
    /// Records skipped outright because resolution left no catalog id.
    pub skipped: usize,
    /// Feature lookups that came back empty or malformed.
    pub missed: usize,
    pub token_refreshes: usize,
    pub auth_rejected: usize,
    pub errors: usize,
}

/// Populate the audio-descriptor vector for every resolved record, one
/// lookup per record.
///
/// Unresolved records are skipped without a network call and keep the
/// all-null vector. Batching several ids per call is a known future
/// optimization; the enricher deliberately issues one call per record.
pub async fn enrich_library(
    catalog: &dyn CatalogApi,
    session: &mut CredentialSession,
    library: &mut [TrackRecord],
) -> EnrichStats {
    let mut stats = EnrichStats::default();

    for record in library.iter_mut() {
        let Some(track_id) = record.track_id.clone() else {
            debug!(track = %record.key.track_name, "no catalog id, skipping feature lookup");
            stats.skipped += 1;
            continue;
        };

        match catalog.audio_features(&track_id, session).await {
            Ok(CatalogOutcome::Hit(features)) => {
                record.features = Some(features);
                stats.enriched += 1;
            }
            Ok(CatalogOutcome::Miss) => {
                warn!(track = %record.key.track_name, "feature lookup returned nothing");
                stats.missed += 1;
            }
            Ok(CatalogOutcome::AuthExpired) => {
                match catalog.refresh_session(session).await {
                    Ok(()) => stats.token_refreshes += 1,
                    Err(e) => error!(error = %e, "credential refresh failed"),
                }
            }
            Ok(CatalogOutcome::AuthRejected) => {
                warn!(track = %record.key.track_name, "catalog rejected authorization");
                stats.auth_rejected += 1;
            }
            Err(e) => {
                warn!(track = %record.key.track_name, error = %e, "feature lookup failed");
                stats.errors += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::catalog::{PlaylistEntry, TrackHit};
    use crate::domain::{AudioFeatures, TrackKey};
    use crate::error::Result;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    fn features() -> AudioFeatures {
        AudioFeatures {
            danceability: 0.7,
            energy: 0.8,
            key: 4,
            loudness: -6.5,
            mode: 1,
            speechiness: 0.05,
            acousticness: 0.1,
            instrumentalness: 0.6,
            liveness: 0.12,
            valence: 0.9,
            tempo: 123.0,
        }
    }

    struct ScriptedFeatures {
        outcomes: Mutex<Vec<CatalogOutcome<AudioFeatures>>>,
        feature_calls: Mutex<usize>,
        refresh_calls: Mutex<usize>,
    }

    impl ScriptedFeatures {
        fn new(outcomes: Vec<CatalogOutcome<AudioFeatures>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                feature_calls: Mutex::new(0),
                refresh_calls: Mutex::new(0),
            }
        }

        fn feature_calls(&self) -> usize {
            *self.feature_calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl CatalogApi for ScriptedFeatures {
        async fn search_track(
            &self,
            _artist: &str,
            _track: &str,
            _session: &CredentialSession,
        ) -> Result<CatalogOutcome<TrackHit>> {
            Ok(CatalogOutcome::Miss)
        }

        async fn artist_genre(
            &self,
            _artist_id: &str,
            _session: &CredentialSession,
        ) -> Result<CatalogOutcome<Option<String>>> {
            Ok(CatalogOutcome::Miss)
        }

        async fn audio_features(
            &self,
            _track_id: &str,
            _session: &CredentialSession,
        ) -> Result<CatalogOutcome<AudioFeatures>> {
            *self.feature_calls.lock().unwrap() += 1;
            Ok(self.outcomes.lock().unwrap().remove(0))
        }

        async fn playlist_tracks(
            &self,
            _owner: &str,
            _playlist_id: &str,
            _session: &CredentialSession,
        ) -> Result<CatalogOutcome<Vec<PlaylistEntry>>> {
            Ok(CatalogOutcome::Miss)
        }

        async fn refresh_session(&self, session: &mut CredentialSession) -> Result<()> {
            *self.refresh_calls.lock().unwrap() += 1;
            session.apply(crate::apis::session::TokenGrant {
                access_token: "fresh".to_string(),
                expires_in: 3600,
                refresh_token: None,
            });
            Ok(())
        }
    }

    fn resolved_record(artist: &str, track: &str, id: &str) -> TrackRecord {
        let mut record = TrackRecord::new(TrackKey::new(artist, track));
        record.frequency = 1;
        record.track_id = Some(id.to_string());
        record
    }

    fn session() -> CredentialSession {
        CredentialSession::new("tok".into(), "refresh".into(), Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn unresolved_record_skipped_without_network_call() {
        let catalog = ScriptedFeatures::new(vec![]);
        let mut records = vec![TrackRecord::new(TrackKey::new("A", "X"))];
        let mut session = session();

        let stats = enrich_library(&catalog, &mut session, &mut records).await;

        assert_eq!(stats.skipped, 1);
        assert_eq!(catalog.feature_calls(), 0);
        assert!(records[0].features.is_none());
    }

    #[tokio::test]
    async fn populates_feature_vector_for_resolved_records() {
        let catalog = ScriptedFeatures::new(vec![CatalogOutcome::Hit(features())]);
        let mut records = vec![resolved_record("A", "X", "id-1")];
        let mut session = session();

        let stats = enrich_library(&catalog, &mut session, &mut records).await;

        assert_eq!(stats.enriched, 1);
        assert_eq!(records[0].features, Some(features()));
    }

    #[tokio::test]
    async fn empty_lookup_leaves_all_null_vector_and_counts_miss() {
        let catalog = ScriptedFeatures::new(vec![
            CatalogOutcome::Miss,
            CatalogOutcome::Hit(features()),
        ]);
        let mut records = vec![
            resolved_record("A", "X", "id-1"),
            resolved_record("B", "Y", "id-2"),
        ];
        let mut session = session();

        let stats = enrich_library(&catalog, &mut session, &mut records).await;

        assert_eq!(stats.missed, 1);
        assert_eq!(stats.enriched, 1);
        assert!(records[0].features.is_none());
        assert!(records[1].features.is_some());
    }

    #[tokio::test]
    async fn expired_credential_refreshes_and_moves_on() {
        let catalog = ScriptedFeatures::new(vec![
            CatalogOutcome::AuthExpired,
            CatalogOutcome::Hit(features()),
        ]);
        let mut records = vec![
            resolved_record("A", "X", "id-1"),
            resolved_record("B", "Y", "id-2"),
        ];
        let mut session =
            CredentialSession::new("old".into(), "refresh".into(), Utc::now() - Duration::hours(1));

        let stats = enrich_library(&catalog, &mut session, &mut records).await;

        assert_eq!(stats.token_refreshes, 1);
        assert!(!session.is_expired());
        // failed record keeps its null vector, was not retried
        assert!(records[0].features.is_none());
        assert!(records[1].features.is_some());
        assert_eq!(catalog.feature_calls(), 2);
    }
}
