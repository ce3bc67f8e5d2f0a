use tracing::{debug, error, warn};

use crate::apis::catalog::{CatalogApi, CatalogOutcome};
use crate::apis::session::CredentialSession;
use crate::domain::TrackRecord;
use crate::pipeline::normalize::normalize;

/// Counters for one resolution pass over the library.
#[derive(Debug, Default, PartialEq)]
pub struct ResolveStats {
    pub resolved: usize,
    /// Records the catalog had no candidate for.
    pub missed: usize,
    pub token_refreshes: usize,
    pub auth_rejected: usize,
    /// Transport or decode failures, counted and skipped.
    pub errors: usize,
}

/// Resolve every library record against the catalog, one at a time.
///
/// Each record is visited exactly once. A record that fails — no candidate,
/// auth rejection, transport error — keeps whatever partial state it has and
/// is never revisited; an expired-credential rejection triggers one refresh
/// so that subsequent records use the new token.
pub async fn resolve_library(
    catalog: &dyn CatalogApi,
    session: &mut CredentialSession,
    library: &mut [TrackRecord],
) -> ResolveStats {
    let mut stats = ResolveStats::default();

    for record in library.iter_mut() {
        let artist = normalize(&record.key.artist_name);
        let track = normalize(&record.key.track_name);
        debug!(%artist, %track, "resolving catalog id");

        let hit = match catalog.search_track(&artist, &track, session).await {
            Ok(CatalogOutcome::Hit(hit)) => hit,
            Ok(CatalogOutcome::Miss) => {
                warn!(track = %record.key.track_name, "no catalog candidate");
                stats.missed += 1;
                continue;
            }
            Ok(CatalogOutcome::AuthExpired) => {
                refresh(catalog, session, &mut stats).await;
                continue;
            }
            Ok(CatalogOutcome::AuthRejected) => {
                warn!(track = %record.key.track_name, "catalog rejected authorization");
                stats.auth_rejected += 1;
                continue;
            }
            Err(e) => {
                warn!(track = %record.key.track_name, error = %e, "catalog search failed");
                stats.errors += 1;
                continue;
            }
        };

        record.track_id = Some(hit.track_id);
        record.duration_ms = Some(hit.duration_ms);
        record.popularity = Some(hit.popularity);
        stats.resolved += 1;

        // Second lookup: the candidate's primary artist carries the genre
        // tags. Failures here leave the record with its partial state.
        let Some(artist_id) = hit.artist_id else {
            continue;
        };
        match catalog.artist_genre(&artist_id, session).await {
            Ok(CatalogOutcome::Hit(genre)) => record.genre = genre,
            Ok(CatalogOutcome::Miss) => {
                debug!(%artist_id, "artist not found for genre lookup");
            }
            Ok(CatalogOutcome::AuthExpired) => {
                refresh(catalog, session, &mut stats).await;
            }
            Ok(CatalogOutcome::AuthRejected) => {
                stats.auth_rejected += 1;
            }
            Err(e) => {
                warn!(%artist_id, error = %e, "genre lookup failed");
                stats.errors += 1;
            }
        }
    }

    stats
}

/// One synchronous refresh; the reassigned token is in place before the next
/// record's call. The record that tripped the failure is not retried.
async fn refresh(
    catalog: &dyn CatalogApi,
    session: &mut CredentialSession,
    stats: &mut ResolveStats,
) {
    match catalog.refresh_session(session).await {
        Ok(()) => stats.token_refreshes += 1,
        Err(e) => error!(error = %e, "credential refresh failed"),
    }
}
