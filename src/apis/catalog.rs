use crate::apis::session::CredentialSession;
use crate::domain::AudioFeatures;
use crate::error::Result;

/// Typed outcome of a single catalog call.
///
/// "No match" and "credential rejected" are expected states the caller
/// inspects, not errors; transport and decode failures still surface as
/// `Err` on the wrapping `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogOutcome<T> {
    /// The call succeeded and returned data.
    Hit(T),
    /// The call succeeded but the catalog had no candidate.
    Miss,
    /// Rejected with an authorization failure while the session credential
    /// is past its expiry; recoverable by a refresh.
    AuthExpired,
    /// Rejected for an authorization reason other than expiry.
    AuthRejected,
}

/// Top search candidate for a (artist, track) query.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHit {
    pub track_id: String,
    pub duration_ms: u64,
    pub popularity: u8,
    /// Primary artist of the candidate, used for the genre lookup.
    pub artist_id: Option<String>,
}

/// One track of a catalog playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub artist_id: Option<String>,
    pub duration_ms: u64,
    pub popularity: u8,
}

/// Port to the music catalog service.
///
/// Implemented by the HTTP client; test code substitutes mocks. All methods
/// authorize with the passed session and classify authorization failures via
/// [`CatalogOutcome`].
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Search for the best track candidate. The query strings must already
    /// be normalized.
    async fn search_track(
        &self,
        artist: &str,
        track: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<TrackHit>>;

    /// Fetch an artist's first listed genre tag, `None` when untagged.
    async fn artist_genre(
        &self,
        artist_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<Option<String>>>;

    /// Fetch the audio-descriptor vector for a resolved track id.
    async fn audio_features(
        &self,
        track_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<AudioFeatures>>;

    /// List the tracks of a user's playlist.
    async fn playlist_tracks(
        &self,
        owner: &str,
        playlist_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<Vec<PlaylistEntry>>>;

    /// Exchange the session's refresh token for a new access token and
    /// reassign the session credential.
    async fn refresh_session(&self, session: &mut CredentialSession) -> Result<()>;
}
