use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::apis::catalog::{CatalogApi, CatalogOutcome, PlaylistEntry, TrackHit};
use crate::apis::session::{CredentialSession, TokenGrant};
use crate::domain::AudioFeatures;
use crate::error::{PipelineError, Result};

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Single market keeps search results consistent across runs.
const SEARCH_MARKET: &str = "US";

/// HTTP client for the catalog service.
pub struct SpotifyClient {
    http: Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    token_url: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: Client::new(),
            client_id,
            client_secret,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Point the client at alternate endpoints (fixtures, mock servers).
    pub fn with_base_urls(mut self, api_base: String, token_url: String) -> Self {
        self.api_base = api_base;
        self.token_url = token_url;
        self
    }

    /// Create the process-wide session by exchanging a long-lived refresh
    /// token for an access token.
    pub async fn bootstrap_session(&self, refresh_token: &str) -> Result<CredentialSession> {
        let grant = self.exchange_refresh_token(refresh_token).await?;
        info!("catalog session established");
        Ok(CredentialSession::from_grant(grant, refresh_token))
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Auth(format!(
                "token exchange failed with {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Map authorization rejections to a typed outcome; anything else stays
    /// with the caller.
    fn classify_auth<T>(
        status: StatusCode,
        session: &CredentialSession,
    ) -> Option<CatalogOutcome<T>> {
        match status {
            StatusCode::UNAUTHORIZED => Some(if session.is_expired() {
                CatalogOutcome::AuthExpired
            } else {
                CatalogOutcome::AuthRejected
            }),
            StatusCode::FORBIDDEN => Some(CatalogOutcome::AuthRejected),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl CatalogApi for SpotifyClient {
    async fn search_track(
        &self,
        artist: &str,
        track: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<TrackHit>> {
        let query = format!("artist:{} track:{}", artist, track);
        debug!(%query, "searching catalog");
        let response = self
            .http
            .get(format!("{}/search", self.api_base))
            .bearer_auth(session.bearer_token())
            .query(&[
                ("q", query.as_str()),
                ("type", "track"),
                ("limit", "1"),
                ("market", SEARCH_MARKET),
            ])
            .send()
            .await?;

        if let Some(outcome) = Self::classify_auth(response.status(), session) {
            return Ok(outcome);
        }
        let body: SearchResponse = response.error_for_status()?.json().await?;

        match body.tracks.items.into_iter().next() {
            Some(item) => Ok(CatalogOutcome::Hit(TrackHit {
                track_id: item.id,
                duration_ms: item.duration_ms,
                popularity: item.popularity,
                artist_id: item.artists.into_iter().next().and_then(|a| a.id),
            })),
            None => Ok(CatalogOutcome::Miss),
        }
    }

    async fn artist_genre(
        &self,
        artist_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<Option<String>>> {
        let response = self
            .http
            .get(format!("{}/artists/{}", self.api_base, artist_id))
            .bearer_auth(session.bearer_token())
            .send()
            .await?;

        if let Some(outcome) = Self::classify_auth(response.status(), session) {
            return Ok(outcome);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CatalogOutcome::Miss);
        }
        let body: ArtistResponse = response.error_for_status()?.json().await?;

        Ok(CatalogOutcome::Hit(body.genres.into_iter().next()))
    }

    async fn audio_features(
        &self,
        track_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<AudioFeatures>> {
        let response = self
            .http
            .get(format!("{}/audio-features/{}", self.api_base, track_id))
            .bearer_auth(session.bearer_token())
            .send()
            .await?;

        if let Some(outcome) = Self::classify_auth(response.status(), session) {
            return Ok(outcome);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CatalogOutcome::Miss);
        }
        // The feature endpoint responds with a JSON null body for tracks it
        // has not analyzed.
        let body: Option<AudioFeatures> = response.error_for_status()?.json().await?;

        Ok(match body {
            Some(features) => CatalogOutcome::Hit(features),
            None => CatalogOutcome::Miss,
        })
    }

    async fn playlist_tracks(
        &self,
        owner: &str,
        playlist_id: &str,
        session: &CredentialSession,
    ) -> Result<CatalogOutcome<Vec<PlaylistEntry>>> {
        let response = self
            .http
            .get(format!(
                "{}/users/{}/playlists/{}",
                self.api_base, owner, playlist_id
            ))
            .bearer_auth(session.bearer_token())
            .send()
            .await?;

        if let Some(outcome) = Self::classify_auth(response.status(), session) {
            return Ok(outcome);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(CatalogOutcome::Miss);
        }
        let body: PlaylistResponse = response.error_for_status()?.json().await?;

        Ok(CatalogOutcome::Hit(playlist_entries(body)))
    }

    async fn refresh_session(&self, session: &mut CredentialSession) -> Result<()> {
        let grant = self.exchange_refresh_token(session.refresh_token()).await?;
        session.apply(grant);
        info!("access token refreshed");
        Ok(())
    }
}

fn playlist_entries(body: PlaylistResponse) -> Vec<PlaylistEntry> {
    body.tracks
        .items
        .into_iter()
        .filter_map(|item| {
            // Removed and local tracks come back as null entries
            let track = item.track?;
            let track_id = match track.id {
                Some(id) => id,
                None => {
                    warn!(track = %track.name, "playlist track has no catalog id, skipping");
                    return None;
                }
            };
            let primary = track.artists.into_iter().next();
            Some(PlaylistEntry {
                track_id,
                track_name: track.name,
                artist_name: primary
                    .as_ref()
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                artist_id: primary.and_then(|a| a.id),
                duration_ms: track.duration_ms,
                popularity: track.popularity,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: String,
    duration_ms: u64,
    popularity: u8,
    #[serde(default)]
    artists: Vec<ApiArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ApiArtistRef {
    id: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArtistResponse {
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    tracks: PlaylistTrackPage,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrackPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<PlaylistTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrack {
    id: Option<String>,
    name: String,
    duration_ms: u64,
    popularity: u8,
    #[serde(default)]
    artists: Vec<ApiArtistRef>,
}
