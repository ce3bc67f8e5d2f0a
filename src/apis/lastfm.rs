use std::time::Duration;

use chrono::TimeZone;
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::apis::rate::RateGate;
use crate::domain::ListeningEvent;
use crate::error::{PipelineError, Result};

const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// The source API caps page size at 200 records per call.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Client for the scrobble-tracking service's paged JSON feed.
pub struct ScrobbleClient {
    http: Client,
    api_key: String,
    base_url: String,
    gate: RateGate,
}

impl ScrobbleClient {
    pub fn new(api_key: String, min_request_delay: Duration) -> Self {
        Self {
            http: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            gate: RateGate::new(min_request_delay),
        }
    }

    /// Point the client at an alternate endpoint (fixtures, mock servers).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Retrieve a user's listening history as a flat, time-ordered event
    /// sequence.
    ///
    /// The first request only learns the page count; a source-level error
    /// there aborts the whole fetch. Pages are then requested in ascending
    /// order, each behind the rate gate, and the source's
    /// reverse-chronological ordering is passed through unchanged.
    /// `max_pages == 0` fetches the full history.
    pub async fn recent_tracks(
        &self,
        username: &str,
        timezone: Tz,
        page_size: u32,
        max_pages: u32,
    ) -> Result<Vec<ListeningEvent>> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        info!(username, "fetching listening history");

        self.gate.wait().await;
        let probe = self.fetch_page(username, page_size, 1).await?;
        if let Some(code) = probe.error {
            let message = probe
                .message
                .unwrap_or_else(|| "unknown source error".to_string());
            error!(code, %message, "listening history source unavailable");
            return Err(PipelineError::SourceUnavailable { code, message });
        }
        let attr = &probe
            .recent
            .as_ref()
            .ok_or_else(|| PipelineError::MissingField("recenttracks".into()))?
            .attr;
        let total_scrobbles: u64 = attr.total.parse().unwrap_or(0);
        let mut total_pages: u32 = attr.total_pages.parse().map_err(|_| {
            PipelineError::MissingField("recenttracks.@attr.totalPages".into())
        })?;
        if max_pages > 0 {
            total_pages = total_pages.min(max_pages);
        }
        info!(total_scrobbles, total_pages, "listening history paged");

        let mut events = Vec::new();
        for page in 1..=total_pages {
            self.gate.wait().await;
            let envelope = match self.fetch_page(username, page_size, page).await {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(page, error = %e, "page fetch failed, skipping");
                    continue;
                }
            };
            match envelope.recent {
                Some(scrobbles) => events.extend(events_from_page(scrobbles, timezone)),
                None => warn!(page, "page response carried no scrobbles, skipping"),
            }
        }

        info!(events = events.len(), "retained completed scrobbles");
        Ok(events)
    }

    async fn fetch_page(
        &self,
        username: &str,
        page_size: u32,
        page: u32,
    ) -> Result<RecentTracksEnvelope> {
        let limit = page_size.to_string();
        let page = page.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("method", "user.getrecenttracks"),
                ("user", username),
                ("api_key", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("page", page.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }
}

/// Flatten one page into events, keeping only completed scrobbles.
///
/// An item without a `date` is the currently-playing track and is dropped.
/// Within-page order is preserved.
fn events_from_page(page: RecentTracksPage, timezone: Tz) -> Vec<ListeningEvent> {
    page.tracks
        .into_iter()
        .filter_map(|scrobble| {
            let date = match scrobble.date {
                Some(date) => date,
                None => {
                    debug!(track = %scrobble.track_name, "skipping now-playing item");
                    return None;
                }
            };
            let timestamp: i64 = match date.uts.parse() {
                Ok(ts) => ts,
                Err(_) => {
                    warn!(track = %scrobble.track_name, uts = %date.uts, "unparseable timestamp, skipping");
                    return None;
                }
            };
            let utc = chrono::Utc
                .timestamp_opt(timestamp, 0)
                .single()
                .unwrap_or_default();
            Some(ListeningEvent {
                timestamp,
                local_time: utc.with_timezone(&timezone).fixed_offset(),
                artist_name: scrobble.artist.text,
                artist_mbid: none_if_empty(scrobble.artist.mbid),
                album_name: scrobble.album.text,
                album_mbid: none_if_empty(scrobble.album.mbid),
                track_name: scrobble.track_name,
                track_mbid: none_if_empty(scrobble.mbid),
            })
        })
        .collect()
}

fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Deserialize)]
struct RecentTracksEnvelope {
    #[serde(rename = "recenttracks")]
    recent: Option<RecentTracksPage>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTracksPage {
    #[serde(rename = "track", default)]
    tracks: Vec<RawScrobble>,
    #[serde(rename = "@attr")]
    attr: PageAttr,
}

#[derive(Debug, Deserialize)]
struct PageAttr {
    #[serde(rename = "totalPages")]
    total_pages: String,
    total: String,
}

#[derive(Debug, Deserialize)]
struct RawScrobble {
    artist: NamedRef,
    album: NamedRef,
    #[serde(rename = "name")]
    track_name: String,
    #[serde(default)]
    mbid: String,
    date: Option<ScrobbleDate>,
}

/// Display name plus optional external id, as the source nests them.
#[derive(Debug, Deserialize)]
struct NamedRef {
    #[serde(rename = "#text")]
    text: String,
    #[serde(default)]
    mbid: String,
}

#[derive(Debug, Deserialize)]
struct ScrobbleDate {
    uts: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_FIXTURE: &str = r##"{
        "recenttracks": {
            "track": [
                {
                    "artist": {"#text": "Currently Playing", "mbid": ""},
                    "album": {"#text": "Live", "mbid": ""},
                    "name": "Not Done Yet",
                    "mbid": "",
                    "@attr": {"nowplaying": "true"}
                },
                {
                    "artist": {"#text": "Daft Punk", "mbid": "056e4f3e-d505-4dad-8ec1-d04f521cbb56"},
                    "album": {"#text": "Discovery", "mbid": ""},
                    "name": "One More Time",
                    "mbid": "c9a2c954-87cd-42b8-8d8b-c93eb234f03a",
                    "date": {"uts": "1577880000", "#text": "01 Jan 2020, 12:00"}
                },
                {
                    "artist": {"#text": "Daft Punk", "mbid": ""},
                    "album": {"#text": "Discovery", "mbid": ""},
                    "name": "Aerodynamic",
                    "mbid": "",
                    "date": {"uts": "1577876400", "#text": "01 Jan 2020, 11:00"}
                }
            ],
            "@attr": {"user": "listener", "totalPages": "12", "page": "1", "perPage": "200", "total": "2400"}
        }
    }"##;

    #[test]
    fn drops_now_playing_and_preserves_order() {
        let envelope: RecentTracksEnvelope = serde_json::from_str(PAGE_FIXTURE).unwrap();
        let page = envelope.recent.unwrap();
        assert_eq!(page.attr.total_pages, "12");
        assert_eq!(page.attr.total, "2400");

        let events = events_from_page(page, chrono_tz::UTC);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].track_name, "One More Time");
        assert_eq!(events[0].timestamp, 1577880000);
        assert_eq!(events[1].track_name, "Aerodynamic");
    }

    #[test]
    fn maps_empty_external_ids_to_none() {
        let envelope: RecentTracksEnvelope = serde_json::from_str(PAGE_FIXTURE).unwrap();
        let events = events_from_page(envelope.recent.unwrap(), chrono_tz::UTC);
        assert_eq!(
            events[0].artist_mbid.as_deref(),
            Some("056e4f3e-d505-4dad-8ec1-d04f521cbb56")
        );
        assert!(events[0].album_mbid.is_none());
        assert!(events[1].artist_mbid.is_none());
        assert!(events[1].track_mbid.is_none());
    }

    #[test]
    fn converts_timestamps_to_the_requested_timezone() {
        let envelope: RecentTracksEnvelope = serde_json::from_str(PAGE_FIXTURE).unwrap();
        let events = events_from_page(envelope.recent.unwrap(), chrono_tz::Asia::Kolkata);
        // display field carries the +05:30 offset, epoch stays canonical
        assert_eq!(events[0].timestamp, 1577880000);
        assert_eq!(events[0].local_time.offset().local_minus_utc(), 5 * 3600 + 1800);
    }

    #[test]
    fn detects_source_error_payload() {
        let json = r#"{"error": 29, "message": "Rate limit exceeded"}"#;
        let envelope: RecentTracksEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.error, Some(29));
        assert_eq!(envelope.message.as_deref(), Some("Rate limit exceeded"));
        assert!(envelope.recent.is_none());
    }
}
