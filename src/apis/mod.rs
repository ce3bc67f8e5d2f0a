pub mod catalog;
pub mod lastfm;
pub mod rate;
pub mod session;
pub mod spotify;

pub use catalog::{CatalogApi, CatalogOutcome, PlaylistEntry, TrackHit};
pub use lastfm::ScrobbleClient;
pub use session::CredentialSession;
pub use spotify::SpotifyClient;
