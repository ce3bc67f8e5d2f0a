use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Leeway subtracted from the expiry so a token is refreshed slightly
/// before the service would start rejecting it.
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Bearer credential for the catalog service: access token, expiry and the
/// long-lived refresh token used to obtain replacements.
///
/// One instance lives per process. It is mutated only by [`apply`], which is
/// invoked synchronously from the resolver/enricher failure path, so the
/// token is never observable mid-refresh.
///
/// [`apply`]: CredentialSession::apply
#[derive(Debug, Clone)]
pub struct CredentialSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// Token payload returned by the catalog's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Present when the service rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl CredentialSession {
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Build a session from a freshly exchanged grant.
    pub fn from_grant(grant: TokenGrant, fallback_refresh_token: &str) -> Self {
        let refresh_token = grant
            .refresh_token
            .clone()
            .unwrap_or_else(|| fallback_refresh_token.to_string());
        Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(grant.expires_in),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_LEEWAY_SECS) >= self.expires_at
    }

    pub fn bearer_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Reassign the credential from a refresh grant. Completes before the
    /// caller issues its next catalog call.
    pub fn apply(&mut self, grant: TokenGrant) {
        self.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token {
            self.refresh_token = rotated;
        }
        self.expires_at = Utc::now() + Duration::seconds(grant.expires_in);
        debug!(expires_at = %self.expires_at, "credential session updated");
    }
}
