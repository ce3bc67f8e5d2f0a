use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub lastfm: LastfmConfig,
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize)]
pub struct LastfmConfig {
    #[serde(default)]
    pub api_key: String,
    pub username: String,
    /// IANA timezone identifier matching the user's profile settings
    pub timezone: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchConfig {
    /// Scrobbles per page, capped by the source API at 200
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Number of pages to retrieve; 0 fetches the full history
    #[serde(default)]
    pub page_limit: u32,
    /// Minimum spacing between page requests
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_page_size() -> u32 {
    200
}

fn default_delay_ms() -> u64 {
    250
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_limit: 0,
            delay_ms: default_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Secrets may come from the environment instead of the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("LASTFM_API_KEY") {
            self.lastfm.api_key = key;
        }
        if let Ok(id) = env::var("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = id;
        }
        if let Ok(secret) = env::var("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = secret;
        }
        if let Ok(token) = env::var("SPOTIFY_REFRESH_TOKEN") {
            self.spotify.refresh_token = token;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.lastfm.api_key.is_empty() {
            return Err(PipelineError::Config(
                "lastfm.api_key is not set (config file or LASTFM_API_KEY)".into(),
            ));
        }
        if self.spotify.client_id.is_empty() || self.spotify.client_secret.is_empty() {
            return Err(PipelineError::Config(
                "spotify client credentials are not set".into(),
            ));
        }
        if self.spotify.refresh_token.is_empty() {
            return Err(PipelineError::Config(
                "spotify.refresh_token is not set (config file or SPOTIFY_REFRESH_TOKEN)".into(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.lastfm.timezone.parse().map_err(|e| {
            PipelineError::Config(format!(
                "Unknown timezone '{}': {}",
                self.lastfm.timezone, e
            ))
        })
    }
}
