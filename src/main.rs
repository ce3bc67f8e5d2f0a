use anyhow::Context;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{debug, info};

use scrobble_enrich::apis::{ScrobbleClient, SpotifyClient};
use scrobble_enrich::config::Config;
use scrobble_enrich::logging;
use scrobble_enrich::pipeline::orchestrator::{unmapped_tracks, ScrobblePipeline};
use scrobble_enrich::pipeline::export;

#[derive(Parser)]
#[command(name = "scrobble-enrich")]
#[command(about = "Listening-history extractor with catalog and audio-feature enrichment")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a user's listening history and enrich it
    Dataset {
        /// Scrobble-source username (defaults to the configured one)
        #[arg(long)]
        username: Option<String>,
        /// Pages of history to fetch; 0 fetches everything
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Fetch a catalog playlist and enrich its tracks
    Playlist {
        /// Username of the playlist owner
        #[arg(long)]
        owner: String,
        /// Playlist id (the tail of a playlist URL)
        #[arg(long)]
        playlist: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    logging::init_logging();

    let config = Config::load(&cli.config)?;
    let timezone = config.timezone()?;

    let scrobbles = ScrobbleClient::new(
        config.lastfm.api_key.clone(),
        Duration::from_millis(config.fetch.delay_ms.max(200)),
    );
    let catalog = SpotifyClient::new(
        config.spotify.client_id.clone(),
        config.spotify.client_secret.clone(),
    );
    let mut session = catalog
        .bootstrap_session(&config.spotify.refresh_token)
        .await
        .context("authenticating with the catalog service")?;

    let pipeline = ScrobblePipeline::new(scrobbles, Box::new(catalog), config.fetch.page_size);
    let output_dir = &config.export.output_dir;

    match cli.command {
        Commands::Dataset { username, pages } => {
            let username = username.unwrap_or_else(|| config.lastfm.username.clone());
            let pages = pages.unwrap_or(config.fetch.page_limit);
            println!("🎧 Building enriched dataset for {}", username);

            let bundle = pipeline
                .run(&mut session, &username, timezone, pages)
                .await?;
            for record in unmapped_tracks(&bundle.library) {
                debug!(
                    artist = %record.key.artist_name,
                    track = %record.key.track_name,
                    "track left unmapped"
                );
            }

            let complete_path = output_dir.join("complete.csv");
            let library_path = output_dir.join("library.csv");
            export::write_complete_csv(&complete_path, &bundle.complete).await?;
            export::write_library_csv(&library_path, &bundle.library).await?;

            info!(
                events = bundle.complete.len(),
                unique_tracks = bundle.library.len(),
                "dataset run finished"
            );
            println!(
                "✅ Wrote {} events and {} unique tracks to {}",
                bundle.complete.len(),
                bundle.library.len(),
                output_dir.display()
            );
        }
        Commands::Playlist { owner, playlist } => {
            println!("🎧 Fetching playlist {} from {}", playlist, owner);

            let records = pipeline.playlist(&mut session, &owner, &playlist).await?;
            let playlist_path = output_dir.join("playlist.csv");
            export::write_library_csv(&playlist_path, &records).await?;

            println!(
                "✅ Wrote {} playlist tracks to {}",
                records.len(),
                playlist_path.display()
            );
        }
    }

    Ok(())
}
