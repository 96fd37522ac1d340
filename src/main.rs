use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playlist_sync::{
    config::Config,
    database::Database,
    ingestor::{SyncOrchestrator, SyncOutcome, SyncStateManager, SyncTicket},
    models::{Channel, CountryPreference},
    repositories::{
        ChannelStore, PlaylistRegistry, PreferenceStore, SqliteChannelStore, SqlitePlaylistRegistry,
        SqlitePreferenceStore,
    },
    services::{BrowserSession, CountryDetector, FallbackDecision, PlaybackEvent},
    sources::{PlaylistReader, ReqwestFetcher},
};

#[derive(Parser)]
#[command(name = "playlist-sync")]
#[command(version)]
#[command(about = "Playlist ingestion and channel resolution for IPTV playlists")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed default playlists, select and sync one, then pre-sync fallback sources
    Init {
        /// Skip the background pre-sync of fallback sources
        #[arg(long)]
        no_presync: bool,
    },
    /// List known playlists
    Playlists,
    /// Select a playlist, syncing it when empty
    Select { id: i64 },
    /// Re-sync a playlist (the selected one by default)
    Sync { id: Option<i64> },
    /// Show a page of the selected playlist's channels
    Channels {
        /// Category name, or "Favorites"
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Search channel names across every playlist
    Search {
        query: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// List categories of the selected playlist
    Categories,
    /// List countries of the selected playlist
    Countries,
    /// Recently watched channels
    Recent,
    /// Toggle a channel's favorite flag
    Favorite { url: String },
    /// Mark a channel as watched and print its stream URL
    Play { url: String },
    /// Report playback failures for a channel and print the fallback decisions
    Fail {
        name: String,
        url: String,
        /// Consecutive failures to report
        #[arg(long, default_value_t = 1)]
        attempts: u32,
    },
    /// Show or change stored preferences
    Prefs {
        /// Default category to open with
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,
        #[arg(long)]
        clear_category: bool,
        /// Country code, ALL, or DETECTED
        #[arg(long)]
        country: Option<String>,
    },
}

struct App {
    orchestrator: SyncOrchestrator,
    preferences: Arc<SqlitePreferenceStore>,
    session: BrowserSession,
    events: tokio::sync::mpsc::Receiver<PlaybackEvent>,
    detector: CountryDetector,
}

impl App {
    async fn build(config: &Config) -> Result<Self> {
        let database = Database::new(&config.database).await?;
        database.migrate().await?;
        info!("Database connection established and migrations applied");

        let fetcher = Arc::new(ReqwestFetcher::new(&config.http)?);
        let registry = Arc::new(SqlitePlaylistRegistry::new(database.pool()));
        let channels = Arc::new(SqliteChannelStore::new(database.pool()));
        let preferences = Arc::new(SqlitePreferenceStore::new(database.pool()));

        let orchestrator = SyncOrchestrator::new(
            registry,
            channels,
            PlaylistReader::new(fetcher.clone(), config.sync.effective_batch_size()),
            database.playlist_locks(),
            SyncStateManager::new(),
            config.sync.clone(),
        );
        let (session, events) = BrowserSession::new(
            orchestrator.clone(),
            preferences.clone(),
            database.playlist_locks(),
            &config.sync,
        )
        .await?;
        let detector = CountryDetector::new(fetcher, config.http.geolocation_url.clone());

        Ok(Self {
            orchestrator,
            preferences,
            session,
            events,
            detector,
        })
    }

    async fn detect_country(&self) {
        let detected = self.detector.detect().await;
        info!("Detected country: {:?}", detected);
        self.session.set_detected_country(detected);
    }

    async fn channel_by_url(&self, url: &str) -> Result<Channel> {
        self.orchestrator
            .channels()
            .get_by_url(url)
            .await?
            .with_context(|| format!("no channel with stream URL {}", url))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("playlist_sync={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    info!("Using database: {}", config.database.url);

    let mut app = App::build(&config).await?;
    run(&mut app, cli.command).await
}

async fn run(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Init { no_presync } => {
            let report = app.orchestrator.reconcile().await?;
            println!("Seeded {} playlists", report.seeded.len());
            match &report.selected {
                Some(playlist) => println!("Selected: [{}] {}", playlist.id, playlist.name),
                None => println!("No playlist selected"),
            }
            // Pre-sync targets exclude the selected playlist, so both can run at once
            let presync = (!no_presync).then(|| {
                app.orchestrator
                    .spawn_background_presync(CancellationToken::new())
            });
            if let Some(ticket) = report.initial_sync {
                print_outcome(ticket).await;
            }
            if let Some(presync) = presync {
                let presync = presync.await?;
                println!(
                    "Pre-synced {} fallback sources ({} already populated, {} failed)",
                    presync.synced, presync.skipped, presync.failed
                );
            }
        }
        Command::Playlists => {
            let registry = app.orchestrator.registry();
            let channels = app.orchestrator.channels();
            for playlist in registry.list_all().await? {
                let count = channels.count_for_playlist(playlist.id).await?;
                println!(
                    "{} [{}] {} ({} channels) {}",
                    if playlist.is_selected { "*" } else { " " },
                    playlist.id,
                    playlist.name,
                    count,
                    playlist.url
                );
            }
        }
        Command::Select { id } => {
            let (playlist, ticket) = app.session.select_playlist(id).await?;
            println!("Selected: [{}] {}", playlist.id, playlist.name);
            if let Some(ticket) = ticket {
                print_outcome(ticket).await;
            }
        }
        Command::Sync { id } => {
            let registry = app.orchestrator.registry();
            let playlist = match id {
                Some(id) => registry.get(id).await?,
                None => registry.selected().await?,
            };
            let Some(playlist) = playlist else {
                bail!("no such playlist");
            };
            let ticket = app.session.sync_playlist(playlist).await;
            print_outcome(ticket).await;
        }
        Command::Channels { category, page } => {
            app.detect_country().await;
            apply_category_flag(&app.session, category);
            let filters = app.session.filters();
            println!(
                "Category: {}, country: {}",
                filters.category.as_deref().unwrap_or("All"),
                filters.effective_country().as_deref().unwrap_or("All")
            );
            print_channels(&app.session.channel_page(page).await?);
        }
        Command::Search { query, page } => {
            app.session.set_search_query(query);
            print_channels(&app.session.channel_page(page).await?);
        }
        Command::Categories => {
            app.detect_country().await;
            for category in app.session.categories().await? {
                println!("{}", category);
            }
        }
        Command::Countries => {
            for country in app.session.countries().await? {
                println!("{}", country);
            }
        }
        Command::Recent => print_channels(&app.session.recent_channels().await?),
        Command::Favorite { url } => {
            let channel = app.channel_by_url(&url).await?;
            let favorite = app.session.toggle_favorite(&channel).await?;
            println!(
                "{} is {} a favorite",
                channel.name,
                if favorite { "now" } else { "no longer" }
            );
        }
        Command::Play { url } => {
            let channel = app.channel_by_url(&url).await?;
            app.session.select_channel(&channel).await?;
            println!("Playing {}: {}", channel.name, channel.stream_url);
        }
        Command::Fail {
            name,
            url,
            attempts,
        } => {
            let (mut name, mut url) = (name, url);
            for attempt in 1..=attempts.max(1) {
                match app.session.report_playback_failure(&name, &url).await {
                    FallbackDecision::Retry(next) => {
                        println!("Attempt {}: retry with {} ({})", attempt, next.name, next.stream_url);
                        name = next.name;
                        url = next.stream_url;
                    }
                    FallbackDecision::Exhausted => {
                        println!("Attempt {}: no alternatives left, giving up", attempt);
                        break;
                    }
                }
            }
            while let Ok(event) = app.events.try_recv() {
                info!("Playback event: {:?}", event);
            }
        }
        Command::Prefs {
            category,
            clear_category,
            country,
        } => {
            if clear_category {
                app.session.save_default_category(None).await?;
            } else if let Some(category) = category.as_deref() {
                app.session.save_default_category(Some(category)).await?;
            }
            if let Some(country) = country.as_deref() {
                let preference =
                    CountryPreference::from_stored(Some(&country.trim().to_uppercase()));
                app.session.set_country_preference(preference).await?;
            }

            let stored_category = app.preferences.default_category().await?;
            let stored_country = app.preferences.country_preference().await?;
            println!(
                "default_category = {}",
                stored_category.as_deref().unwrap_or("(none)")
            );
            println!("selected_country = {}", stored_country.to_stored());
        }
    }
    Ok(())
}

async fn print_outcome(ticket: SyncTicket) {
    let playlist_id = ticket.playlist_id;
    match ticket.wait().await {
        SyncOutcome::Completed(summary) => println!(
            "Synced playlist {}: {} channels in {} batches",
            playlist_id, summary.channels, summary.batches
        ),
        SyncOutcome::Failed(error) => println!("Sync of playlist {} failed: {}", playlist_id, error),
        SyncOutcome::Cancelled => println!("Sync of playlist {} was cancelled", playlist_id),
    }
}

/// `--category` overrides the stored default only when given
fn apply_category_flag(session: &BrowserSession, category: Option<String>) {
    if let Some(category) = category {
        session.set_category(Some(category));
    }
}

fn print_channels(channels: &[Channel]) {
    if channels.is_empty() {
        println!("(no channels)");
        return;
    }
    for channel in channels {
        println!(
            "{} {} [{}{}] {}",
            if channel.is_favorite { "*" } else { " " },
            channel.name,
            channel.category,
            channel
                .country
                .as_deref()
                .map(|c| format!(", {}", c))
                .unwrap_or_default(),
            channel.stream_url
        );
    }
}
