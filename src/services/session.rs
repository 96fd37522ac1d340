//! State and commands behind the channel browser and player
//!
//! The session holds the filter inputs (search text, category, country),
//! answers the derived queries from the channel store, and drives playback
//! retries through the fallback resolver. Retry decisions reach the playback
//! surface as [`PlaybackEvent`]s on an mpsc channel.
//!
//! The derived lists are also published as a [`BrowserView`] on a watch
//! channel. A background task recomputes it whenever the filters change, a
//! sync ends, or a session command touches the store.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tracing::{debug, info, warn};

use super::fallback::{FallbackDecision, FallbackResolver};
use crate::config::SyncConfig;
use crate::database::PlaylistLocks;
use crate::errors::{AppError, AppResult};
use crate::ingestor::state_manager::ProgressReceiver;
use crate::ingestor::{SyncOrchestrator, SyncTicket};
use crate::models::{
    Category, CategoryFilter, Channel, ChannelPageQuery, CountryPreference, Playlist,
};
use crate::repositories::{ChannelStore, PlaylistRegistry, PreferenceStore};

/// Lifecycle signals reported by the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    Buffering,
    Ready,
    Ended,
    Error,
}

/// Instructions for the playback surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play { url: String, name: String },
    Failed { name: String },
}

/// Inputs the channel list, category list and country list derive from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserFilters {
    pub search_query: String,
    pub category: Option<String>,
    pub country: CountryPreference,
    pub detected_country: Option<String>,
}

impl BrowserFilters {
    pub fn effective_country(&self) -> Option<String> {
        self.country.effective(self.detected_country.as_deref())
    }
}

/// Lists shown by the channel browser for the current filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserView {
    /// First page of the channel list
    pub channels: Vec<Channel>,
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub recent: Vec<Channel>,
}

const EVENT_BUFFER: usize = 16;

/// Read side of the browser
#[derive(Clone)]
struct BrowserQueries {
    registry: Arc<dyn PlaylistRegistry>,
    channels: Arc<dyn ChannelStore>,
    page_size: u32,
    recent_limit: u32,
}

impl BrowserQueries {
    async fn selected_playlist(&self) -> AppResult<Option<Playlist>> {
        Ok(self.registry.selected().await?)
    }

    async fn channel_page(&self, filters: &BrowserFilters, page: u32) -> AppResult<Vec<Channel>> {
        let offset = page.saturating_mul(self.page_size);

        let query = filters.search_query.trim();
        if !query.is_empty() {
            return Ok(self
                .channels
                .search_global(query, offset, self.page_size)
                .await?);
        }

        let Some(playlist) = self.selected_playlist().await? else {
            return Ok(Vec::new());
        };
        let page_query = ChannelPageQuery {
            playlist_id: playlist.id,
            category: CategoryFilter::from_selection(filters.category.as_deref()),
            country: filters.effective_country(),
            offset,
            limit: self.page_size,
        };
        Ok(self.channels.get_page(&page_query).await?)
    }

    async fn categories(&self, filters: &BrowserFilters) -> AppResult<Vec<String>> {
        let Some(playlist) = self.selected_playlist().await? else {
            return Ok(Vec::new());
        };
        let country = filters.effective_country();
        let mut categories = self
            .channels
            .distinct_categories(playlist.id, country.as_deref())
            .await?;
        Category::priority_sort(&mut categories);
        Ok(categories)
    }

    async fn countries(&self) -> AppResult<Vec<String>> {
        match self.selected_playlist().await? {
            Some(playlist) => Ok(self.channels.distinct_countries(playlist.id).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn recent_channels(&self) -> AppResult<Vec<Channel>> {
        match self.selected_playlist().await? {
            Some(playlist) => Ok(self
                .channels
                .recently_watched(playlist.id, self.recent_limit)
                .await?),
            None => Ok(Vec::new()),
        }
    }

    async fn view(&self, filters: &BrowserFilters) -> AppResult<BrowserView> {
        Ok(BrowserView {
            channels: self.channel_page(filters, 0).await?,
            categories: self.categories(filters).await?,
            countries: self.countries().await?,
            recent: self.recent_channels().await?,
        })
    }
}

/// Resolves when a sync ends; `false` once progress reporting has shut down
async fn sync_finished(progress: &mut ProgressReceiver) -> bool {
    loop {
        match progress.recv().await {
            Ok(update) if update.state.is_terminal() => return true,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!("Browser missed {} sync progress updates", missed);
                return true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

/// Keep `view` current until the session's filter sender is dropped
async fn run_view_updates(
    queries: BrowserQueries,
    mut filters: watch::Receiver<BrowserFilters>,
    mut progress: ProgressReceiver,
    refresh: Arc<Notify>,
    view: watch::Sender<BrowserView>,
) {
    loop {
        let current = filters.borrow_and_update().clone();
        match queries.view(&current).await {
            Ok(next) => {
                view.send_if_modified(|shown| {
                    if *shown == next {
                        false
                    } else {
                        *shown = next;
                        true
                    }
                });
            }
            Err(e) => warn!("Could not refresh the channel browser: {}", e),
        }

        tokio::select! {
            changed = filters.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = refresh.notified() => {}
            running = sync_finished(&mut progress) => {
                if !running {
                    break;
                }
            }
        }
    }
    debug!("Channel browser updates stopped");
}

pub struct BrowserSession {
    orchestrator: SyncOrchestrator,
    queries: BrowserQueries,
    preferences: Arc<dyn PreferenceStore>,
    locks: PlaylistLocks,
    resolver: Mutex<FallbackResolver>,
    now_playing: Mutex<Option<Channel>>,
    filters: watch::Sender<BrowserFilters>,
    view: watch::Receiver<BrowserView>,
    refresh: Arc<Notify>,
    playback_url: watch::Sender<Option<String>>,
    events: mpsc::Sender<PlaybackEvent>,
}

impl BrowserSession {
    /// Build a session seeded from the stored preferences
    ///
    /// Spawns the task that keeps [`BrowserSession::watch_view`] current; it
    /// stops when the session is dropped.
    pub async fn new(
        orchestrator: SyncOrchestrator,
        preferences: Arc<dyn PreferenceStore>,
        locks: PlaylistLocks,
        config: &SyncConfig,
    ) -> AppResult<(Self, mpsc::Receiver<PlaybackEvent>)> {
        let category = preferences.default_category().await?;
        let country = preferences.country_preference().await?;
        debug!("Session starts with category {:?} and country {:?}", category, country);

        let (filters, filters_rx) = watch::channel(BrowserFilters {
            search_query: String::new(),
            category,
            country,
            detected_country: None,
        });
        let (playback_url, _) = watch::channel(None);
        let (events, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (view_tx, view) = watch::channel(BrowserView::default());
        let refresh = Arc::new(Notify::new());

        let channels = orchestrator.channels();
        let queries = BrowserQueries {
            registry: orchestrator.registry(),
            channels: channels.clone(),
            page_size: config.page_size.max(1),
            recent_limit: config.recent_limit,
        };
        tokio::spawn(run_view_updates(
            queries.clone(),
            filters_rx,
            orchestrator.state().subscribe(),
            refresh.clone(),
            view_tx,
        ));

        let session = Self {
            resolver: Mutex::new(FallbackResolver::new(channels)),
            orchestrator,
            queries,
            preferences,
            locks,
            now_playing: Mutex::new(None),
            filters,
            view,
            refresh,
            playback_url,
            events,
        };
        Ok((session, events_rx))
    }

    pub fn filters(&self) -> BrowserFilters {
        self.filters.borrow().clone()
    }

    pub fn watch_filters(&self) -> watch::Receiver<BrowserFilters> {
        self.filters.subscribe()
    }

    pub fn watch_syncing(&self) -> watch::Receiver<bool> {
        self.orchestrator.state().watch_syncing()
    }

    /// Current playback URL; `None` after fallbacks are exhausted
    pub fn watch_playback_url(&self) -> watch::Receiver<Option<String>> {
        self.playback_url.subscribe()
    }

    pub fn set_search_query(&self, text: impl Into<String>) {
        let text = text.into();
        self.filters.send_modify(|f| f.search_query = text);
    }

    /// `None` shows every category; "Favorites" shows favorites only
    pub fn set_category(&self, category: Option<String>) {
        self.filters.send_modify(|f| f.category = category);
    }

    /// `None` means all countries; the choice is persisted
    pub async fn set_country(&self, country: Option<&str>) -> AppResult<()> {
        let preference = match country {
            Some(code) => CountryPreference::Explicit(code.trim().to_uppercase()),
            None => CountryPreference::All,
        };
        self.set_country_preference(preference).await
    }

    pub async fn set_country_preference(&self, preference: CountryPreference) -> AppResult<()> {
        self.preferences.set_country_preference(&preference).await?;
        self.filters.send_modify(|f| f.country = preference);
        Ok(())
    }

    pub fn set_detected_country(&self, country: Option<String>) {
        self.filters.send_modify(|f| f.detected_country = country);
    }

    pub async fn save_default_category(&self, category: Option<&str>) -> AppResult<()> {
        self.preferences.set_default_category(category).await?;
        Ok(())
    }

    pub async fn selected_playlist(&self) -> AppResult<Option<Playlist>> {
        self.queries.selected_playlist().await
    }

    /// Lists for the current filters, recomputed as filters and the store change
    pub fn watch_view(&self) -> watch::Receiver<BrowserView> {
        self.view.clone()
    }

    /// One page of the channel list for the current filters
    ///
    /// A non-empty search query searches every playlist and ignores the
    /// category and country filters.
    pub async fn channel_page(&self, page: u32) -> AppResult<Vec<Channel>> {
        self.queries.channel_page(&self.filters(), page).await
    }

    /// Categories of the selected playlist, canonical ones first
    pub async fn categories(&self) -> AppResult<Vec<String>> {
        self.queries.categories(&self.filters()).await
    }

    pub async fn countries(&self) -> AppResult<Vec<String>> {
        self.queries.countries().await
    }

    pub async fn recent_channels(&self) -> AppResult<Vec<Channel>> {
        self.queries.recent_channels().await
    }

    /// Start playing a channel the user picked; begins a new fallback episode
    pub async fn select_channel(&self, channel: &Channel) -> AppResult<()> {
        self.resolver.lock().await.reset();
        *self.now_playing.lock().await = Some(channel.clone());
        self.playback_url.send_replace(Some(channel.stream_url.clone()));

        let _guard = self.locks.lock(channel.playlist_id).await;
        if !self
            .queries
            .channels
            .set_last_watched(&channel.stream_url, Utc::now())
            .await?
        {
            debug!("Watched channel {} is no longer stored", channel.stream_url);
        }
        self.refresh.notify_one();
        Ok(())
    }

    /// Flip a channel's favorite flag; returns the new value
    pub async fn toggle_favorite(&self, channel: &Channel) -> AppResult<bool> {
        let _guard = self.locks.lock(channel.playlist_id).await;

        // Read the stored flag; the caller's copy may be stale
        let stored = self
            .queries
            .channels
            .get_by_url(&channel.stream_url)
            .await?
            .ok_or_else(|| AppError::not_found("channel", channel.stream_url.clone()))?;
        let favorite = !stored.is_favorite;
        self.queries
            .channels
            .set_favorite(&channel.stream_url, favorite)
            .await?;
        self.refresh.notify_one();
        info!(
            "{} '{}' {} favorites",
            if favorite { "Added" } else { "Removed" },
            stored.name,
            if favorite { "to" } else { "from" }
        );
        Ok(favorite)
    }

    /// Route a playback failure through the fallback resolver
    pub async fn report_playback_failure(
        &self,
        channel_name: &str,
        stream_url: &str,
    ) -> FallbackDecision {
        let decision = self
            .resolver
            .lock()
            .await
            .on_failure(channel_name, stream_url)
            .await;

        let event = match &decision {
            FallbackDecision::Retry(next) => {
                *self.now_playing.lock().await = Some(next.clone());
                self.playback_url.send_replace(Some(next.stream_url.clone()));
                PlaybackEvent::Play {
                    url: next.stream_url.clone(),
                    name: next.name.clone(),
                }
            }
            FallbackDecision::Exhausted => {
                self.playback_url.send_replace(None);
                PlaybackEvent::Failed {
                    name: channel_name.to_string(),
                }
            }
        };
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Playback event queue full, dropping {:?}", event)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("No playback surface is listening for events")
            }
        }
        decision
    }

    /// React to a playback engine signal; only errors trigger a fallback
    pub async fn on_playback_signal(&self, signal: PlaybackSignal) -> Option<FallbackDecision> {
        match signal {
            PlaybackSignal::Error => {
                let current = self.now_playing.lock().await.clone();
                match current {
                    Some(channel) => Some(
                        self.report_playback_failure(&channel.name, &channel.stream_url)
                            .await,
                    ),
                    None => {
                        warn!("Playback error with nothing selected");
                        None
                    }
                }
            }
            other => {
                debug!("Playback signal: {:?}", other);
                None
            }
        }
    }

    pub async fn sync_playlist(&self, playlist: Playlist) -> SyncTicket {
        self.orchestrator.sync(playlist).await
    }

    /// Select a playlist, syncing it when it has no channels yet
    pub async fn select_playlist(&self, playlist_id: i64) -> AppResult<(Playlist, Option<SyncTicket>)> {
        let selected = self.orchestrator.select_and_sync(playlist_id).await?;
        self.refresh.notify_one();
        Ok(selected)
    }
}
