//! Fetch, parse and persist cycle for one playlist
//!
//! A sync runs under its playlist's write lock:
//!
//! 1. snapshot the favorited stream URLs
//! 2. clear the playlist's channels
//! 3. stream the source through the matching parser
//! 4. re-apply favorites to every batch and upsert it
//!
//! Foreground syncs are exclusive: requesting one cancels whichever
//! foreground sync is in flight and waits for it to stop before starting.
//! Background pre-syncs bypass that slot.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state_manager::SyncStateManager;
use crate::config::SyncConfig;
use crate::database::PlaylistLocks;
use crate::errors::{AppError, AppResult};
use crate::models::{Channel, Playlist};
use crate::repositories::{ChannelStore, PlaylistRegistry};
use crate::sources::{ChannelSink, ParseSummary, PlaylistReader};
use crate::utils::url::obfuscate_credentials;

/// How a sync ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(ParseSummary),
    Failed(String),
    Cancelled,
}

/// Handle on a started sync
pub struct SyncTicket {
    pub playlist_id: i64,
    outcome: watch::Receiver<Option<SyncOutcome>>,
}

impl SyncTicket {
    /// Wait for the sync to end
    pub async fn wait(mut self) -> SyncOutcome {
        let result = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        match result {
            Ok(Some(outcome)) => outcome,
            _ => SyncOutcome::Failed("sync task ended without reporting".to_string()),
        }
    }
}

struct ForegroundSync {
    playlist_id: i64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct SyncCore {
    pub(crate) registry: Arc<dyn PlaylistRegistry>,
    pub(crate) channels: Arc<dyn ChannelStore>,
    pub(crate) reader: PlaylistReader,
    pub(crate) locks: PlaylistLocks,
    pub(crate) state: SyncStateManager,
    pub(crate) config: SyncConfig,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    pub(crate) core: Arc<SyncCore>,
    foreground: Arc<Mutex<Option<ForegroundSync>>>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<dyn PlaylistRegistry>,
        channels: Arc<dyn ChannelStore>,
        reader: PlaylistReader,
        locks: PlaylistLocks,
        state: SyncStateManager,
        config: SyncConfig,
    ) -> Self {
        Self {
            core: Arc::new(SyncCore {
                registry,
                channels,
                reader,
                locks,
                state,
                config,
            }),
            foreground: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &SyncStateManager {
        &self.core.state
    }

    pub fn registry(&self) -> Arc<dyn PlaylistRegistry> {
        self.core.registry.clone()
    }

    pub fn channels(&self) -> Arc<dyn ChannelStore> {
        self.core.channels.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.core.config
    }

    /// Start a foreground sync, cancelling the one in flight
    pub async fn sync(&self, playlist: Playlist) -> SyncTicket {
        let mut slot = self.foreground.lock().await;

        if let Some(previous) = slot.take() {
            if !previous.handle.is_finished() {
                info!(
                    "Cancelling in-flight sync of playlist {} for playlist {}",
                    previous.playlist_id, playlist.id
                );
            }
            previous.token.cancel();
            if let Err(e) = previous.handle.await {
                warn!("Previous sync task ended abnormally: {}", e);
            }
        }

        let token = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let playlist_id = playlist.id;

        let core = self.core.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let outcome = core.run(&playlist, &task_token, false).await;
            outcome_tx.send_replace(Some(outcome));
        });

        *slot = Some(ForegroundSync {
            playlist_id,
            token,
            handle,
        });

        SyncTicket {
            playlist_id,
            outcome: outcome_rx,
        }
    }

    /// Cancel the foreground sync, if any, and wait for it to stop
    pub async fn cancel_foreground(&self) {
        let previous = self.foreground.lock().await.take();
        if let Some(previous) = previous {
            previous.token.cancel();
            if let Err(e) = previous.handle.await {
                warn!("Cancelled sync task ended abnormally: {}", e);
            }
        }
    }

    /// Run a sync outside the foreground slot, on the caller's task
    pub async fn sync_background(
        &self,
        playlist: &Playlist,
        token: &CancellationToken,
    ) -> SyncOutcome {
        self.core.run(playlist, token, true).await
    }

    /// Select a playlist and start a foreground sync when it has no channels
    pub async fn select_and_sync(&self, playlist_id: i64) -> AppResult<(Playlist, Option<SyncTicket>)> {
        let playlist = self.core.registry.select(playlist_id).await?;
        let count = self.core.channels.count_for_playlist(playlist.id).await?;
        if count > 0 {
            debug!("Playlist {} already has {} channels", playlist.id, count);
            return Ok((playlist, None));
        }
        let ticket = self.sync(playlist.clone()).await;
        Ok((playlist, Some(ticket)))
    }
}

impl SyncCore {
    async fn run(&self, playlist: &Playlist, token: &CancellationToken, background: bool) -> SyncOutcome {
        info!(
            "Starting {} sync of playlist '{}' ({}) from {}",
            if background { "background" } else { "foreground" },
            playlist.name,
            playlist.id,
            obfuscate_credentials(&playlist.url)
        );
        self.state.start_sync(playlist, background).await;

        // Dropping the sync future stops in-flight reads; a batch upsert is
        // a single transaction, so an interrupted batch is rolled back whole.
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AppError::Cancelled),
            result = self.sync_locked(playlist, token) => result,
        };

        match result {
            Ok(summary) => {
                info!(
                    "Synced playlist '{}': {} channels in {} batches",
                    playlist.name, summary.channels, summary.batches
                );
                self.state.complete(playlist.id, summary).await;
                SyncOutcome::Completed(summary)
            }
            Err(e) if e.is_cancelled() => {
                info!("Sync of playlist '{}' cancelled", playlist.name);
                self.state.cancel(playlist.id).await;
                SyncOutcome::Cancelled
            }
            Err(e) => {
                warn!("Sync of playlist '{}' failed: {}", playlist.name, e);
                self.state.fail(playlist.id, e.to_string()).await;
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sync_locked(&self, playlist: &Playlist, token: &CancellationToken) -> AppResult<ParseSummary> {
        let _guard = self.locks.lock(playlist.id).await;

        let favorites = match self.channels.favorite_urls(playlist.id).await {
            Ok(favorites) => favorites,
            Err(e) => {
                warn!(
                    "Could not read favorites of playlist {}; they will not survive this sync: {}",
                    playlist.id, e
                );
                HashSet::new()
            }
        };

        let cleared = self.channels.clear_for_playlist(playlist.id).await?;
        debug!(
            "Cleared {} channels of playlist {} ({} favorites kept aside)",
            cleared,
            playlist.id,
            favorites.len()
        );

        let mut sink = StoreSink {
            playlist_id: playlist.id,
            channels: self.channels.as_ref(),
            state: &self.state,
            favorites: &favorites,
            token,
            saved: 0,
            batches: 0,
        };
        self.reader.read_into(playlist, &mut sink).await
    }
}

/// Writes parsed batches to the channel store, restoring favorites
struct StoreSink<'a> {
    playlist_id: i64,
    channels: &'a dyn ChannelStore,
    state: &'a SyncStateManager,
    favorites: &'a HashSet<String>,
    token: &'a CancellationToken,
    saved: usize,
    batches: usize,
}

#[async_trait]
impl<'a> ChannelSink for StoreSink<'a> {
    async fn accept(&mut self, mut batch: Vec<Channel>) -> AppResult<()> {
        if self.token.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        for channel in &mut batch {
            channel.is_favorite = self.favorites.contains(&channel.stream_url);
        }
        self.channels.upsert_batch(&batch).await?;

        self.saved += batch.len();
        self.batches += 1;
        debug!(
            "Saved batch {} for playlist {} ({} channels so far)",
            self.batches, self.playlist_id, self.saved
        );
        self.state
            .record_batch(self.playlist_id, self.saved, self.batches)
            .await;

        // Let other tasks run between batches
        tokio::task::yield_now().await;
        Ok(())
    }
}
