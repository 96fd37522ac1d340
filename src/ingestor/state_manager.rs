use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};

use crate::models::Playlist;
use crate::sources::ParseSummary;

pub type ProgressSender = broadcast::Sender<SyncProgress>;
pub type ProgressReceiver = broadcast::Receiver<SyncProgress>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Syncing,
    Completed,
    Failed,
    Cancelled,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub playlist_id: i64,
    pub playlist_name: String,
    pub state: SyncState,
    /// Background pre-syncs do not drive the foreground syncing flag
    pub background: bool,
    pub channels_saved: usize,
    pub batches_saved: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Per-playlist sync progress, broadcast to subscribers
#[derive(Clone)]
pub struct SyncStateManager {
    states: Arc<RwLock<HashMap<i64, SyncProgress>>>,
    progress_tx: ProgressSender,
    syncing_tx: Arc<watch::Sender<bool>>,
}

impl SyncStateManager {
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(1000);
        let (syncing_tx, _) = watch::channel(false);
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            progress_tx,
            syncing_tx: Arc::new(syncing_tx),
        }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.progress_tx.subscribe()
    }

    /// True while a foreground sync is running
    pub fn watch_syncing(&self) -> watch::Receiver<bool> {
        self.syncing_tx.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        *self.syncing_tx.borrow()
    }

    pub async fn start_sync(&self, playlist: &Playlist, background: bool) {
        let now = Utc::now();
        let progress = SyncProgress {
            playlist_id: playlist.id,
            playlist_name: playlist.name.clone(),
            state: SyncState::Syncing,
            background,
            channels_saved: 0,
            batches_saved: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        };
        self.publish(progress).await;
    }

    pub async fn record_batch(&self, playlist_id: i64, channels_saved: usize, batches_saved: usize) {
        self.update(playlist_id, |progress| {
            progress.channels_saved = channels_saved;
            progress.batches_saved = batches_saved;
        })
        .await;
    }

    pub async fn complete(&self, playlist_id: i64, summary: ParseSummary) {
        self.update(playlist_id, |progress| {
            progress.state = SyncState::Completed;
            progress.channels_saved = summary.channels;
            progress.batches_saved = summary.batches;
        })
        .await;
    }

    pub async fn fail(&self, playlist_id: i64, error: String) {
        self.update(playlist_id, |progress| {
            progress.state = SyncState::Failed;
            progress.error = Some(error);
        })
        .await;
    }

    pub async fn cancel(&self, playlist_id: i64) {
        self.update(playlist_id, |progress| progress.state = SyncState::Cancelled)
            .await;
    }

    pub async fn get_progress(&self, playlist_id: i64) -> Option<SyncProgress> {
        let states = self.states.read().await;
        states.get(&playlist_id).cloned()
    }

    pub async fn get_all_progress(&self) -> HashMap<i64, SyncProgress> {
        let states = self.states.read().await;
        states.clone()
    }

    async fn update<F>(&self, playlist_id: i64, apply: F)
    where
        F: FnOnce(&mut SyncProgress),
    {
        let current = {
            let states = self.states.read().await;
            states.get(&playlist_id).cloned()
        };

        if let Some(mut progress) = current {
            apply(&mut progress);
            progress.updated_at = Utc::now();
            if progress.state.is_terminal() {
                progress.completed_at = Some(progress.updated_at);
            }
            self.publish(progress).await;
        }
    }

    async fn publish(&self, progress: SyncProgress) {
        let syncing = {
            let mut states = self.states.write().await;
            states.insert(progress.playlist_id, progress.clone());
            states
                .values()
                .any(|p| !p.background && p.state == SyncState::Syncing)
        };
        self.syncing_tx.send_replace(syncing);
        let _ = self.progress_tx.send(progress);
    }
}

impl Default for SyncStateManager {
    fn default() -> Self {
        Self::new()
    }
}
