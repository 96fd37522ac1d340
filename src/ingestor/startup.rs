//! One-time startup reconciliation and background pre-sync

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::defaults::default_playlists;
use super::sync::{SyncOrchestrator, SyncOutcome, SyncTicket};
use crate::errors::AppResult;
use crate::models::Playlist;

/// What startup reconciliation did
pub struct StartupReport {
    pub seeded: Vec<Playlist>,
    pub selected: Option<Playlist>,
    /// Present when the selected playlist was empty and a sync was started
    pub initial_sync: Option<SyncTicket>,
}

/// Background pre-sync totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresyncReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncOrchestrator {
    /// Seed defaults, make sure a playlist is selected, and sync it when empty
    pub async fn reconcile(&self) -> AppResult<StartupReport> {
        let registry = self.registry();
        let seeded = registry.add_if_absent(&default_playlists()).await?;
        if !seeded.is_empty() {
            info!("Seeded {} default playlists", seeded.len());
        }

        let mut selected = registry.selected().await?;
        if selected.is_none() {
            let fast_url = &self.config().fast_playlist_url;
            match registry.find_by_url(fast_url).await? {
                Some(fast) => {
                    info!("No playlist selected, selecting '{}'", fast.name);
                    selected = Some(registry.select(fast.id).await?);
                }
                None => warn!("Fast playlist {} is not registered", fast_url),
            }
        }

        let mut initial_sync = None;
        if let Some(playlist) = &selected {
            let count = self.channels().count_for_playlist(playlist.id).await?;
            if count == 0 {
                info!("Selected playlist '{}' is empty, syncing", playlist.name);
                initial_sync = Some(self.sync(playlist.clone()).await);
            } else {
                debug!("Selected playlist '{}' has {} channels", playlist.name, count);
            }
        }

        Ok(StartupReport {
            seeded,
            selected,
            initial_sync,
        })
    }

    /// Playlists worth indexing for fallback search, excluding the selected one
    pub async fn presync_targets(&self) -> AppResult<Vec<Playlist>> {
        let markers = &self.config().fallback_source_markers;
        let playlists = self.registry().list_all().await?;
        Ok(playlists
            .into_iter()
            .filter(|p| !p.is_selected && markers.iter().any(|m| p.url.contains(m.as_str())))
            .collect())
    }

    /// Sync each empty fallback source one at a time, pausing between syncs
    pub async fn run_background_presync(&self, shutdown: CancellationToken) -> PresyncReport {
        let mut report = PresyncReport::default();
        let targets = match self.presync_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Background pre-sync could not list playlists: {}", e);
                return report;
            }
        };
        debug!("Background pre-sync has {} candidate playlists", targets.len());

        for playlist in targets {
            tokio::task::yield_now().await;
            if shutdown.is_cancelled() {
                break;
            }

            match self.channels().count_for_playlist(playlist.id).await {
                Ok(0) => {}
                Ok(count) => {
                    debug!("Skipping pre-sync of '{}' ({} channels)", playlist.name, count);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping pre-sync of '{}': {}", playlist.name, e);
                    report.failed += 1;
                    continue;
                }
            }

            match self.sync_background(&playlist, &shutdown).await {
                SyncOutcome::Completed(_) => report.synced += 1,
                SyncOutcome::Failed(_) => report.failed += 1,
                SyncOutcome::Cancelled => break,
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config().background_cooldown()) => {}
            }
        }

        info!(
            "Background pre-sync finished: {} synced, {} skipped, {} failed",
            report.synced, report.skipped, report.failed
        );
        report
    }

    pub fn spawn_background_presync(&self, shutdown: CancellationToken) -> JoinHandle<PresyncReport> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_background_presync(shutdown).await })
    }
}
