#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use playlist_sync::{
    config::SyncConfig,
    database::Database,
    errors::{SourceError, SourceResult},
    ingestor::{SyncOrchestrator, SyncStateManager},
    models::{NewPlaylist, Playlist},
    repositories::{
        PlaylistRegistry, SqliteChannelStore, SqlitePlaylistRegistry, SqlitePreferenceStore,
    },
    sources::{ByteStream, HttpFetcher, HttpResponse, PlaylistReader, DEFAULT_BATCH_SIZE},
};

#[derive(Clone)]
enum FakeResponse {
    Body { status: u16, chunks: Vec<Bytes> },
    /// Sends the first chunk, then never completes
    Stall(Bytes),
    Unreachable,
}

/// In-process fetcher serving canned bodies by URL; unknown URLs get a 404
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, FakeResponse>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.serve_chunks(url, 200, vec![body.into()]);
    }

    pub fn serve_chunks(&self, url: &str, status: u16, chunks: Vec<String>) {
        let chunks = chunks.into_iter().map(Bytes::from).collect();
        self.insert(url, FakeResponse::Body { status, chunks });
    }

    pub fn stall_after(&self, url: &str, first_chunk: impl Into<String>) {
        self.insert(url, FakeResponse::Stall(Bytes::from(first_chunk.into())));
    }

    pub fn unreachable(&self, url: &str) {
        self.insert(url, FakeResponse::Unreachable);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn insert(&self, url: &str, response: FakeResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> SourceResult<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(FakeResponse::Body { status, chunks }) => {
                Ok(HttpResponse::from_chunks(status, chunks))
            }
            Some(FakeResponse::Stall(first)) => {
                let body: ByteStream = Box::pin(
                    futures::stream::iter(vec![Ok(first)]).chain(futures::stream::pending()),
                );
                Ok(HttpResponse { status: 200, body })
            }
            Some(FakeResponse::Unreachable) => Err(SourceError::timeout(url)),
            None => Ok(HttpResponse::from_bytes(404, "")),
        }
    }
}

pub struct Harness {
    pub db: Database,
    pub fetcher: Arc<FakeFetcher>,
    pub registry: Arc<SqlitePlaylistRegistry>,
    pub channels: Arc<SqliteChannelStore>,
    pub preferences: Arc<SqlitePreferenceStore>,
    pub orchestrator: SyncOrchestrator,
}

pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        background_cooldown_ms: 0,
        ..SyncConfig::default()
    }
}

pub async fn harness() -> Harness {
    harness_with(test_sync_config()).await
}

pub async fn harness_with(config: SyncConfig) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let fetcher = Arc::new(FakeFetcher::default());
    let registry = Arc::new(SqlitePlaylistRegistry::new(db.pool()));
    let channels = Arc::new(SqliteChannelStore::new(db.pool()));
    let preferences = Arc::new(SqlitePreferenceStore::new(db.pool()));

    let orchestrator = SyncOrchestrator::new(
        registry.clone(),
        channels.clone(),
        PlaylistReader::new(fetcher.clone(), DEFAULT_BATCH_SIZE),
        db.playlist_locks(),
        SyncStateManager::new(),
        config,
    );

    Harness {
        db,
        fetcher,
        registry,
        channels,
        preferences,
        orchestrator,
    }
}

impl Harness {
    pub async fn add_playlist(&self, name: &str, url: &str) -> Playlist {
        let mut inserted = self
            .registry
            .add_if_absent(&[NewPlaylist {
                name: name.to_string(),
                url: url.to_string(),
            }])
            .await
            .unwrap();
        inserted.remove(0)
    }
}

/// Extended M3U with `count` entries named `{prefix} {i}` at `http://{prefix}/{i}`
pub fn m3u_body(prefix: &str, count: usize) -> String {
    let mut body = String::from("#EXTM3U\n");
    for i in 0..count {
        body.push_str(&format!(
            "#EXTINF:-1 tvg-country=\"us\" group-title=\"News\",{prefix} {i}\nhttp://{prefix}/{i}\n"
        ));
    }
    body
}
