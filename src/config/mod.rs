use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::utils::url::INTERNAL_SAMPLE_URL;

/// Desktop browser user agent; several public playlist hosts reject default clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const FAST_PLAYLIST_URL: &str = "https://shyam-vadgama.github.io/iptv-json-parser/channels.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Endpoint returning `{"country_code": "IN", ...}` for the caller's IP
    #[serde(default = "default_geolocation_url")]
    pub geolocation_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Channels per persisted batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between background pre-syncs
    #[serde(default = "default_background_cooldown_ms")]
    pub background_cooldown_ms: u64,
    /// Playlist selected when nothing is selected yet
    #[serde(default = "default_fast_playlist_url")]
    pub fast_playlist_url: String,
    /// URL fragments identifying playlists worth pre-syncing for fallback search
    #[serde(default = "default_fallback_source_markers")]
    pub fallback_source_markers: Vec<String>,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_read_timeout_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_geolocation_url() -> String {
    "https://ipwho.is/".to_string()
}
fn default_batch_size() -> usize {
    500
}
fn default_background_cooldown_ms() -> u64 {
    2000
}
fn default_fast_playlist_url() -> String {
    FAST_PLAYLIST_URL.to_string()
}
fn default_fallback_source_markers() -> Vec<String> {
    [
        INTERNAL_SAMPLE_URL,
        "apsattv",
        "Free-TV",
        "tvpass",
        "epghub",
        "PiratesTv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_recent_limit() -> u32 {
    10
}
fn default_page_size() -> u32 {
    20
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./playlist-sync.db".to_string(),
            max_connections: Some(5),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
            geolocation_url: default_geolocation_url(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            background_cooldown_ms: default_background_cooldown_ms(),
            fast_playlist_url: default_fast_playlist_url(),
            fallback_source_markers: default_fallback_source_markers(),
            recent_limit: default_recent_limit(),
            page_size: default_page_size(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl SyncConfig {
    pub fn background_cooldown(&self) -> Duration {
        Duration::from_millis(self.background_cooldown_ms)
    }

    /// A zero batch size would never flush; clamp to at least one record.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}
