//! Storage interfaces consumed by the sync core

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::RepositoryResult;
use crate::models::{Channel, ChannelPageQuery, CountryPreference, NewPlaylist, Playlist};

/// Persisted channel collection keyed by stream URL
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Ordered page of a playlist's channels, filtered by category/favorites and country
    async fn get_page(&self, query: &ChannelPageQuery) -> RepositoryResult<Vec<Channel>>;

    /// Case-insensitive name search across every playlist
    async fn search_global(
        &self,
        query: &str,
        offset: u32,
        limit: u32,
    ) -> RepositoryResult<Vec<Channel>>;

    /// Case-insensitive name search within one playlist
    async fn search_in_playlist(
        &self,
        playlist_id: i64,
        query: &str,
        offset: u32,
        limit: u32,
    ) -> RepositoryResult<Vec<Channel>>;

    /// Lexically sorted categories present in a playlist, optionally for one country
    async fn distinct_categories(
        &self,
        playlist_id: i64,
        country: Option<&str>,
    ) -> RepositoryResult<Vec<String>>;

    /// Lexically sorted non-null countries present in a playlist
    async fn distinct_countries(&self, playlist_id: i64) -> RepositoryResult<Vec<String>>;

    /// Watched channels, most recent first
    async fn recently_watched(&self, playlist_id: i64, limit: u32)
        -> RepositoryResult<Vec<Channel>>;

    /// Channels whose name contains `name_pattern`, excluding one stream URL
    async fn find_alternatives(
        &self,
        name_pattern: &str,
        exclude_stream_url: &str,
    ) -> RepositoryResult<Vec<Channel>>;

    /// Stream URLs currently marked favorite in a playlist
    async fn favorite_urls(&self, playlist_id: i64) -> RepositoryResult<HashSet<String>>;

    /// Insert-or-replace by stream URL in one transaction; returns rows written
    async fn upsert_batch(&self, channels: &[Channel]) -> RepositoryResult<u64>;

    /// Returns false when no channel has this URL
    async fn set_favorite(&self, stream_url: &str, is_favorite: bool) -> RepositoryResult<bool>;

    async fn set_last_watched(
        &self,
        stream_url: &str,
        watched_at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    async fn get_by_url(&self, stream_url: &str) -> RepositoryResult<Option<Channel>>;

    /// Delete every channel owned by a playlist; returns rows deleted
    async fn clear_for_playlist(&self, playlist_id: i64) -> RepositoryResult<u64>;

    async fn count_for_playlist(&self, playlist_id: i64) -> RepositoryResult<u64>;
}

/// Known playlist sources with a single selection
#[async_trait]
pub trait PlaylistRegistry: Send + Sync {
    /// All playlists in insertion order
    async fn list_all(&self) -> RepositoryResult<Vec<Playlist>>;

    async fn selected(&self) -> RepositoryResult<Option<Playlist>>;

    async fn get(&self, id: i64) -> RepositoryResult<Option<Playlist>>;

    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Playlist>>;

    /// Insert playlists whose URL is not yet known; returns the inserted rows
    async fn add_if_absent(&self, playlists: &[NewPlaylist]) -> RepositoryResult<Vec<Playlist>>;

    /// Make `id` the only selected playlist
    async fn select(&self, id: i64) -> RepositoryResult<Playlist>;
}

/// Persisted user preferences
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn default_category(&self) -> RepositoryResult<Option<String>>;

    async fn set_default_category(&self, category: Option<&str>) -> RepositoryResult<()>;

    async fn country_preference(&self) -> RepositoryResult<CountryPreference>;

    async fn set_country_preference(&self, preference: &CountryPreference)
        -> RepositoryResult<()>;
}
