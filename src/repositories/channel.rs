//! SQLite-backed channel store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use super::traits::ChannelStore;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{millis_to_datetime, CategoryFilter, Channel, ChannelPageQuery};

const CHANNEL_COLUMNS: &str =
    "stream_url, name, logo_url, category, country, last_watched, is_favorite, playlist_id";

pub struct SqliteChannelStore {
    pool: SqlitePool,
}

impl SqliteChannelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn channel_from_row(row: &SqliteRow) -> Result<Channel, sqlx::Error> {
        let last_watched: Option<i64> = row.try_get("last_watched")?;
        Ok(Channel {
            stream_url: row.try_get("stream_url")?,
            name: row.try_get("name")?,
            logo_url: row.try_get("logo_url")?,
            category: row.try_get("category")?,
            country: row.try_get("country")?,
            last_watched: last_watched.and_then(millis_to_datetime),
            is_favorite: row.try_get("is_favorite")?,
            playlist_id: row.try_get("playlist_id")?,
        })
    }

    fn channels_from_rows(rows: &[SqliteRow], query: &str) -> RepositoryResult<Vec<Channel>> {
        rows.iter()
            .map(Self::channel_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::query_failed(query, e))
    }
}

/// Wrap user text in `%...%` for LIKE, escaping the LIKE metacharacters
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn get_page(&self, query: &ChannelPageQuery) -> RepositoryResult<Vec<Channel>> {
        // Favorites are listed regardless of the country filter
        let sql = match &query.category {
            CategoryFilter::All => format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE playlist_id = ? AND (? IS NULL OR country = ?)
                 ORDER BY rowid LIMIT ? OFFSET ?"
            ),
            CategoryFilter::Named(_) => format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE playlist_id = ? AND category = ? AND (? IS NULL OR country = ?)
                 ORDER BY rowid LIMIT ? OFFSET ?"
            ),
            CategoryFilter::Favorites => format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE playlist_id = ? AND is_favorite = 1
                 ORDER BY rowid LIMIT ? OFFSET ?"
            ),
        };

        let mut q = sqlx::query(&sql).bind(query.playlist_id);
        match &query.category {
            CategoryFilter::All => {
                q = q.bind(&query.country).bind(&query.country);
            }
            CategoryFilter::Named(category) => {
                q = q.bind(category).bind(&query.country).bind(&query.country);
            }
            CategoryFilter::Favorites => {}
        }
        let rows = q
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("get_page", e))?;

        Self::channels_from_rows(&rows, "get_page")
    }

    async fn search_global(
        &self,
        query: &str,
        offset: u32,
        limit: u32,
    ) -> RepositoryResult<Vec<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE name LIKE ? ESCAPE '\\'
             ORDER BY rowid LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("search_global", e))?;

        Self::channels_from_rows(&rows, "search_global")
    }

    async fn search_in_playlist(
        &self,
        playlist_id: i64,
        query: &str,
        offset: u32,
        limit: u32,
    ) -> RepositoryResult<Vec<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE playlist_id = ? AND name LIKE ? ESCAPE '\\'
             ORDER BY rowid LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(playlist_id)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("search_in_playlist", e))?;

        Self::channels_from_rows(&rows, "search_in_playlist")
    }

    async fn distinct_categories(
        &self,
        playlist_id: i64,
        country: Option<&str>,
    ) -> RepositoryResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT category FROM channels
             WHERE playlist_id = ? AND (? IS NULL OR country = ?)
             ORDER BY category ASC",
        )
        .bind(playlist_id)
        .bind(country)
        .bind(country)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::query_failed("distinct_categories", e))
    }

    async fn distinct_countries(&self, playlist_id: i64) -> RepositoryResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT country FROM channels
             WHERE playlist_id = ? AND country IS NOT NULL
             ORDER BY country ASC",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::query_failed("distinct_countries", e))
    }

    async fn recently_watched(
        &self,
        playlist_id: i64,
        limit: u32,
    ) -> RepositoryResult<Vec<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE playlist_id = ? AND last_watched IS NOT NULL
             ORDER BY last_watched DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(playlist_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("recently_watched", e))?;

        Self::channels_from_rows(&rows, "recently_watched")
    }

    async fn find_alternatives(
        &self,
        name_pattern: &str,
        exclude_stream_url: &str,
    ) -> RepositoryResult<Vec<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels
             WHERE name LIKE ? ESCAPE '\\' AND stream_url != ?
             ORDER BY rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(like_pattern(name_pattern))
            .bind(exclude_stream_url)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("find_alternatives", e))?;

        Self::channels_from_rows(&rows, "find_alternatives")
    }

    async fn favorite_urls(&self, playlist_id: i64) -> RepositoryResult<HashSet<String>> {
        let urls: Vec<String> = sqlx::query_scalar(
            "SELECT stream_url FROM channels WHERE playlist_id = ? AND is_favorite = 1",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::query_failed("favorite_urls", e))?;

        Ok(urls.into_iter().collect())
    }

    async fn upsert_batch(&self, channels: &[Channel]) -> RepositoryResult<u64> {
        if channels.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::query_failed("begin_transaction", e))?;

        let mut written = 0u64;
        for channel in channels {
            let result = sqlx::query(
                "INSERT OR REPLACE INTO channels
                 (stream_url, name, logo_url, category, country, last_watched, is_favorite, playlist_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&channel.stream_url)
            .bind(&channel.name)
            .bind(&channel.logo_url)
            .bind(&channel.category)
            .bind(&channel.country)
            .bind(channel.last_watched.map(|t| t.timestamp_millis()))
            .bind(channel.is_favorite)
            .bind(channel.playlist_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::query_failed("upsert_channel", e))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::query_failed("commit_transaction", e))?;

        debug!("Upserted batch of {} channels", channels.len());
        Ok(written)
    }

    async fn set_favorite(&self, stream_url: &str, is_favorite: bool) -> RepositoryResult<bool> {
        let result = sqlx::query("UPDATE channels SET is_favorite = ? WHERE stream_url = ?")
            .bind(is_favorite)
            .bind(stream_url)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("set_favorite", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_last_watched(
        &self,
        stream_url: &str,
        watched_at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query("UPDATE channels SET last_watched = ? WHERE stream_url = ?")
            .bind(watched_at.timestamp_millis())
            .bind(stream_url)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("set_last_watched", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_url(&self, stream_url: &str) -> RepositoryResult<Option<Channel>> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE stream_url = ?");
        let row = sqlx::query(&sql)
            .bind(stream_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("get_by_url", e))?;

        row.as_ref()
            .map(Self::channel_from_row)
            .transpose()
            .map_err(|e| RepositoryError::query_failed("get_by_url", e))
    }

    async fn clear_for_playlist(&self, playlist_id: i64) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM channels WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("clear_for_playlist", e))?;

        Ok(result.rows_affected())
    }

    async fn count_for_playlist(&self, playlist_id: i64) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM channels WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("count_for_playlist", e))?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::NewPlaylist;
    use crate::repositories::{PlaylistRegistry, SqlitePlaylistRegistry};
    use chrono::TimeZone;

    fn channel(playlist_id: i64, url: &str, name: &str, category: &str, country: Option<&str>) -> Channel {
        Channel::parsed(
            playlist_id,
            url,
            name,
            None,
            category,
            country.map(|c| c.to_string()),
        )
    }

    async fn setup() -> (SqliteChannelStore, i64, i64) {
        let db = Database::in_memory().await.unwrap();
        let registry = SqlitePlaylistRegistry::new(db.pool());
        let inserted = registry
            .add_if_absent(&[
                NewPlaylist {
                    name: "One".to_string(),
                    url: "http://one/list.m3u".to_string(),
                },
                NewPlaylist {
                    name: "Two".to_string(),
                    url: "http://two/list.m3u".to_string(),
                },
            ])
            .await
            .unwrap();
        (SqliteChannelStore::new(db.pool()), inserted[0].id, inserted[1].id)
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("News"), "%News%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_stream_url() {
        let (store, one, _) = setup().await;

        store
            .upsert_batch(&[
                channel(one, "http://x/a", "First", "News", None),
                channel(one, "http://x/a", "Second", "News", None),
            ])
            .await
            .unwrap();

        assert_eq!(store.count_for_playlist(one).await.unwrap(), 1);
        let stored = store.get_by_url("http://x/a").await.unwrap().unwrap();
        assert_eq!(stored.name, "Second");
    }

    #[tokio::test]
    async fn test_get_page_filters() {
        let (store, one, _) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "News IN", "News", Some("IN")),
                channel(one, "http://x/2", "News US", "News", Some("US")),
                channel(one, "http://x/3", "Sports IN", "Sports", Some("IN")),
                channel(one, "http://x/4", "No Country", "Sports", None),
            ])
            .await
            .unwrap();
        store.set_favorite("http://x/2", true).await.unwrap();

        let page = |category: CategoryFilter, country: Option<&str>| ChannelPageQuery {
            playlist_id: one,
            category,
            country: country.map(|c| c.to_string()),
            offset: 0,
            limit: 50,
        };

        let all = store.get_page(&page(CategoryFilter::All, None)).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].stream_url, "http://x/1");

        let india = store.get_page(&page(CategoryFilter::All, Some("IN"))).await.unwrap();
        assert_eq!(india.len(), 2);

        let news_in = store
            .get_page(&page(CategoryFilter::Named("News".to_string()), Some("IN")))
            .await
            .unwrap();
        assert_eq!(news_in.len(), 1);
        assert_eq!(news_in[0].name, "News IN");

        let favorites = store
            .get_page(&page(CategoryFilter::Favorites, Some("IN")))
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].stream_url, "http://x/2");
    }

    #[tokio::test]
    async fn test_get_page_paging() {
        let (store, one, _) = setup().await;
        let batch: Vec<_> = (0..25)
            .map(|i| channel(one, &format!("http://x/{i}"), &format!("Ch {i}"), "Other", None))
            .collect();
        store.upsert_batch(&batch).await.unwrap();

        let second = store
            .get_page(&ChannelPageQuery {
                playlist_id: one,
                category: CategoryFilter::All,
                country: None,
                offset: 20,
                limit: 20,
            })
            .await
            .unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].stream_url, "http://x/20");
    }

    #[tokio::test]
    async fn test_search_global_crosses_playlists() {
        let (store, one, two) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "Sony SAB", "Entertainment", None),
                channel(two, "http://y/1", "SONY MAX", "Movies", None),
                channel(two, "http://y/2", "Zee TV", "Entertainment", None),
            ])
            .await
            .unwrap();

        let found = store.search_global("sony", 0, 20).await.unwrap();
        assert_eq!(found.len(), 2);

        let scoped = store.search_in_playlist(one, "sony", 0, 20).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].playlist_id, one);
    }

    #[tokio::test]
    async fn test_distinct_lists_are_sorted() {
        let (store, one, _) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "A", "Sports", Some("US")),
                channel(one, "http://x/2", "B", "News", Some("IN")),
                channel(one, "http://x/3", "C", "Music", Some("IN")),
                channel(one, "http://x/4", "D", "Kids", None),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.distinct_categories(one, None).await.unwrap(),
            vec!["Kids", "Music", "News", "Sports"]
        );
        assert_eq!(
            store.distinct_categories(one, Some("IN")).await.unwrap(),
            vec!["Music", "News"]
        );
        assert_eq!(store.distinct_countries(one).await.unwrap(), vec!["IN", "US"]);
    }

    #[tokio::test]
    async fn test_recently_watched_order() {
        let (store, one, _) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "A", "News", None),
                channel(one, "http://x/2", "B", "News", None),
                channel(one, "http://x/3", "C", "News", None),
            ])
            .await
            .unwrap();

        let t = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
        store.set_last_watched("http://x/1", t(10)).await.unwrap();
        store.set_last_watched("http://x/3", t(20)).await.unwrap();

        let recent = store.recently_watched(one, 10).await.unwrap();
        let urls: Vec<_> = recent.iter().map(|c| c.stream_url.as_str()).collect();
        assert_eq!(urls, vec!["http://x/3", "http://x/1"]);
        assert_eq!(recent[0].last_watched, Some(t(20)));

        assert_eq!(store.recently_watched(one, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_alternatives_excludes_failed_url() {
        let (store, one, two) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "Sony SAB HD (Source 1)", "Entertainment", None),
                channel(one, "http://x/2", "Sony SAB HD (Source 2)", "Entertainment", None),
                channel(two, "http://y/1", "sony sab", "Entertainment", None),
                channel(two, "http://y/2", "Sony MAX", "Movies", None),
            ])
            .await
            .unwrap();

        let alternatives = store.find_alternatives("Sony SAB", "http://x/1").await.unwrap();
        let urls: Vec<_> = alternatives.iter().map(|c| c.stream_url.as_str()).collect();
        assert_eq!(urls, vec!["http://x/2", "http://y/1"]);
    }

    #[tokio::test]
    async fn test_point_updates_and_clear() {
        let (store, one, two) = setup().await;
        store
            .upsert_batch(&[
                channel(one, "http://x/1", "A", "News", None),
                channel(two, "http://y/1", "B", "News", None),
            ])
            .await
            .unwrap();

        assert!(store.set_favorite("http://x/1", true).await.unwrap());
        assert!(!store.set_favorite("http://missing", true).await.unwrap());
        assert_eq!(
            store.favorite_urls(one).await.unwrap(),
            HashSet::from(["http://x/1".to_string()])
        );

        assert_eq!(store.clear_for_playlist(one).await.unwrap(), 1);
        assert_eq!(store.count_for_playlist(one).await.unwrap(), 0);
        assert_eq!(store.count_for_playlist(two).await.unwrap(), 1);
    }
}
