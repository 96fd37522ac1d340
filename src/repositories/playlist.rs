//! SQLite-backed playlist registry

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::traits::PlaylistRegistry;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{NewPlaylist, Playlist};

pub struct SqlitePlaylistRegistry {
    pool: SqlitePool,
}

impl SqlitePlaylistRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn playlist_from_row(row: &SqliteRow) -> Result<Playlist, sqlx::Error> {
        Ok(Playlist {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            is_selected: row.try_get("is_selected")?,
        })
    }

    fn optional_playlist(
        row: Option<SqliteRow>,
        query_name: &str,
    ) -> RepositoryResult<Option<Playlist>> {
        row.as_ref()
            .map(Self::playlist_from_row)
            .transpose()
            .map_err(|e| RepositoryError::query_failed(query_name, e))
    }
}

#[async_trait]
impl PlaylistRegistry for SqlitePlaylistRegistry {
    async fn list_all(&self) -> RepositoryResult<Vec<Playlist>> {
        let rows = sqlx::query("SELECT id, name, url, is_selected FROM playlists ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("list_playlists", e))?;

        rows.iter()
            .map(Self::playlist_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::query_failed("list_playlists", e))
    }

    async fn selected(&self) -> RepositoryResult<Option<Playlist>> {
        let row = sqlx::query(
            "SELECT id, name, url, is_selected FROM playlists WHERE is_selected = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::query_failed("selected_playlist", e))?;

        Self::optional_playlist(row, "selected_playlist")
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<Playlist>> {
        let row = sqlx::query("SELECT id, name, url, is_selected FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("get_playlist", e))?;

        Self::optional_playlist(row, "get_playlist")
    }

    async fn find_by_url(&self, url: &str) -> RepositoryResult<Option<Playlist>> {
        let row = sqlx::query("SELECT id, name, url, is_selected FROM playlists WHERE url = ?")
            .bind(url.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::query_failed("find_playlist_by_url", e))?;

        Self::optional_playlist(row, "find_playlist_by_url")
    }

    async fn add_if_absent(&self, playlists: &[NewPlaylist]) -> RepositoryResult<Vec<Playlist>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::query_failed("begin_transaction", e))?;

        let mut inserted = Vec::new();
        for playlist in playlists {
            let url = playlist.url.trim();
            let result = sqlx::query(
                "INSERT INTO playlists (name, url, is_selected) VALUES (?, ?, 0)
                 ON CONFLICT(url) DO NOTHING",
            )
            .bind(&playlist.name)
            .bind(url)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::query_failed("insert_playlist", e))?;

            if result.rows_affected() == 0 {
                debug!("Playlist already known, skipping: {}", url);
                continue;
            }

            inserted.push(Playlist {
                id: result.last_insert_rowid(),
                name: playlist.name.clone(),
                url: url.to_string(),
                is_selected: false,
            });
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::query_failed("commit_transaction", e))?;

        if !inserted.is_empty() {
            info!("Added {} new playlists", inserted.len());
        }
        Ok(inserted)
    }

    async fn select(&self, id: i64) -> RepositoryResult<Playlist> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::query_failed("begin_transaction", e))?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::query_failed("select_playlist", e))?;
        if exists == 0 {
            return Err(RepositoryError::record_not_found(
                "playlists",
                "id",
                id.to_string(),
            ));
        }

        // Clear and set in one statement so no reader sees two selections
        sqlx::query("UPDATE playlists SET is_selected = CASE WHEN id = ? THEN 1 ELSE 0 END")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::query_failed("select_playlist", e))?;

        let row = sqlx::query("SELECT id, name, url, is_selected FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::query_failed("select_playlist", e))?;
        let playlist = Self::playlist_from_row(&row)
            .map_err(|e| RepositoryError::query_failed("select_playlist", e))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::query_failed("commit_transaction", e))?;

        info!("Selected playlist '{}' ({})", playlist.name, playlist.id);
        Ok(playlist)
    }
}
