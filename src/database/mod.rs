use crate::assets::MigrationAssets;
use crate::config::DatabaseConfig;
use crate::errors::{AppResult, RepositoryError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Per-playlist write serialization
///
/// A sync holds its playlist's guard for the whole clear-then-repopulate
/// sequence; point updates of that playlist's channels take the same guard.
/// Different playlists never contend.
#[derive(Clone, Default)]
pub struct PlaylistLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PlaylistLocks {
    pub async fn lock(&self, playlist_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(playlist_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    playlist_locks: PlaylistLocks,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub fn playlist_locks(&self) -> PlaylistLocks {
        self.playlist_locks.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let in_memory = config.url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty
        // database, so those pools are pinned to one long-lived connection.
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections.unwrap_or(5))
        };

        let pool = pool_options.connect_with(options).await?;
        debug!("Connected to database: {}", config.url);

        Ok(Self {
            pool,
            playlist_locks: PlaylistLocks::default(),
        })
    }

    /// Fresh migrated in-memory database
    pub async fn in_memory() -> AppResult<Self> {
        let database = Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await?;
        database.migrate().await?;
        Ok(database)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum BLOB NOT NULL,
                execution_time INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MigrationAssets::get_migrations() {
            // "001_initial_schema.sql" -> 1
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| RepositoryError::MigrationFailed {
                    version: name.clone(),
                    message: "file name does not start with a numeric version".to_string(),
                })?;

            let existing: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM _migrations WHERE version = ?")
                    .bind(version)
                    .fetch_one(&self.pool)
                    .await?;
            if existing > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let mut tx = self.pool.begin().await?;

            for statement in content.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| RepositoryError::MigrationFailed {
                        version: name.clone(),
                        message: e.to_string(),
                    })?;
            }

            let execution_time = start.elapsed().as_millis() as i64;
            sqlx::query(
                "INSERT INTO _migrations (version, description, checksum, execution_time)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(version)
            .bind(&name)
            .bind(Self::calculate_checksum(&content))
            .bind(execution_time)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            info!("Applied migration: {} ({}ms)", name, execution_time);
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }
}
